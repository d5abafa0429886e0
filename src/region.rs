use std::{ffi::c_void, fmt, fs::File, io, ptr::NonNull};

use crate::{page_size, sys, Error};

/// Identity of the file backing a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    device: u64,
    index: u64,
}

impl FileId {
    pub const fn new(device: u64, index: u64) -> Self {
        Self { device, index }
    }

    /// The identity of an open file: `st_dev`/`st_ino` on Unix, the volume serial number and
    /// file index on Windows.
    pub fn of(file: &File) -> io::Result<Self> {
        sys::file_id(file)
    }

    pub fn device(&self) -> u64 {
        self.device
    }

    pub fn index(&self) -> u64 {
        self.index
    }
}

/// A one-shot handle which unmaps the region it is attached to.
pub struct Cleaner(Box<dyn FnOnce() -> Result<(), Error> + Send>);

impl Cleaner {
    pub fn new<F>(clean: F) -> Self
    where
        F: FnOnce() -> Result<(), Error> + Send + 'static,
    {
        Self(Box::new(clean))
    }

    pub fn clean(self) -> Result<(), Error> {
        (self.0)()
    }
}

impl fmt::Debug for Cleaner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleaner")
    }
}

/// One active mapping of a file range into the address space.
///
/// A `MappedRegion` describes a mapping but does not own its teardown: dropping one leaves the
/// mapping in place. It can only be unmapped by passing it by value to a release operation, so a
/// released region can never be touched again.
pub struct MappedRegion {
    base: NonNull<c_void>,
    len: usize,
    file: FileId,
    cleaner: Option<Cleaner>,
}

// Safety: the region is exclusively owned and the crate never dereferences `base`.
unsafe impl Send for MappedRegion {}

impl MappedRegion {
    /// Describes the mapping of `len` bytes at `base`, backed by `file`.
    ///
    /// The region starts out with a cleaner which unmaps it through the platform's unmap call.
    ///
    /// # Safety
    ///
    /// `base` and `len` must describe a live mapping, created by the caller and mapped from
    /// `file`. The caller must own it exclusively: no other `MappedRegion` may describe any part
    /// of it, and no access to its memory may outlive a release of this region.
    pub unsafe fn from_raw_parts(base: NonNull<c_void>, len: usize, file: FileId) -> Self {
        debug_assert_eq!(base.as_ptr() as usize % page_size(), 0);

        let addr = base.as_ptr() as usize;
        let cleaner = Cleaner::new(move || {
            // Safety: guaranteed by the contract of `from_raw_parts`.
            unsafe { sys::unmap(addr as *mut c_void, len) }.map_err(Error::from)
        });

        Self {
            base,
            len,
            file,
            cleaner: Some(cleaner),
        }
    }

    /// Replaces the attached cleaner.
    pub fn with_cleaner(mut self, cleaner: Cleaner) -> Self {
        self.cleaner = Some(cleaner);
        self
    }

    pub fn detach_cleaner(&mut self) -> Option<Cleaner> {
        self.cleaner.take()
    }

    pub fn has_cleaner(&self) -> bool {
        self.cleaner.is_some()
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.base.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn file_id(&self) -> FileId {
        self.file
    }

    pub(crate) fn into_cleaner(mut self) -> Option<Cleaner> {
        self.cleaner.take()
    }
}

impl fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedRegion")
            .field("base", &self.base)
            .field("len", &self.len)
            .field("file", &self.file)
            .field("has_cleaner", &self.has_cleaner())
            .finish()
    }
}
