use std::{
    ffi::c_void,
    ptr::NonNull,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use crate::{page_size, Cleaner, Error, Facility, FileId, MappedRegion, Runtime, SystemError};

#[cfg(unix)]
const ACCESS_DENIED: i32 = libc::EACCES;
#[cfg(windows)]
const ACCESS_DENIED: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The facility can no longer be loaded at invocation time.
    Unloadable,
    /// The facility refuses the unmap.
    Denied,
    /// The facility panics.
    Panics,
}

/// A scripted host which counts every probe and invocation.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    legacy: bool,
    version_unreadable: bool,
    slow: bool,
    primary: bool,
    internal: bool,
    fault: Option<Fault>,
    pub legacy_checks: AtomicUsize,
    resolutions: Mutex<Vec<Facility>>,
    invocations: Mutex<Vec<Facility>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn legacy(mut self) -> Self {
        self.legacy = true;
        self
    }

    pub fn unreadable_version(mut self) -> Self {
        self.version_unreadable = true;
        self
    }

    pub fn slow_detection(mut self) -> Self {
        self.slow = true;
        self
    }

    pub fn with_primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn with_internal(mut self) -> Self {
        self.internal = true;
        self
    }

    pub fn failing(mut self, fault: Fault) -> Self {
        self.fault = Some(fault);
        self
    }

    pub fn resolutions(&self) -> Vec<Facility> {
        self.resolutions.lock().unwrap().clone()
    }

    pub fn invocations(&self) -> Vec<Facility> {
        self.invocations.lock().unwrap().clone()
    }

    fn available(&self, facility: Facility) -> bool {
        match facility {
            Facility::Primary => self.primary,
            Facility::Internal => self.internal,
        }
    }
}

impl Runtime for FakeRuntime {
    fn is_legacy_family(&self) -> Result<bool, Error> {
        self.legacy_checks.fetch_add(1, Ordering::SeqCst);
        if self.slow {
            thread::sleep(Duration::from_millis(50));
        }
        if self.version_unreadable {
            return Err(Error::VersionUnavailable(SystemError::from_raw(ACCESS_DENIED)));
        }
        Ok(self.legacy)
    }

    fn resolve(&self, facility: Facility) -> Result<(), Error> {
        self.resolutions.lock().unwrap().push(facility);
        if self.available(facility) {
            Ok(())
        } else {
            Err(Error::unavailable(facility, "not present in fake runtime"))
        }
    }

    unsafe fn invoke_cleaner(
        &self,
        facility: Facility,
        _region: &MappedRegion,
    ) -> Result<(), Error> {
        self.invocations.lock().unwrap().push(facility);
        match self.fault {
            None => Ok(()),
            Some(Fault::Unloadable) => Err(Error::unavailable(facility, "unloaded")),
            Some(Fault::Denied) => Err(SystemError::from_raw(ACCESS_DENIED).into()),
            Some(Fault::Panics) => panic!("{} facility exploded", facility),
        }
    }
}

/// A region at an address which is never mapped, with a cleaner that does nothing.
pub fn fake_region() -> MappedRegion {
    let base = NonNull::new(page_size() as *mut c_void).unwrap();
    // Safety: `FakeRuntime` never touches the region, and its cleaner is replaced below.
    unsafe { MappedRegion::from_raw_parts(base, page_size(), FileId::new(0, 0)) }
        .with_cleaner(Cleaner::new(|| Ok(())))
}

/// A [`fake_region`] whose cleaner counts its invocations in `cleaned`.
pub fn counted_region(cleaned: &Arc<AtomicUsize>) -> MappedRegion {
    let cleaned = cleaned.clone();
    fake_region().with_cleaner(Cleaner::new(move || {
        cleaned.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }))
}
