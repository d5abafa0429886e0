use std::{
    ffi::CStr,
    fmt,
    fs::File,
    io,
    mem::{self, MaybeUninit},
    os::unix::fs::MetadataExt,
};

use libc::{c_int, c_void, size_t};

use crate::{Error, Facility, FileId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemError(i32);

impl std::error::Error for SystemError {}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let str = unsafe {
            // Safety: this string will stay alive on this thread until the next call to `strerror`.
            CStr::from_ptr(libc::strerror(self.0))
        };
        write!(f, "system error {:?}: {str:?}", self.0)
    }
}

impl SystemError {
    fn from_errno() -> Self {
        Self(io::Error::last_os_error().raw_os_error().unwrap_or(0))
    }

    pub fn from_raw(code: i32) -> Self {
        Self(code)
    }

    pub fn code(&self) -> i32 {
        self.0
    }
}

type MunmapFn = unsafe extern "C" fn(*mut c_void, size_t) -> c_int;

pub fn page_size_u32() -> u32 {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as u32 }
}

/// Linux kernels of the 2.x generation release through per-region cleaners.
pub fn is_legacy_family() -> Result<bool, Error> {
    let mut uts = MaybeUninit::<libc::utsname>::zeroed();
    if unsafe { libc::uname(uts.as_mut_ptr()) } != 0 {
        return Err(Error::VersionUnavailable(SystemError::from_errno()));
    }

    let uts = unsafe { uts.assume_init() };
    let release = unsafe {
        // Safety: `uname` NUL-terminates every field it fills in.
        CStr::from_ptr(uts.release.as_ptr())
    };
    Ok(cfg!(target_os = "linux") && is_legacy_release(release.to_bytes()))
}

fn is_legacy_release(release: &[u8]) -> bool {
    release.starts_with(b"2.")
}

pub fn resolve(facility: Facility) -> Result<(), Error> {
    match facility {
        Facility::Primary => resolve_munmap().map(drop),
        Facility::Internal => resolve_raw_munmap(),
    }
}

pub unsafe fn invoke(facility: Facility, addr: *mut c_void, len: usize) -> Result<(), Error> {
    match facility {
        Facility::Primary => {
            let munmap = resolve_munmap()?;
            if munmap(addr, len) == 0 {
                Ok(())
            } else {
                Err(SystemError::from_errno().into())
            }
        }
        Facility::Internal => raw_munmap(addr, len),
    }
}

pub unsafe fn unmap(addr: *mut c_void, len: usize) -> Result<(), SystemError> {
    if libc::munmap(addr, len) == 0 {
        Ok(())
    } else {
        Err(SystemError::from_errno())
    }
}

pub fn file_id(file: &File) -> io::Result<FileId> {
    let meta = file.metadata()?;
    Ok(FileId::new(meta.dev(), meta.ino()))
}

fn resolve_munmap() -> Result<MunmapFn, Error> {
    let symbol = unsafe { libc::dlsym(libc::RTLD_DEFAULT, b"munmap\0".as_ptr().cast()) };
    if symbol.is_null() {
        return Err(Error::unavailable(Facility::Primary, dl_error()));
    }

    Ok(unsafe {
        // Safety: `munmap` has this signature in every libc.
        mem::transmute::<*mut c_void, MunmapFn>(symbol)
    })
}

fn dl_error() -> String {
    let message = unsafe { libc::dlerror() };
    if message.is_null() {
        "symbol `munmap` not found".to_owned()
    } else {
        unsafe { CStr::from_ptr(message) }
            .to_string_lossy()
            .into_owned()
    }
}

#[cfg(target_os = "linux")]
fn resolve_raw_munmap() -> Result<(), Error> {
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn resolve_raw_munmap() -> Result<(), Error> {
    Err(Error::unavailable(
        Facility::Internal,
        "raw syscalls are not exposed on this platform",
    ))
}

#[cfg(target_os = "linux")]
unsafe fn raw_munmap(addr: *mut c_void, len: usize) -> Result<(), Error> {
    if libc::syscall(libc::SYS_munmap, addr, len as size_t) == 0 {
        Ok(())
    } else {
        Err(SystemError::from_errno().into())
    }
}

#[cfg(not(target_os = "linux"))]
unsafe fn raw_munmap(_addr: *mut c_void, _len: usize) -> Result<(), Error> {
    resolve_raw_munmap()
}
