// win32 quick reference:
// https://docs.rs/windows-sys/latest/windows_sys/index.html
// https://learn.microsoft.com/en-us/windows/win32/api/memoryapi/nf-memoryapi-unmapviewoffile
// https://learn.microsoft.com/en-us/windows-hardware/drivers/ddi/wdm/nf-wdm-zwunmapviewofsection
// https://learn.microsoft.com/en-us/windows/win32/api/libloaderapi/nf-libloaderapi-getprocaddress

use std::{
    ffi::c_void,
    fmt,
    fs::File,
    io,
    mem::{self, MaybeUninit},
    os::windows::io::AsRawHandle,
};

use lazy_static::lazy_static;
use windows_sys::Win32::{
    Foundation::{GetLastError, HANDLE, HMODULE},
    Storage::FileSystem::{GetFileInformationByHandle, BY_HANDLE_FILE_INFORMATION},
    System::{
        LibraryLoader::{GetModuleHandleA, GetProcAddress},
        SystemInformation::{GetSystemInfo, SYSTEM_INFO},
        Threading::GetCurrentProcess,
    },
};

use crate::{Error, Facility, FileId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemError(u32);

impl std::error::Error for SystemError {}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "system error {:#x}", self.0)
    }
}

impl SystemError {
    fn from_errno() -> Self {
        Self(unsafe {
            // Safety: `GetLastError`'s internal errno is stored using TLS.
            GetLastError()
        })
    }

    pub fn from_raw(code: u32) -> Self {
        Self(code)
    }

    pub fn code(&self) -> u32 {
        self.0
    }
}

type UnmapViewOfFileFn = unsafe extern "system" fn(*const c_void) -> i32;
type NtUnmapViewOfSectionFn = unsafe extern "system" fn(HANDLE, *mut c_void) -> i32;

lazy_static! {
    // Both modules are loaded into every process and are never unloaded.
    static ref KERNEL32: HMODULE = unsafe { GetModuleHandleA(b"kernel32.dll\0".as_ptr()) };
    static ref NTDLL: HMODULE = unsafe { GetModuleHandleA(b"ntdll.dll\0".as_ptr()) };
}

pub fn page_size_u32() -> u32 {
    let sys_info = unsafe {
        let mut sys_info = MaybeUninit::<SYSTEM_INFO>::uninit();
        GetSystemInfo(sys_info.as_mut_ptr());
        sys_info.assume_init()
    };
    sys_info.dwPageSize
}

/// Every supported Windows release exposes the process-wide facilities.
pub fn is_legacy_family() -> Result<bool, Error> {
    Ok(false)
}

pub fn resolve(facility: Facility) -> Result<(), Error> {
    match facility {
        Facility::Primary => resolve_unmap_view().map(drop),
        Facility::Internal => resolve_nt_unmap_view().map(drop),
    }
}

pub unsafe fn invoke(facility: Facility, addr: *mut c_void, _len: usize) -> Result<(), Error> {
    match facility {
        Facility::Primary => {
            let unmap_view = resolve_unmap_view()?;
            if unmap_view(addr) != 0 {
                Ok(())
            } else {
                Err(SystemError::from_errno().into())
            }
        }
        Facility::Internal => {
            let nt_unmap_view = resolve_nt_unmap_view()?;
            let status = nt_unmap_view(GetCurrentProcess(), addr);
            if status >= 0 {
                Ok(())
            } else {
                Err(SystemError(status as u32).into())
            }
        }
    }
}

/// Views are always unmapped whole, so `len` is unused.
pub unsafe fn unmap(addr: *mut c_void, _len: usize) -> Result<(), SystemError> {
    let unmap_view = resolve_unmap_view().map_err(|_| SystemError::from_errno())?;
    if unmap_view(addr) != 0 {
        Ok(())
    } else {
        Err(SystemError::from_errno())
    }
}

pub fn file_id(file: &File) -> io::Result<FileId> {
    let info = unsafe {
        let mut info = MaybeUninit::<BY_HANDLE_FILE_INFORMATION>::uninit();
        if GetFileInformationByHandle(file.as_raw_handle() as HANDLE, info.as_mut_ptr()) == 0 {
            return Err(io::Error::last_os_error());
        }
        info.assume_init()
    };

    let index = (u64::from(info.nFileIndexHigh) << 32) | u64::from(info.nFileIndexLow);
    Ok(FileId::new(u64::from(info.dwVolumeSerialNumber), index))
}

fn resolve_unmap_view() -> Result<UnmapViewOfFileFn, Error> {
    let proc = proc_address(*KERNEL32, b"UnmapViewOfFile\0", Facility::Primary)?;
    Ok(unsafe {
        // Safety: `UnmapViewOfFile` takes the base address and returns a `BOOL`.
        mem::transmute::<unsafe extern "system" fn() -> isize, UnmapViewOfFileFn>(proc)
    })
}

fn resolve_nt_unmap_view() -> Result<NtUnmapViewOfSectionFn, Error> {
    let proc = proc_address(*NTDLL, b"NtUnmapViewOfSection\0", Facility::Internal)?;
    Ok(unsafe {
        // Safety: `NtUnmapViewOfSection` takes a process handle and base address and returns an
        // `NTSTATUS`.
        mem::transmute::<unsafe extern "system" fn() -> isize, NtUnmapViewOfSectionFn>(proc)
    })
}

fn proc_address(
    module: HMODULE,
    name: &'static [u8],
    facility: Facility,
) -> Result<unsafe extern "system" fn() -> isize, Error> {
    if module == 0 {
        return Err(Error::unavailable(facility, "module not loaded"));
    }

    unsafe { GetProcAddress(module, name.as_ptr()) }.ok_or_else(|| {
        Error::unavailable(
            facility,
            format!(
                "{}: {}",
                String::from_utf8_lossy(&name[..name.len() - 1]),
                SystemError::from_errno()
            ),
        )
    })
}
