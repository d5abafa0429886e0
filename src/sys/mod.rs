#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as imp;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as imp;

pub use imp::SystemError;
pub(crate) use imp::{file_id, page_size_u32, unmap};

use crate::{Error, Facility, MappedRegion, Runtime};

/// The [`Runtime`] of the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostRuntime {
    _private: (),
}

impl HostRuntime {
    pub const fn new() -> Self {
        Self { _private: () }
    }
}

impl Runtime for HostRuntime {
    fn is_legacy_family(&self) -> Result<bool, Error> {
        imp::is_legacy_family()
    }

    fn resolve(&self, facility: Facility) -> Result<(), Error> {
        imp::resolve(facility)
    }

    unsafe fn invoke_cleaner(
        &self,
        facility: Facility,
        region: &MappedRegion,
    ) -> Result<(), Error> {
        imp::invoke(facility, region.as_ptr(), region.len())
    }
}
