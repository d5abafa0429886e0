use crate::{Facility, SystemError};
use thiserror::Error;

/// Errors arising while probing for or invoking an unmap facility.
///
/// None of these escape [`release`](crate::release); they are logged there. They are only
/// returned to callers of [`RegionReleaser::try_release`](crate::RegionReleaser::try_release).
#[derive(Debug, Error)]
pub enum Error {
    /// No facility for explicit release exists on this host.
    #[error("Explicit release unsupported on this host")]
    Unsupported,

    /// A facility could not be loaded or resolved.
    #[error("Unmap facility unavailable: {facility} ({reason})")]
    Unavailable { facility: Facility, reason: String },

    /// The host's version marker could not be read.
    #[error("Host version unavailable: {}", _0)]
    VersionUnavailable(#[source] SystemError),

    /// The legacy path was selected but the region carries no cleaner.
    #[error("Region has no attached cleaner")]
    NoCleaner,

    /// The unmap call itself failed.
    #[error("Unmap failed: {}", _0)]
    System(#[from] SystemError),

    /// A cleaner or facility panicked while unmapping.
    #[error("Unmap panicked: {}", _0)]
    Panicked(String),
}

impl Error {
    pub(crate) fn unavailable(facility: Facility, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            facility,
            reason: reason.into(),
        }
    }
}
