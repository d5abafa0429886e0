//! Unmapper exposes a mechanism for [releasing](release) memory-mapped file regions explicitly and
//! immediately, rather than leaving them mapped until the process exits.
//!
//! ## Terminology
//!
//! - A **mapped region** is a range of the process' address space backed directly by a file's
//!   contents. Storage engines map segment files and must tear those mappings down before the
//!   file is deleted, truncated or renamed.
//!
//! - A **facility** is a process-wide unmap primitive the host may or may not expose. Hosts
//!   differ in which facilities they offer, and none is guaranteed to exist.
//!
//! - A **cleaner** is a one-shot handle attached to an individual [`MappedRegion`] which, when
//!   invoked, unmaps that region alone.
//!
//! The first time release is requested, the host is probed once for the facility to use (see
//! [`detect`] for the order). The result, a [`CapabilityMode`], is cached for the lifetime of the
//! process. Release never fails loudly: if no facility exists, [`supports_release`] reports
//! `false` and [`release`] is a no-op, and any failure during an actual release is logged and
//! swallowed. At worst a mapping outlives its usefulness until the OS reclaims it at exit.

use std::sync::atomic::{AtomicUsize, Ordering};

mod error;
mod probe;
mod region;
mod releaser;
mod sys;

#[cfg(test)]
mod testing;


pub use error::Error;
pub use probe::{detect, CapabilityMode, Facility, Runtime};
pub use region::{Cleaner, FileId, MappedRegion};
pub use releaser::{RegionReleaser, ReleaseGuard};
pub use sys::{HostRuntime, SystemError};

static HOST_RELEASER: RegionReleaser<HostRuntime> = RegionReleaser::new(HostRuntime::new());

/// The process-wide releaser backed by the current host.
pub fn host() -> &'static RegionReleaser<HostRuntime> {
    &HOST_RELEASER
}

/// The capability selected for this process, detecting it on first use.
pub fn capability() -> CapabilityMode {
    HOST_RELEASER.mode()
}

/// Whether explicit release is possible on this host.
///
/// Callers which see `false` must rely on the mapping being reclaimed when the process exits.
pub fn supports_release() -> bool {
    HOST_RELEASER.supports_release()
}

/// Attempts to unmap `region` with the process-wide releaser.
///
/// Returns `false` only if release is unsupported on this host. A `true` return means the release
/// was attempted: failures of the underlying unmap are logged but not reported. Use
/// [`RegionReleaser::try_release`] on [`host()`] to observe them.
pub fn release(region: MappedRegion) -> bool {
    HOST_RELEASER.release(region)
}

pub fn page_size() -> usize {
    static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

    let mut size = PAGE_SIZE.load(Ordering::Relaxed);
    if size == 0 {
        size = sys::page_size_u32() as usize;
        PAGE_SIZE.store(size, Ordering::Relaxed);
    }
    size
}
