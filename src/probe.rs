use std::fmt;

use tracing::{debug, warn};

use crate::{Error, MappedRegion};

/// The unmap strategy selected for a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityMode {
    /// Release through the host's primary process-wide facility.
    PrimaryUnsafe,
    /// Release through the host's internal process-wide facility.
    InternalUnsafe,
    /// Release through the cleaner attached to each region.
    LegacyCleaner,
    /// No release mechanism is available.
    Unsupported,
}

impl CapabilityMode {
    pub fn supports_release(self) -> bool {
        self != Self::Unsupported
    }
}

/// A process-wide unmap facility a [`Runtime`] may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facility {
    Primary,
    Internal,
}

impl fmt::Display for Facility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Internal => f.write_str("internal"),
        }
    }
}

/// The host environment as seen by [`detect`] and [`RegionReleaser`](crate::RegionReleaser).
pub trait Runtime: Send + Sync {
    /// Whether the host belongs to the oldest supported generation, which only releases through
    /// per-region cleaners.
    fn is_legacy_family(&self) -> Result<bool, Error>;

    /// Attempts to load `facility`. Success means the facility exists and can be invoked.
    fn resolve(&self, facility: Facility) -> Result<(), Error>;

    /// Resolves `facility` and invokes it to unmap `region`.
    ///
    /// # Safety
    ///
    /// `region` must describe a live mapping exclusively owned by the caller, and none of its
    /// memory may be accessed once this returns.
    unsafe fn invoke_cleaner(
        &self,
        facility: Facility,
        region: &MappedRegion,
    ) -> Result<(), Error>;
}

/// Selects the capability of `runtime`. The first match wins:
///
/// 1. a legacy-generation host always uses [`CapabilityMode::LegacyCleaner`], without probing any
///    facility;
/// 2. a resolvable [`Facility::Primary`] selects [`CapabilityMode::PrimaryUnsafe`];
/// 3. a resolvable [`Facility::Internal`] selects [`CapabilityMode::InternalUnsafe`];
/// 4. otherwise the host is [`CapabilityMode::Unsupported`].
///
/// Detection never fails. Every candidate that can't be used is logged as a warning and skipped.
pub fn detect<R: Runtime + ?Sized>(runtime: &R) -> CapabilityMode {
    let mode = detect_inner(runtime);
    debug!("selected unmap capability {:?}", mode);
    mode
}

fn detect_inner<R: Runtime + ?Sized>(runtime: &R) -> CapabilityMode {
    match runtime.is_legacy_family() {
        Ok(true) => return CapabilityMode::LegacyCleaner,
        Ok(false) => {}
        Err(e) => warn!("couldn't determine host generation, assuming current: {}", e),
    }

    for (facility, mode) in [
        (Facility::Primary, CapabilityMode::PrimaryUnsafe),
        (Facility::Internal, CapabilityMode::InternalUnsafe),
    ] {
        match runtime.resolve(facility) {
            Ok(()) => return mode,
            Err(e) => warn!("{} unmap facility unavailable: {}", facility, e),
        }
    }

    CapabilityMode::Unsupported
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::testing::FakeRuntime;

    #[test]
    fn nothing_resolvable_is_unsupported() {
        let runtime = FakeRuntime::new();
        assert_eq!(detect(&runtime), CapabilityMode::Unsupported);
        assert_eq!(runtime.resolutions(), vec![Facility::Primary, Facility::Internal]);
    }

    #[test]
    fn primary_preferred_over_internal() {
        let runtime = FakeRuntime::new().with_primary().with_internal();
        assert_eq!(detect(&runtime), CapabilityMode::PrimaryUnsafe);
        assert_eq!(runtime.resolutions(), vec![Facility::Primary]);
    }

    #[test]
    fn internal_used_when_primary_missing() {
        let runtime = FakeRuntime::new().with_internal();
        assert_eq!(detect(&runtime), CapabilityMode::InternalUnsafe);
    }

    #[test]
    fn legacy_wins_without_probing() {
        let runtime = FakeRuntime::new().legacy().with_primary().with_internal();
        assert_eq!(detect(&runtime), CapabilityMode::LegacyCleaner);
        assert!(runtime.resolutions().is_empty());
    }

    #[test]
    fn unreadable_version_falls_through() {
        let runtime = FakeRuntime::new().unreadable_version().with_primary();
        assert_eq!(detect(&runtime), CapabilityMode::PrimaryUnsafe);
        assert_eq!(runtime.legacy_checks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn detection_is_deterministic() {
        let configs = [
            FakeRuntime::new(),
            FakeRuntime::new().with_internal(),
            FakeRuntime::new().with_primary(),
            FakeRuntime::new().legacy(),
        ];
        for runtime in &configs {
            let first = detect(runtime);
            for _ in 0..5 {
                assert_eq!(detect(runtime), first);
            }
        }
    }

    #[test]
    fn only_unsupported_lacks_release() {
        assert!(CapabilityMode::PrimaryUnsafe.supports_release());
        assert!(CapabilityMode::InternalUnsafe.supports_release());
        assert!(CapabilityMode::LegacyCleaner.supports_release());
        assert!(!CapabilityMode::Unsupported.supports_release());
    }
}
