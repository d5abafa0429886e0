use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::OnceLock,
};

use tracing::{debug, error};

use crate::{detect, CapabilityMode, Error, Facility, MappedRegion, Runtime};

/// Releases regions through whichever capability its [`Runtime`] exposes.
///
/// The capability is detected on first use and never again, even under concurrent first use.
pub struct RegionReleaser<R> {
    runtime: R,
    mode: OnceLock<CapabilityMode>,
}

impl<R: Runtime> RegionReleaser<R> {
    pub const fn new(runtime: R) -> Self {
        Self {
            runtime,
            mode: OnceLock::new(),
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn mode(&self) -> CapabilityMode {
        *self.mode.get_or_init(|| detect(&self.runtime))
    }

    pub fn supports_release(&self) -> bool {
        self.mode().supports_release()
    }

    /// Attempts to unmap `region`.
    ///
    /// Returns `false` without doing anything if release is unsupported. Otherwise returns `true`
    /// once the unmap was attempted, whether or not it succeeded; failures are logged.
    pub fn release(&self, region: MappedRegion) -> bool {
        let mode = self.mode();
        if !mode.supports_release() {
            debug!("explicit release unsupported, leaving {:?} mapped", region);
            return false;
        }

        let (base, len) = (region.as_ptr(), region.len());
        if let Err(e) = self.dispatch(mode, region) {
            error!("failed to unmap region {:p} ({} bytes): {}", base, len, e);
        }
        true
    }

    /// Makes the same single attempt as [`release`](Self::release), reporting its outcome.
    pub fn try_release(&self, region: MappedRegion) -> Result<(), Error> {
        let mode = self.mode();
        if !mode.supports_release() {
            return Err(Error::Unsupported);
        }
        self.dispatch(mode, region)
    }

    /// Releases `region` when the returned guard goes out of scope.
    pub fn guard(&self, region: MappedRegion) -> ReleaseGuard<'_, R> {
        ReleaseGuard {
            releaser: self,
            region: Some(region),
        }
    }

    fn dispatch(&self, mode: CapabilityMode, region: MappedRegion) -> Result<(), Error> {
        let attempt = panic::catch_unwind(AssertUnwindSafe(move || match mode {
            // Safety: `region` is exclusively owned and dropped right after this call.
            CapabilityMode::PrimaryUnsafe => unsafe {
                self.runtime.invoke_cleaner(Facility::Primary, &region)
            },
            CapabilityMode::InternalUnsafe => unsafe {
                self.runtime.invoke_cleaner(Facility::Internal, &region)
            },
            CapabilityMode::LegacyCleaner => region.into_cleaner().ok_or(Error::NoCleaner)?.clean(),
            CapabilityMode::Unsupported => Err(Error::Unsupported),
        }));

        attempt.unwrap_or_else(|payload| Err(Error::Panicked(panic_message(&*payload))))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// Releases its region when dropped, unless disarmed with [`into_inner`](Self::into_inner).
#[derive(Debug)]
pub struct ReleaseGuard<'a, R: Runtime> {
    releaser: &'a RegionReleaser<R>,
    region: Option<MappedRegion>,
}

impl<'a, R: Runtime> ReleaseGuard<'a, R> {
    pub fn region(&self) -> &MappedRegion {
        self.region.as_ref().expect("guard holds a region until consumed")
    }

    /// Releases the region now. See [`RegionReleaser::release`].
    pub fn release(mut self) -> bool {
        match self.region.take() {
            Some(region) => self.releaser.release(region),
            None => false,
        }
    }

    /// Disarms the guard, handing the region back.
    pub fn into_inner(mut self) -> MappedRegion {
        self.region
            .take()
            .expect("guard holds a region until consumed")
    }
}

impl<R: Runtime> Drop for ReleaseGuard<'_, R> {
    fn drop(&mut self) {
        if let Some(region) = self.region.take() {
            self.releaser.release(region);
        }
    }
}

impl<R: Runtime + std::fmt::Debug> std::fmt::Debug for RegionReleaser<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionReleaser")
            .field("runtime", &self.runtime)
            .field("mode", &self.mode.get())
            .finish()
    }
}
