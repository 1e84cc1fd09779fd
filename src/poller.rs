use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::authority::CertificateAuthority;
use crate::error::ResourceError;
use crate::model::PhysicalId;

/// Fixed cadence of validation checks. Validation sweeps run on a roughly
/// fixed schedule, so the interval does not back off.
pub const POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Time source for the poller.
pub trait Clock: Send + Sync {
    /// Monotonic time since an arbitrary fixed origin.
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time backed by [`Instant`].
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// A clock that only moves when slept on. Sleeping returns immediately.
#[derive(Default)]
pub struct ManualClock {
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        let mut elapsed = self
            .elapsed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *elapsed += duration;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self
            .elapsed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Waits for the authority to report a certificate's DNS validation as done.
pub struct ValidationPoller {
    authority: Arc<dyn CertificateAuthority>,
    clock: Arc<dyn Clock>,
}

impl ValidationPoller {
    pub fn new(authority: Arc<dyn CertificateAuthority>, clock: Arc<dyn Clock>) -> Self {
        Self { authority, clock }
    }

    /// Sleeps one interval before every check, including the first, and
    /// gives up once `timeout_secs` have elapsed since the call started.
    /// Succeeds only when every name on the certificate is validated.
    pub fn await_validation(&self, id: &PhysicalId, timeout_secs: u64) -> Result<(), ResourceError> {
        let timeout = Duration::from_secs(timeout_secs);
        let started = self.clock.now();
        let mut attempt = 0;

        loop {
            self.clock.sleep(POLL_INTERVAL);
            attempt += 1;
            let descriptor = self.authority.describe_validation(id)?;

            if let Some(method) = descriptor.foreign_method() {
                return Err(ResourceError::UnexpectedState(format!(
                    "Certificate unexpectedly changed its validation method from \"DNS\" to \"{}\"",
                    method
                )));
            }
            if descriptor.is_validated() {
                info!(
                    "[acm-poll] Certificate {} validated after {} check(s)",
                    id, attempt
                );
                return Ok(());
            }

            let elapsed = self.clock.now().saturating_sub(started);
            if elapsed >= timeout {
                return Err(ResourceError::Timeout(timeout_secs));
            }
            debug!(
                "[acm-poll] Waiting for certificate {} to be validated ({}, attempt {}); timeout in {}s",
                id,
                descriptor.status_summary(),
                attempt,
                timeout.saturating_sub(elapsed).as_secs()
            );
        }
    }
}
