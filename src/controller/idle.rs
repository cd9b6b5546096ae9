use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::state::ExitReason;
use super::Controller;

/// How often a disabled watchdog checks whether `max_idle` was turned on.
const DISABLED_RECHECK: Duration = Duration::from_secs(60);

/// Time of the most recent control request.
#[derive(Debug)]
pub struct ActivityClock {
    last: Mutex<Instant>,
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self {
            last: Mutex::new(Instant::now()),
        }
    }
}

impl ActivityClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Time left before `max_idle` is reached, or `None` once it has been.
    pub fn remaining(&self, max_idle: Duration) -> Option<Duration> {
        max_idle
            .checked_sub(self.idle_for())
            .filter(|d| !d.is_zero())
    }
}

/// Stop the bridge once no control request has arrived for `max_idle`.
///
/// The limit is re-read on every wake-up so a configuration reset takes
/// effect without restarting the watchdog.
pub async fn run_watchdog(controller: Arc<Controller>, cancel: CancellationToken) {
    loop {
        let wait = match controller.settings().await.max_idle() {
            None => DISABLED_RECHECK,
            Some(max_idle) => match controller.activity().remaining(max_idle) {
                Some(left) => left,
                None => {
                    info!(?max_idle, "no control requests received; stopping idle bridge");
                    controller.force_stop(0, ExitReason::IdleTimeout);
                    return;
                }
            },
        };

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = cancel.cancelled() => {
                debug!("idle watchdog cancelled");
                return;
            }
        }
    }
}
