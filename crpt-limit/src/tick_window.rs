use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use tokio::time::Instant;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::Admission;
use super::LimitError;

#[derive(Debug)]
struct Quota {
    remaining: i64,
    /// Bumped on every refill so waiters from one window share a single reset.
    generation: u64,
}

/// Counter that is refilled one window after it first runs dry.
///
/// A caller that drives the counter negative sleeps for exactly one window
/// and then refills it, unless another waiter from the same generation already
/// did. It then competes for the fresh quota like any other caller, so at most
/// `limit` callers leave per refill.
#[derive(Debug)]
pub(crate) struct TickWindow {
    limit: i64,
    window: Duration,
    quota: Mutex<Quota>,
}

impl TickWindow {
    pub(crate) fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: i64::from(limit),
            window,
            quota: Mutex::new(Quota {
                remaining: i64::from(limit),
                generation: 0,
            }),
        }
    }

    pub(crate) async fn acquire(&self, cancel: &CancellationToken) -> Result<Admission, LimitError> {
        let start = Instant::now();
        let mut blocked = false;

        loop {
            let ticket = match self.take() {
                Ok(()) if blocked => {
                    return Ok(Admission::Delayed {
                        waited: start.elapsed(),
                    });
                }
                Ok(()) => return Ok(Admission::Immediate),
                Err(ticket) => ticket,
            };
            blocked = true;
            tracing::debug!(
                generation = ticket,
                window = ?self.window,
                "quota exhausted, waiting one window"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.give_back(ticket);
                    return Err(LimitError::Interrupted);
                }
                _ = sleep(self.window) => self.refill(ticket),
            }
        }
    }

    /// Decrements the counter. On exhaustion returns the generation to wait on.
    fn take(&self) -> Result<(), u64> {
        let mut quota = self.lock();
        quota.remaining -= 1;
        if quota.remaining >= 0 {
            Ok(())
        } else {
            Err(quota.generation)
        }
    }

    fn refill(&self, ticket: u64) {
        let mut quota = self.lock();
        if quota.generation == ticket {
            quota.remaining = self.limit;
            quota.generation = quota.generation.wrapping_add(1);
            tracing::trace!(generation = quota.generation, "quota refilled");
        }
    }

    fn give_back(&self, ticket: u64) {
        let mut quota = self.lock();
        if quota.generation == ticket {
            quota.remaining += 1;
        }
    }

    // The critical sections cannot panic half way, so a poisoned lock still
    // holds a consistent counter.
    fn lock(&self) -> MutexGuard<'_, Quota> {
        self.quota.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
