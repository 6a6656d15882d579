//! # crpt-limit
//!
//! `crpt-limit` bounds how many outbound calls leave a process per time window.
//!
//! ## Core Philosophy
//!
//! Callers never get a "denied" answer. [`RateLimiter::acquire`] either returns
//! straight away or suspends the calling task until the window lets it through.
//! All bookkeeping lives behind a single `Mutex` that is held only for the
//! counter update, never across a sleep, so a slow waiter cannot stall the
//! admission decision of anyone else.
//!
//! ## Policies
//!
//! * **Tick reset** ([`RateLimiter::new`]): a remaining-quota counter. Once it
//!   goes negative the caller sleeps for exactly one window and the counter is
//!   refilled. Waiters that block together wake together.
//! * **Rolling window** ([`RateLimiter::rolling`]): remembers the last `N`
//!   admission instants and holds a caller until the oldest one leaves the
//!   window, so wake-ups are staggered.
//!
//! A limit of `0` disables throttling for either policy.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use crpt_limit::Admission;
//! use crpt_limit::RateLimiter;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), crpt_limit::LimitError> {
//! let limiter = RateLimiter::new(Duration::from_secs(1), 10)?;
//!
//! if limiter.acquire().await? == Admission::Immediate {
//!     // Request allowed without waiting
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tokio_util::sync::CancellationToken;

mod error;
mod rolling_window;
mod tick_window;

pub use error::LimitError;

use rolling_window::RollingWindow;
use tick_window::TickWindow;

/// How a call was let through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Quota was available, no suspension happened.
    Immediate,
    /// The caller was suspended before being admitted.
    Delayed {
        /// Total time spent suspended.
        waited: Duration,
    },
}

impl Admission {
    pub fn is_immediate(&self) -> bool {
        matches!(self, Admission::Immediate)
    }
}

#[derive(Debug)]
enum Policy {
    Unlimited,
    Tick(TickWindow),
    Rolling(RollingWindow),
}

/// Admission gate shared by every caller that submits through it.
///
/// Wrap it in an `Arc` to share it across tasks.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    request_limit: u32,
    policy: Policy,
}

impl RateLimiter {
    /// Creates a tick-reset limiter admitting `request_limit` calls per `window`.
    ///
    /// # Errors
    ///
    /// Returns [`LimitError::InvalidConfiguration`] if `request_limit` is
    /// negative or does not fit the counter.
    pub fn new(window: Duration, request_limit: i64) -> Result<Self, LimitError> {
        let request_limit = checked_limit(request_limit)?;
        let policy = if request_limit == 0 {
            Policy::Unlimited
        } else {
            Policy::Tick(TickWindow::new(request_limit, window))
        };
        Ok(Self {
            window,
            request_limit,
            policy,
        })
    }

    /// Creates a rolling-window limiter: at most `request_limit` admissions in
    /// any span of length `window`.
    ///
    /// # Errors
    ///
    /// Same as [`RateLimiter::new`].
    pub fn rolling(window: Duration, request_limit: i64) -> Result<Self, LimitError> {
        let request_limit = checked_limit(request_limit)?;
        let policy = if request_limit == 0 {
            Policy::Unlimited
        } else {
            Policy::Rolling(RollingWindow::new(request_limit, window))
        };
        Ok(Self {
            window,
            request_limit,
            policy,
        })
    }

    /// Waits for admission. Never fails for lack of quota, only suspends.
    ///
    /// # Errors
    ///
    /// Never returns [`LimitError::Interrupted`] since nothing can cancel the
    /// wait; the `Result` keeps the signature aligned with
    /// [`RateLimiter::acquire_or_cancel`].
    pub async fn acquire(&self) -> Result<Admission, LimitError> {
        self.acquire_or_cancel(&CancellationToken::new()).await
    }

    /// Waits for admission, giving up if `cancel` fires while suspended.
    ///
    /// A cancelled caller is never admitted and the quota it reserved is
    /// returned when the window has not been refilled in the meantime.
    ///
    /// # Errors
    ///
    /// Returns [`LimitError::Interrupted`] if the wait was cancelled.
    pub async fn acquire_or_cancel(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Admission, LimitError> {
        match &self.policy {
            Policy::Unlimited => Ok(Admission::Immediate),
            Policy::Tick(window) => window.acquire(cancel).await,
            Policy::Rolling(window) => window.acquire(cancel).await,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn request_limit(&self) -> u32 {
        self.request_limit
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self.policy, Policy::Unlimited)
    }
}

fn checked_limit(request_limit: i64) -> Result<u32, LimitError> {
    u32::try_from(request_limit).map_err(|_| LimitError::InvalidConfiguration {
        limit: request_limit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use tokio::time::Instant;

    #[test]
    fn it_rejects_negative_limits() {
        let err = RateLimiter::new(Duration::from_secs(1), -1).unwrap_err();
        assert_eq!(err, LimitError::InvalidConfiguration { limit: -1 });

        let err = RateLimiter::rolling(Duration::from_secs(1), -5).unwrap_err();
        assert_eq!(err, LimitError::InvalidConfiguration { limit: -5 });
    }

    #[test]
    fn it_rejects_limits_beyond_the_counter() {
        let limit = i64::from(u32::MAX) + 1;
        assert!(matches!(
            RateLimiter::new(Duration::from_secs(1), limit),
            Err(LimitError::InvalidConfiguration { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn the_largest_limits_are_usable() {
        let max = i64::from(u32::MAX);
        for rl in [
            RateLimiter::new(Duration::from_secs(1), max).unwrap(),
            RateLimiter::rolling(Duration::from_secs(1), max).unwrap(),
        ] {
            assert_eq!(rl.request_limit(), u32::MAX);
            for _ in 0..2_000 {
                assert_eq!(rl.acquire().await.unwrap(), Admission::Immediate);
            }
        }
    }

    #[test]
    fn zero_limit_means_unlimited() {
        let rl = RateLimiter::new(Duration::from_secs(1), 0).unwrap();
        assert!(rl.is_unlimited());
        assert_eq!(rl.request_limit(), 0);
        assert_eq!(rl.window(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn unlimited_never_blocks() {
        for rl in [
            RateLimiter::new(Duration::from_secs(60), 0).unwrap(),
            RateLimiter::rolling(Duration::from_secs(60), 0).unwrap(),
        ] {
            let start = Instant::now();
            for _ in 0..10_000 {
                assert_eq!(rl.acquire().await.unwrap(), Admission::Immediate);
            }
            assert_eq!(start.elapsed(), Duration::ZERO);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unlimited_ignores_cancellation() {
        let rl = RateLimiter::new(Duration::from_secs(1), 0).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(
            rl.acquire_or_cancel(&cancel).await,
            Ok(Admission::Immediate)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_within_the_limit_never_block() {
        let limit = 50;
        let rl = Arc::new(RateLimiter::new(Duration::from_secs(1), limit).unwrap());

        let handles = (0..limit).map(|_| {
            let rl = Arc::clone(&rl);
            tokio::spawn(async move { rl.acquire().await })
        });

        let results = futures::future::join_all(handles).await;
        assert!(
            results
                .into_iter()
                .all(|r| matches!(r, Ok(Ok(Admission::Immediate))))
        );
    }
}
