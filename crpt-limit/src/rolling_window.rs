use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use tokio::time::Instant;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::Admission;
use super::LimitError;

/// Upper bound on the slots reserved up front; the deque grows on demand.
const INITIAL_CAPACITY: usize = 1024;

/// A true rolling window.
///
/// Keeps the instants of the last `limit` admissions. A new caller is admitted
/// once the oldest of them is at least one window old, so no span of length
/// `window` ever contains more than `limit` admissions and waiters are released
/// one at a time as slots age out.
#[derive(Debug)]
pub(crate) struct RollingWindow {
    limit: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RollingWindow {
    pub(crate) fn new(limit: u32, window: Duration) -> Self {
        let limit = limit as usize;
        Self {
            limit,
            window,
            admitted: Mutex::new(VecDeque::with_capacity(limit.min(INITIAL_CAPACITY))),
        }
    }

    pub(crate) async fn acquire(&self, cancel: &CancellationToken) -> Result<Admission, LimitError> {
        let start = Instant::now();
        let mut blocked = false;

        loop {
            let wait = match self.try_admit() {
                None if blocked => {
                    return Ok(Admission::Delayed {
                        waited: start.elapsed(),
                    });
                }
                None => return Ok(Admission::Immediate),
                Some(wait) => wait,
            };
            blocked = true;
            tracing::debug!(?wait, "rolling window full");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LimitError::Interrupted),
                _ = sleep(wait) => {}
            }
        }
    }

    /// Records an admission, or returns how long until the oldest slot frees up.
    fn try_admit(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut admitted = self.admitted.lock().unwrap_or_else(PoisonError::into_inner);

        while admitted
            .front()
            .is_some_and(|oldest| now.duration_since(*oldest) >= self.window)
        {
            admitted.pop_front();
        }

        if admitted.len() < self.limit {
            admitted.push_back(now);
            None
        } else {
            admitted
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use more_asserts::assert_le;

    const WINDOW: Duration = Duration::from_secs(1);

    #[tokio::test(start_paused = true)]
    async fn it_enforces_limits() {
        let rl = RollingWindow::new(2, WINDOW);
        let cancel = CancellationToken::new();

        assert_eq!(rl.acquire(&cancel).await, Ok(Admission::Immediate));
        assert_eq!(rl.acquire(&cancel).await, Ok(Admission::Immediate));
        assert!(rl.try_admit().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn it_staggers_wakeups() {
        let rl = Arc::new(RollingWindow::new(2, WINDOW));
        let start = Instant::now();

        // Spread the first two admissions half a window apart.
        rl.acquire(&CancellationToken::new()).await.unwrap();
        tokio::time::advance(WINDOW / 2).await;
        rl.acquire(&CancellationToken::new()).await.unwrap();

        let handles = (0..2).map(|_| {
            let rl = Arc::clone(&rl);
            tokio::spawn(async move {
                rl.acquire(&CancellationToken::new()).await.unwrap();
                start.elapsed().as_millis()
            })
        });
        let mut released: Vec<_> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        released.sort_unstable();

        // Slots free up at 1.0s and 1.5s, not both at once.
        assert_eq!(released.len(), 2);
        assert!((1000..1010).contains(&released[0]), "{released:?}");
        assert!((1500..1510).contains(&released[1]), "{released:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn no_window_ever_holds_more_than_the_limit() {
        let limit = 3;
        let rl = Arc::new(RollingWindow::new(limit, WINDOW));
        let start = Instant::now();

        let handles = (0..10).map(|_| {
            let rl = Arc::clone(&rl);
            tokio::spawn(async move {
                rl.acquire(&CancellationToken::new()).await.unwrap();
                start.elapsed()
            })
        });
        let mut stamps: Vec<_> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        stamps.sort_unstable();

        for (i, stamp) in stamps.iter().enumerate() {
            let in_window = stamps[i..]
                .iter()
                .take_while(|later| **later - *stamp < WINDOW)
                .count();
            assert_le!(in_window, limit as usize);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_wait_is_not_admitted() {
        let rl = Arc::new(RollingWindow::new(1, WINDOW));
        let cancel = CancellationToken::new();
        rl.acquire(&cancel).await.unwrap();

        let waiter = {
            let rl = Arc::clone(&rl);
            let cancel = cancel.clone();
            tokio::spawn(async move { rl.acquire(&cancel).await })
        };
        tokio::time::sleep(WINDOW / 4).await;
        cancel.cancel();

        assert_eq!(waiter.await.unwrap(), Err(LimitError::Interrupted));
        assert_eq!(rl.admitted.lock().unwrap().len(), 1);
    }
}
