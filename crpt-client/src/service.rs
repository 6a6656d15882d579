use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::task::Context;
use std::task::Poll;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tower::Service;
use tower::ServiceExt;

use crpt_limit::Admission;
use crpt_limit::RateLimiter;

/// Interrupts the admission waits that are pending when it fires.
///
/// Each request takes the current token when it is called. [`interrupt`]
/// cancels that token and installs a fresh one, so requests made afterwards
/// wait normally. Clones share state.
///
/// [`interrupt`]: Interrupter::interrupt
#[derive(Clone, Debug, Default)]
pub struct Interrupter {
    current: Arc<Mutex<CancellationToken>>,
}

impl Interrupter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The token that the next request will wait on.
    pub fn token(&self) -> CancellationToken {
        self.lock().clone()
    }

    pub fn interrupt(&self) {
        let mut current = self.lock();
        current.cancel();
        *current = CancellationToken::new();
    }

    fn lock(&self) -> MutexGuard<'_, CancellationToken> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone, Debug)]
struct ThrottleServiceMetrics {
    admissions: Counter<u64>,
}

/// Waits for rate limit admission before handing a request to `inner`.
///
/// Admission happens inside the response future, so `poll_ready` never
/// reserves quota for a request that might not be sent. A cancelled wait
/// resolves to a boxed [`crpt_limit::LimitError::Interrupted`] and `inner` is
/// never called. See [`Interrupter`].
#[derive(Debug)]
pub struct ThrottleService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
    interrupter: Interrupter,
    instruments: ThrottleServiceMetrics,
}

impl<S> Clone for ThrottleService<S>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: Arc::clone(&self.limiter),
            interrupter: self.interrupter.clone(),
            instruments: self.instruments.clone(),
        }
    }
}

impl<S, Req> Service<Req> for ThrottleService<S>
where
    S: Service<Req, Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, BoxError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Inner readiness is checked after admission, inside call().
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let limiter = Arc::clone(&self.limiter);
        let cancel = self.interrupter.token();
        let admissions = self.instruments.admissions.clone();

        Box::pin(async move {
            let admission = limiter.acquire_or_cancel(&cancel).await?;
            let waited = match admission {
                Admission::Immediate => false,
                Admission::Delayed { waited } => {
                    tracing::debug!(?waited, "admitted after throttling");
                    true
                }
            };
            admissions.add(1, &[KeyValue::new("waited", waited)]);

            inner.oneshot(req).await
        })
    }
}

impl<S> ThrottleService<S> {
    pub fn new(inner: S, limiter: Arc<RateLimiter>) -> Self {
        let meter = global::meter("crpt_client");
        let instruments = ThrottleServiceMetrics {
            admissions: meter.u64_counter("throttle_admissions").build(),
        };

        Self {
            inner,
            limiter,
            interrupter: Interrupter::new(),
            instruments,
        }
    }

    pub fn with_interrupter(mut self, interrupter: Interrupter) -> Self {
        self.interrupter = interrupter;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}
