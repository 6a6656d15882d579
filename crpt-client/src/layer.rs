use std::sync::Arc;

use crpt_limit::RateLimiter;
use tower::Layer;

use crate::service::Interrupter;
use crate::service::ThrottleService;

/// Applies rate limit admission to requests.
#[derive(Clone, Debug)]
pub struct ThrottleLayer {
    limiter: Arc<RateLimiter>,
    interrupter: Option<Interrupter>,
}

impl ThrottleLayer {
    /// Create a ThrottleLayer. Services built from one layer share its limiter.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        ThrottleLayer {
            limiter,
            interrupter: None,
        }
    }

    /// Abort the admission waits pending whenever `interrupter` fires.
    ///
    /// Interrupted requests fail with `LimitError::Interrupted` and are not
    /// forwarded to the inner service.
    pub fn with_interrupter(mut self, interrupter: Interrupter) -> Self {
        self.interrupter = Some(interrupter);
        self
    }
}

impl<S> Layer<S> for ThrottleLayer {
    type Service = ThrottleService<S>;

    fn layer(&self, service: S) -> Self::Service {
        let svc = ThrottleService::new(service, Arc::clone(&self.limiter));
        match &self.interrupter {
            Some(interrupter) => svc.with_interrupter(interrupter.clone()),
            None => svc,
        }
    }
}
