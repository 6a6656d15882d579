use std::sync::Arc;
use std::time::Duration;

use crpt_limit::LimitError;
use crpt_limit::RateLimiter;
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use reqwest::header::AUTHORIZATION;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use secrecy::ExposeSecret as _;
use tower::BoxError;
use tower::Layer as _;
use tower::Service;
use tower::ServiceExt as _;
use url::Url;

use crate::config::ApiConfig;
use crate::document::Document;
use crate::envelope;
use crate::envelope::SubmitBody;
use crate::error::ApiError;
use crate::layer::ThrottleLayer;
use crate::service::Interrupter;
use crate::service::ThrottleService;
use crate::transport::HttpTransport;
use crate::transport::Inbound;
use crate::transport::Outbound;

/// Endpoint for introducing goods produced in Russia under contract.
pub const CREATE_CONTRACT_PATH: &str = "/api/v3/lk/documents/commissioning/contract/create";

/// What `submit` does when the HTTP exchange itself fails.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure and answer `Ok("")`.
    ///
    /// Callers cannot tell a failed exchange from an empty response body.
    #[default]
    Swallow,
    /// Return [`ApiError::Transport`].
    Propagate,
}

impl FailurePolicy {
    fn as_str(self) -> &'static str {
        match self {
            FailurePolicy::Swallow => "swallow",
            FailurePolicy::Propagate => "propagate",
        }
    }
}

/// Submits commissioning documents through a shared rate limiter.
///
/// Clones share the limiter, the transport and the [`Interrupter`].
#[derive(Debug)]
pub struct SubmissionClient<S = HttpTransport> {
    config: ApiConfig,
    service: ThrottleService<S>,
    interrupter: Interrupter,
    failure_policy: FailurePolicy,
    transport_failures: Counter<u64>,
}

impl<S: Clone> Clone for SubmissionClient<S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            service: self.service.clone(),
            interrupter: self.interrupter.clone(),
            failure_policy: self.failure_policy,
            transport_failures: self.transport_failures.clone(),
        }
    }
}

impl SubmissionClient<HttpTransport> {
    /// Creates a client from the environment admitting `request_limit` calls
    /// per `window`. A limit of `0` disables throttling.
    pub fn from_env(window: Duration, request_limit: i64) -> Result<Self, ApiError> {
        let limiter = RateLimiter::new(window, request_limit)?;
        Self::new(ApiConfig::from_env()?, limiter)
    }

    /// Creates a client that talks HTTP through `reqwest`.
    pub fn new(config: ApiConfig, limiter: RateLimiter) -> Result<Self, ApiError> {
        let transport = HttpTransport::new(config.request_timeout)?;
        Ok(Self::with_transport(config, limiter, transport))
    }
}

impl<S> SubmissionClient<S>
where
    S: Service<Outbound, Response = Inbound, Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    /// Creates a client that sends through `transport`.
    pub fn with_transport(config: ApiConfig, limiter: RateLimiter, transport: S) -> Self {
        let interrupter = Interrupter::new();
        let service = ThrottleLayer::new(Arc::new(limiter))
            .with_interrupter(interrupter.clone())
            .layer(transport);
        let transport_failures = global::meter("crpt_client")
            .u64_counter("transport_failures")
            .build();

        Self {
            config,
            service,
            interrupter,
            failure_policy: FailurePolicy::default(),
            transport_failures,
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    pub fn limiter(&self) -> &RateLimiter {
        self.service.limiter()
    }

    /// Fails the admission waits pending on this client and its clones with
    /// [`ApiError::Interrupted`]. Later calls are throttled as usual.
    pub fn interrupt(&self) {
        self.interrupter.interrupt();
    }

    /// Introduces goods produced in Russia: [`SubmissionClient::submit`] to
    /// [`CREATE_CONTRACT_PATH`].
    pub async fn create_document_for_russian_product(
        &self,
        document: &Document,
        signature: &str,
    ) -> Result<String, ApiError> {
        self.submit(document, signature, CREATE_CONTRACT_PATH).await
    }

    /// Encodes `document`, waits for admission and POSTs it to `endpoint_path`.
    ///
    /// Returns the raw response body whatever the HTTP status. Nothing is
    /// retried.
    ///
    /// # Errors
    ///
    /// - [`ApiError::InvalidDocument`] / [`ApiError::Encoding`] before any I/O.
    /// - [`ApiError::InvalidConfiguration`] if `endpoint_path` does not start
    ///   with `/` or does not form a valid URL with the base.
    /// - [`ApiError::Interrupted`] if the admission wait was interrupted.
    /// - [`ApiError::Transport`] only under [`FailurePolicy::Propagate`].
    pub async fn submit(
        &self,
        document: &Document,
        signature: &str,
        endpoint_path: &str,
    ) -> Result<String, ApiError> {
        let product_document = envelope::encode_document(document)?;
        let url = self.config.endpoint(endpoint_path)?;

        let outbound = match self.outbound(url, &product_document, signature) {
            Ok(outbound) => outbound,
            Err(err) => return self.transport_failure(endpoint_path, err),
        };

        match self.service.clone().oneshot(outbound).await {
            Ok(inbound) => {
                if !inbound.status.is_success() {
                    tracing::warn!(
                        status = %inbound.status,
                        path = endpoint_path,
                        doc_id = %document.doc_id,
                        "document endpoint answered with an error status"
                    );
                }
                Ok(inbound.body)
            }
            Err(err) => match err.downcast::<LimitError>() {
                Ok(limit) => Err(ApiError::from(*limit)),
                Err(err) => self.transport_failure(endpoint_path, err),
            },
        }
    }

    fn outbound(
        &self,
        url: Url,
        product_document: &str,
        signature: &str,
    ) -> Result<Outbound, BoxError> {
        let body = serde_json::to_string(&SubmitBody::new(product_document, signature))?;

        let mut bearer =
            HeaderValue::from_str(&format!("Bearer {}", self.config.token.expose_secret()))?;
        bearer.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, bearer);

        Ok(Outbound { url, headers, body })
    }

    fn transport_failure(&self, endpoint_path: &str, err: BoxError) -> Result<String, ApiError> {
        self.transport_failures
            .add(1, &[KeyValue::new("policy", self.failure_policy.as_str())]);

        match self.failure_policy {
            FailurePolicy::Swallow => {
                tracing::error!(
                    error = %err,
                    path = endpoint_path,
                    "document submission failed, answering with an empty body"
                );
                Ok(String::new())
            }
            FailurePolicy::Propagate => Err(ApiError::Transport(err.to_string())),
        }
    }
}
