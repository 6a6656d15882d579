//! # crpt-client
//!
//! `crpt-client` submits goods-commissioning documents to the CRPT ("Честный
//! знак") HTTP API while keeping the whole process under a per-window request
//! limit.
//!
//! ## The Pipeline
//!
//! A [`SubmissionClient::submit`] call runs three stages in order:
//!
//! 1. **Encoding**: the [`Document`] is checked, serialized into the wire
//!    JSON and base64 encoded. Invalid documents fail here with
//!    [`ApiError::InvalidDocument`] and never touch the limiter.
//! 2. **Admission**: the [`ThrottleService`] waits on a shared
//!    [`crpt_limit::RateLimiter`]. [`SubmissionClient::interrupt`] aborts
//!    pending waits with [`ApiError::Interrupted`].
//! 3. **Transport**: the envelope is POSTed with a bearer token. The raw
//!    response body is returned whatever the status. Transport failures follow
//!    the client's [`FailurePolicy`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use crpt_client::Document;
//! use crpt_client::SubmissionClient;
//!
//! # async fn run(document: Document) -> Result<(), crpt_client::ApiError> {
//! // TOKEN_CRPT must be set, CRPT_API_URL is optional.
//! let client = SubmissionClient::from_env(Duration::from_secs(1), 10)?;
//! let body = client
//!     .create_document_for_russian_product(&document, "c2lnbmF0dXJl")
//!     .await?;
//! println!("{body}");
//! # Ok(())
//! # }
//! ```
//!
//! The throttle is an ordinary `tower` layer, so any
//! `Service<Outbound, Response = Inbound, Error = BoxError>` can stand in for
//! the HTTP transport via [`SubmissionClient::with_transport`].

mod client;
mod config;
mod document;
pub mod envelope;
mod error;
mod layer;
mod service;
mod transport;


pub use client::CREATE_CONTRACT_PATH;
pub use client::FailurePolicy;
pub use client::SubmissionClient;
pub use config::ApiConfig;
pub use config::BASE_URL_VAR;
pub use config::DEFAULT_BASE_URL;
pub use config::TOKEN_VAR;
pub use crpt_limit::Admission;
pub use crpt_limit::RateLimiter;
pub use document::CertificateType;
pub use document::Description;
pub use document::Document;
pub use document::Product;
pub use document::ProductionType;
pub use document::UnitCode;
pub use error::ApiError;
pub use layer::ThrottleLayer;
pub use service::Interrupter;
pub use service::ThrottleService;
pub use transport::HttpTransport;
pub use transport::Inbound;
pub use transport::Outbound;
