use crpt_limit::LimitError;

/// Errors produced by the submission pipeline.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// The client could not be built from the supplied settings.
    ///
    /// Covers a negative request limit, a missing token, an unparsable base
    /// URL and HTTP client construction. Not retryable.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A product carries neither a `uit_code` nor a `uitu_code`.
    ///
    /// Detected while encoding, before any throttling or network I/O.
    #[error("invalid document: product #{index} {reason}")]
    InvalidDocument {
        /// Position of the offending product in `Document::products`.
        index: usize,
        reason: String,
    },

    /// The document could not be serialized into its envelope.
    #[error("failed to encode document: {0}")]
    Encoding(String),

    /// The wait for rate limit admission was interrupted.
    ///
    /// The request was not sent. The limiter stays usable.
    #[error("interrupted while waiting for rate limit admission")]
    Interrupted,

    /// The HTTP exchange failed.
    ///
    /// Only returned under [`FailurePolicy::Propagate`](crate::FailurePolicy);
    /// the default policy logs the failure and answers with an empty body.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<LimitError> for ApiError {
    fn from(err: LimitError) -> Self {
        match err {
            LimitError::InvalidConfiguration { .. } => Self::InvalidConfiguration(err.to_string()),
            LimitError::Interrupted => Self::Interrupted,
        }
    }
}
