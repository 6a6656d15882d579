/// Errors produced by [`RateLimiter`](crate::RateLimiter).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitError {
    /// The request limit cannot be used as a quota.
    ///
    /// Raised at construction for negative limits (and limits that do not fit
    /// the counter). Retrying with the same value will fail again.
    #[error("request limit must be between 0 and {max}, got {limit}", max = u32::MAX)]
    InvalidConfiguration {
        /// The rejected limit.
        limit: i64,
    },

    /// The caller was cancelled while waiting for admission.
    ///
    /// The call was not admitted and must not be sent.
    #[error("interrupted while waiting for rate limit admission")]
    Interrupted,
}
