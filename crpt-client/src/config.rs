use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::ApiError;

pub const DEFAULT_BASE_URL: &str = "https://ismp.crpt.ru";
/// Environment variable holding the bearer token.
pub const TOKEN_VAR: &str = "TOKEN_CRPT";
/// Environment variable overriding [`DEFAULT_BASE_URL`].
pub const BASE_URL_VAR: &str = "CRPT_API_URL";

/// Connection settings, resolved once when a client is built.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Origin that endpoint paths are appended to.
    pub base_url: Url,
    pub token: SecretString,
    /// Upper bound for a whole HTTP exchange. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
}

impl ApiConfig {
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            ApiError::InvalidConfiguration(format!("invalid base url `{base_url}`: {e}"))
        })?;

        Ok(Self {
            base_url,
            token: SecretString::from(token.into()),
            request_timeout: None,
        })
    }

    /// Reads [`TOKEN_VAR`] and [`BASE_URL_VAR`] from the process environment.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ApiConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup(TOKEN_VAR)
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| {
                ApiError::InvalidConfiguration(format!("{TOKEN_VAR} is not set"))
            })?;
        let base_url = lookup(BASE_URL_VAR).unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());

        Self::new(&base_url, token)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Joins an endpoint path onto the base URL, keeping any base path prefix.
    ///
    /// `path` must be absolute (start with `/`).
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        if !path.starts_with('/') {
            return Err(ApiError::InvalidConfiguration(format!(
                "endpoint path `{path}` must start with `/`"
            )));
        }
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}{path}")).map_err(|e| {
            ApiError::InvalidConfiguration(format!("invalid endpoint `{base}{path}`: {e}"))
        })
    }
}
