use std::future::Future;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use tower::BoxError;
use tower::Service;
use url::Url;

use crate::error::ApiError;

/// A fully prepared POST, ready for the wire.
#[derive(Clone, Debug)]
pub struct Outbound {
    pub url: Url,
    pub headers: HeaderMap,
    pub body: String,
}

/// What came back from the remote system.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inbound {
    pub status: StatusCode,
    /// Response body as text, empty when the response had none.
    pub body: String,
}

/// `reqwest` backed transport.
///
/// Cloning is cheap and shares the underlying connection pool.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a transport. Without a `timeout` requests may wait indefinitely.
    pub fn new(timeout: Option<Duration>) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ApiError::InvalidConfiguration(format!("http client: {e}")))?;

        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Service<Outbound> for HttpTransport {
    type Response = Inbound;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Inbound, BoxError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Outbound) -> Self::Future {
        let client = self.client.clone();

        Box::pin(async move {
            let response = client
                .post(req.url)
                .headers(req.headers)
                .body(req.body)
                .send()
                .await?;
            let status = response.status();
            let body = response.text().await?;

            Ok(Inbound { status, body })
        })
    }
}
