use std::time::Duration;

use serde_json::Value;

use crate::{document::FlowDocument, error::AuthKitError};

/// Default per-request timeout for flow round trips.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A thin wrapper on an HTTP client for flow round trips. Sets sensible
/// defaults such as a fixed timeout and user-agent.
///
/// The transport performs exactly one attempt per call: a timeout fails the
/// operation with [`AuthKitError::RequestTimeout`] and retry policy is left
/// to the caller.
#[derive(Debug, Clone)]
pub struct Transport {
    client: reqwest::Client,
    timeout: Duration,
}

impl Transport {
    /// Initializes a new `Transport` with the given per-request timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Posts `body` to `url` and decodes the response as a flow document.
    ///
    /// The flow protocol embeds its own `status` in the document and answers
    /// non-2xx turns with a document as well, so the HTTP status is not
    /// inspected here; an undecodable body is the failure signal.
    ///
    /// # Errors
    ///
    /// [`AuthKitError::RequestTimeout`] when the timeout elapses,
    /// [`AuthKitError::Network`] for connection failures and
    /// [`AuthKitError::MalformedResponse`] when the body is not a valid
    /// document.
    pub async fn post_document(
        &self,
        url: &str,
        body: &Value,
    ) -> Result<FlowDocument, AuthKitError> {
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .header(
                "User-Agent",
                format!("authkit-core/{}", env!("CARGO_PKG_VERSION")),
            )
            .json(body)
            .send()
            .await
            .map_err(map_send_error)?;

        let bytes = response.bytes().await.map_err(map_send_error)?;
        serde_json::from_slice(&bytes)
            .map_err(|err| AuthKitError::MalformedResponse(err.to_string()))
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

fn map_send_error(err: reqwest::Error) -> AuthKitError {
    if err.is_timeout() {
        AuthKitError::RequestTimeout
    } else {
        AuthKitError::Network(err.to_string())
    }
}
