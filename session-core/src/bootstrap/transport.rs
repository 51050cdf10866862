use crate::error::TransportError;
use crate::observability::trace_context::outgoing_headers;
use async_trait::async_trait;
use reqwest::Client;
use uuid::Uuid;

/// Raw response of one bootstrap round-trip; classification happens in the
/// client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportReply {
    pub status: u16,
    pub body: String,
}

impl TransportReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Carries the bootstrap request to the enrichment endpoint.
///
/// Implementations must be cancel-safe: the client drops the returned
/// future on timeout, logout or supersession.
#[async_trait]
pub trait BootstrapTransport: Send + Sync {
    async fn post_bootstrap(&self, access_token: &str) -> Result<TransportReply, TransportError>;
}

/// `reqwest`-backed transport with trace-context propagation.
#[derive(Clone)]
pub struct HttpBootstrapTransport {
    client: Client,
    endpoint: String,
}

impl HttpBootstrapTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl BootstrapTransport for HttpBootstrapTransport {
    async fn post_bootstrap(&self, access_token: &str) -> Result<TransportReply, TransportError> {
        let request_id = Uuid::new_v4().to_string();

        let response = self
            .client
            .post(&self.endpoint)
            .headers(outgoing_headers(&request_id))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(
                    endpoint = %self.endpoint,
                    request_id = %request_id,
                    error = %e,
                    "Bootstrap request failed"
                );
                TransportError::from(e)
            })?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        tracing::debug!(
            endpoint = %self.endpoint,
            request_id = %request_id,
            status,
            "Bootstrap response received"
        );

        Ok(TransportReply { status, body })
    }
}
