use std::pin::Pin;

use futures::Stream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{Instrument as _, debug};

use crate::config::ClientConfig;
use crate::errors::DifyError;
use crate::stream::{AbortSignal, Endpoint, StreamEnd, StreamHandler, consume_stream};
use crate::types::{ResponseMode, WithResponseMode};

pub(crate) type ByteStream =
    Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// Async client for one Dify app, authenticated with the app's API key.
#[derive(Clone)]
pub struct DifyClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl DifyClient {
    /// Creates a client from explicit configuration.
    pub fn new(config: ClientConfig) -> Result<Self, DifyError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DifyError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Creates a client that sends through a caller-provided `reqwest::Client`.
    ///
    /// `config.timeout` is not applied; the given client's settings win.
    pub fn with_http_client(
        config: ClientConfig,
        http: reqwest::Client,
    ) -> Result<Self, DifyError> {
        config.validate()?;
        Ok(Self { http, config })
    }

    /// Creates a client from `DIFY_API_KEY` and related variables.
    pub fn from_env() -> Result<Self, DifyError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.config.endpoint_url(path))
            .bearer_auth(&self.config.api_key)
    }

    /// Sends a request and turns transport failures and non-success statuses
    /// into errors. The body of a failed response is read fully.
    pub(crate) async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, DifyError> {
        let response = request
            .send()
            .await
            .map_err(|e| DifyError::Transport(format!("failed to send request: {e}")))?;
        let status = response.status();
        debug!(event = "dify.response_received", status = status.as_u16(), url = %response.url().path());
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(DifyError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, DifyError> {
        let response = self.send(request).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| DifyError::Transport(format!("failed to read response body: {e}")))?;
        serde_json::from_slice(&body)
            .map_err(|e| DifyError::Decode(format!("failed to decode response: {e}")))
    }

    pub(crate) async fn blocking<R, T>(&self, endpoint: Endpoint, request: &R) -> Result<T, DifyError>
    where
        R: Serialize,
        T: DeserializeOwned,
    {
        let body = WithResponseMode {
            request,
            response_mode: ResponseMode::Blocking,
        };
        debug!(event = "dify.request_started", endpoint = %endpoint, mode = "blocking");
        self.send_json(self.request(reqwest::Method::POST, endpoint.path()).json(&body))
            .await
    }

    /// Sends a streaming request and dispatches its events to `handler`
    /// using the endpoint's routing table.
    pub(crate) async fn stream<R, H>(
        &self,
        endpoint: Endpoint,
        request: &R,
        handler: &mut H,
        abort: Option<AbortSignal>,
    ) -> Result<StreamEnd, DifyError>
    where
        R: Serialize,
        H: StreamHandler + ?Sized,
    {
        let call_id = uuid::Uuid::new_v4();
        let span = tracing::debug_span!("dify_stream", %call_id, %endpoint);
        async move {
            let body = WithResponseMode {
                request,
                response_mode: ResponseMode::Streaming,
            };
            let http_request = self
                .request(reqwest::Method::POST, endpoint.path())
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .header(reqwest::header::CACHE_CONTROL, "no-cache")
                .json(&body);
            debug!(event = "dify.request_started", mode = "streaming");
            let response = self.send(http_request).await?;
            let bytes: ByteStream = Box::pin(response.bytes_stream());
            consume_stream(bytes, endpoint.routing_table(), handler, abort).await
        }
        .instrument(span)
        .await
    }
}
