use crate::client::DifyClient;
use crate::errors::DifyError;
use crate::stream::{AbortSignal, Endpoint, StreamEnd, StreamHandler};
use crate::types::{ChatRequest, ChatResponse};

impl DifyClient {
    /// Sends a chat turn and waits for the full answer.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, DifyError> {
        request.validate()?;
        self.blocking(Endpoint::Chat, request).await
    }

    /// Sends a chat turn and streams its events to `handler`.
    ///
    /// Returns after the server closes the stream or the first fatal error.
    /// Events already delivered before an error stay delivered.
    pub async fn chat_stream<H>(
        &self,
        request: &ChatRequest,
        handler: &mut H,
    ) -> Result<StreamEnd, DifyError>
    where
        H: StreamHandler + ?Sized,
    {
        request.validate()?;
        self.stream(Endpoint::Chat, request, handler, None).await
    }

    /// Like [`chat_stream`](Self::chat_stream), ending with
    /// `StreamEnd::Cancelled` once `abort` fires.
    pub async fn chat_stream_with_abort<H>(
        &self,
        request: &ChatRequest,
        handler: &mut H,
        abort: AbortSignal,
    ) -> Result<StreamEnd, DifyError>
    where
        H: StreamHandler + ?Sized,
    {
        request.validate()?;
        self.stream(Endpoint::Chat, request, handler, Some(abort))
            .await
    }
}
