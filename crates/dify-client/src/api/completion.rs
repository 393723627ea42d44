use crate::client::DifyClient;
use crate::errors::DifyError;
use crate::stream::{AbortSignal, Endpoint, StreamEnd, StreamHandler};
use crate::types::{CompletionRequest, CompletionResponse};

impl DifyClient {
    /// Runs a text-generation app and waits for the full answer.
    pub async fn completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, DifyError> {
        request.validate()?;
        self.blocking(Endpoint::Completion, request).await
    }

    /// Runs a text-generation app and streams its events to `handler`.
    ///
    /// On this endpoint `message_end` arrives through `on_message` (with an
    /// empty answer) and `tts_message_end` through `on_tts_end`. Events with
    /// other discriminators are ignored.
    pub async fn completion_stream<H>(
        &self,
        request: &CompletionRequest,
        handler: &mut H,
    ) -> Result<StreamEnd, DifyError>
    where
        H: StreamHandler + ?Sized,
    {
        request.validate()?;
        self.stream(Endpoint::Completion, request, handler, None)
            .await
    }

    pub async fn completion_stream_with_abort<H>(
        &self,
        request: &CompletionRequest,
        handler: &mut H,
        abort: AbortSignal,
    ) -> Result<StreamEnd, DifyError>
    where
        H: StreamHandler + ?Sized,
    {
        request.validate()?;
        self.stream(Endpoint::Completion, request, handler, Some(abort))
            .await
    }
}
