use crate::client::DifyClient;
use crate::errors::DifyError;
use crate::stream::{AbortSignal, Endpoint, StreamEnd, StreamHandler};
use crate::types::{WorkflowRequest, WorkflowResponse};

impl DifyClient {
    /// Executes a workflow and waits for its outputs.
    pub async fn workflow_run(
        &self,
        request: &WorkflowRequest,
    ) -> Result<WorkflowResponse, DifyError> {
        request.validate()?;
        self.blocking(Endpoint::Workflow, request).await
    }

    /// Executes a workflow, streaming workflow/node events to
    /// `on_message_workflow` and speech to `on_tts`/`on_tts_end`.
    pub async fn workflow_run_stream<H>(
        &self,
        request: &WorkflowRequest,
        handler: &mut H,
    ) -> Result<StreamEnd, DifyError>
    where
        H: StreamHandler + ?Sized,
    {
        request.validate()?;
        self.stream(Endpoint::Workflow, request, handler, None)
            .await
    }

    pub async fn workflow_run_stream_with_abort<H>(
        &self,
        request: &WorkflowRequest,
        handler: &mut H,
        abort: AbortSignal,
    ) -> Result<StreamEnd, DifyError>
    where
        H: StreamHandler + ?Sized,
    {
        request.validate()?;
        self.stream(Endpoint::Workflow, request, handler, Some(abort))
            .await
    }
}
