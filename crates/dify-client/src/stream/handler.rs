use tracing::warn;

use crate::errors::{FrameDecodeError, HandlerError};
use crate::types::ResponseMetadata;

use super::events::{MessageEndEvent, MessageEvent, TtsEvent, WorkflowEvent};

/// Callbacks invoked by a streaming call, one frame at a time and in arrival
/// order.
///
/// Every method has a no-op default, so implementors override only the
/// events they care about. Returning an error from any method aborts the
/// streaming call and the error is returned to its caller.
pub trait StreamHandler {
    /// Incremental answer text.
    fn on_message(&mut self, event: &MessageEvent) -> Result<(), HandlerError> {
        let _ = event;
        Ok(())
    }

    /// Workflow and node lifecycle events.
    fn on_message_workflow(&mut self, event: &WorkflowEvent) -> Result<(), HandlerError> {
        let _ = event;
        Ok(())
    }

    /// Terminal event of a chat answer.
    fn on_message_end(&mut self, event: &MessageEndEvent) -> Result<(), HandlerError> {
        let _ = event;
        Ok(())
    }

    /// A chunk of synthesized speech.
    fn on_tts(&mut self, event: &TtsEvent) -> Result<(), HandlerError> {
        let _ = event;
        Ok(())
    }

    /// Terminal speech event.
    fn on_tts_end(&mut self, event: &TtsEvent) -> Result<(), HandlerError> {
        let _ = event;
        Ok(())
    }

    /// A frame could not be decoded. Returning `Ok` skips the frame.
    fn on_error(&mut self, error: &FrameDecodeError) -> Result<(), HandlerError> {
        warn!(event = "dify.stream.frame_skipped", error = %error, "skipping undecodable stream frame");
        Ok(())
    }
}

type Callback<'a, T> = Box<dyn FnMut(&T) -> Result<(), HandlerError> + Send + 'a>;

/// Handler assembled from optional closures.
///
/// Closures may borrow from the caller for the duration of the call.
///
/// ```no_run
/// use dify_client::prelude::*;
/// use dify_client::stream::CallbackHandler;
///
/// # async fn run(client: DifyClient) -> Result<(), DifyError> {
/// let mut answer = String::new();
/// let mut handler = CallbackHandler::new().with_message(|event| {
///     answer.push_str(&event.answer);
///     Ok(())
/// });
/// client
///     .chat_stream(&ChatRequest::new("Say hello"), &mut handler)
///     .await?;
/// drop(handler);
///
/// println!("{answer}");
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct CallbackHandler<'a> {
    on_message: Option<Callback<'a, MessageEvent>>,
    on_message_workflow: Option<Callback<'a, WorkflowEvent>>,
    on_message_end: Option<Callback<'a, MessageEndEvent>>,
    on_tts: Option<Callback<'a, TtsEvent>>,
    on_tts_end: Option<Callback<'a, TtsEvent>>,
    on_error: Option<Callback<'a, FrameDecodeError>>,
}

impl<'a> CallbackHandler<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(
        mut self,
        f: impl FnMut(&MessageEvent) -> Result<(), HandlerError> + Send + 'a,
    ) -> Self {
        self.on_message = Some(Box::new(f));
        self
    }

    pub fn with_workflow(
        mut self,
        f: impl FnMut(&WorkflowEvent) -> Result<(), HandlerError> + Send + 'a,
    ) -> Self {
        self.on_message_workflow = Some(Box::new(f));
        self
    }

    pub fn with_message_end(
        mut self,
        f: impl FnMut(&MessageEndEvent) -> Result<(), HandlerError> + Send + 'a,
    ) -> Self {
        self.on_message_end = Some(Box::new(f));
        self
    }

    pub fn with_tts(
        mut self,
        f: impl FnMut(&TtsEvent) -> Result<(), HandlerError> + Send + 'a,
    ) -> Self {
        self.on_tts = Some(Box::new(f));
        self
    }

    pub fn with_tts_end(
        mut self,
        f: impl FnMut(&TtsEvent) -> Result<(), HandlerError> + Send + 'a,
    ) -> Self {
        self.on_tts_end = Some(Box::new(f));
        self
    }

    /// Replaces the default log-and-skip policy for undecodable frames.
    pub fn with_error(
        mut self,
        f: impl FnMut(&FrameDecodeError) -> Result<(), HandlerError> + Send + 'a,
    ) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

fn call<T>(callback: &mut Option<Callback<'_, T>>, value: &T) -> Result<(), HandlerError> {
    match callback {
        Some(f) => f(value),
        None => Ok(()),
    }
}

impl StreamHandler for CallbackHandler<'_> {
    fn on_message(&mut self, event: &MessageEvent) -> Result<(), HandlerError> {
        call(&mut self.on_message, event)
    }

    fn on_message_workflow(&mut self, event: &WorkflowEvent) -> Result<(), HandlerError> {
        call(&mut self.on_message_workflow, event)
    }

    fn on_message_end(&mut self, event: &MessageEndEvent) -> Result<(), HandlerError> {
        call(&mut self.on_message_end, event)
    }

    fn on_tts(&mut self, event: &TtsEvent) -> Result<(), HandlerError> {
        call(&mut self.on_tts, event)
    }

    fn on_tts_end(&mut self, event: &TtsEvent) -> Result<(), HandlerError> {
        call(&mut self.on_tts_end, event)
    }

    fn on_error(&mut self, error: &FrameDecodeError) -> Result<(), HandlerError> {
        match &mut self.on_error {
            Some(f) => f(error),
            None => {
                warn!(event = "dify.stream.frame_skipped", error = %error, "skipping undecodable stream frame");
                Ok(())
            }
        }
    }
}

/// Accumulates everything a streaming call delivers.
///
/// Undecodable frames are counted and skipped; TTS chunks that are not valid
/// base64 abort the call.
#[derive(Clone, Debug, Default)]
pub struct AnswerCollector {
    pub answer: String,
    pub task_id: Option<String>,
    pub message_id: Option<String>,
    pub conversation_id: Option<String>,
    pub workflow_run_id: Option<String>,
    pub metadata: Option<ResponseMetadata>,
    pub workflow_events: Vec<WorkflowEvent>,
    pub audio: Vec<u8>,
    pub tts_finished: bool,
    pub skipped_frames: usize,
}

impl AnswerCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn track_ids(&mut self, envelope: &super::StreamEnvelope) {
        fn keep(slot: &mut Option<String>, value: Option<&str>) {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                *slot = Some(value.to_string());
            }
        }
        keep(&mut self.task_id, Some(envelope.task_id.as_str()));
        keep(&mut self.message_id, Some(envelope.message_id.as_str()));
        keep(&mut self.conversation_id, envelope.conversation_id.as_deref());
        keep(&mut self.workflow_run_id, envelope.workflow_run_id.as_deref());
    }
}

impl StreamHandler for AnswerCollector {
    fn on_message(&mut self, event: &MessageEvent) -> Result<(), HandlerError> {
        self.track_ids(&event.envelope);
        self.answer.push_str(&event.answer);
        Ok(())
    }

    fn on_message_workflow(&mut self, event: &WorkflowEvent) -> Result<(), HandlerError> {
        self.track_ids(&event.envelope);
        self.workflow_events.push(event.clone());
        Ok(())
    }

    fn on_message_end(&mut self, event: &MessageEndEvent) -> Result<(), HandlerError> {
        self.track_ids(&event.envelope);
        self.metadata = Some(event.metadata.clone());
        Ok(())
    }

    fn on_tts(&mut self, event: &TtsEvent) -> Result<(), HandlerError> {
        let bytes = event.audio_bytes().map_err(HandlerError::new)?;
        self.audio.extend_from_slice(&bytes);
        Ok(())
    }

    fn on_tts_end(&mut self, _event: &TtsEvent) -> Result<(), HandlerError> {
        self.tts_finished = true;
        Ok(())
    }

    fn on_error(&mut self, error: &FrameDecodeError) -> Result<(), HandlerError> {
        warn!(event = "dify.stream.frame_skipped", error = %error, "skipping undecodable stream frame");
        self.skipped_frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{RoutingTable, StreamEnd, StreamEnvelope, consume_stream};

    fn message(answer: &str) -> MessageEvent {
        MessageEvent {
            envelope: StreamEnvelope {
                event: "message".into(),
                task_id: "t1".into(),
                message_id: "m1".into(),
                conversation_id: Some("c1".into()),
                ..StreamEnvelope::default()
            },
            answer: answer.into(),
        }
    }

    #[test]
    fn callback_handler_defaults_to_noop() {
        let mut handler = CallbackHandler::new();
        assert!(StreamHandler::on_message(&mut handler, &message("x")).is_ok());
        assert!(StreamHandler::on_tts_end(&mut handler, &TtsEvent::default()).is_ok());
    }

    #[test]
    fn callback_handler_propagates_closure_error() {
        let mut handler =
            CallbackHandler::new().with_message(|_| Err(HandlerError::new("stop here")));
        let err = StreamHandler::on_message(&mut handler, &message("x")).expect_err("error");
        assert_eq!(err.to_string(), "stop here");
    }

    #[tokio::test]
    async fn callback_handler_borrows_caller_state_through_a_stream() {
        let body = concat!(
            "data: {\"event\":\"message\",\"answer\":\"Hel\"}\n\n",
            "data: {bad\n\n",
            "data: {\"event\":\"message\",\"answer\":\"lo\"}\n\n",
            "data: {\"event\":\"message_end\",\"metadata\":{\"usage\":{\"total_tokens\":4}}}\n\n",
        );
        let bytes = futures::stream::iter(vec![Ok::<_, String>(body.as_bytes().to_vec())]);

        let mut answer = String::new();
        let mut total_tokens = 0;
        let mut errors = 0;
        let mut handler = CallbackHandler::new()
            .with_message(|event| {
                answer.push_str(&event.answer);
                Ok(())
            })
            .with_message_end(|event| {
                total_tokens = event.metadata.usage.total_tokens;
                Ok(())
            })
            .with_error(|_| {
                errors += 1;
                Ok(())
            });
        let end = consume_stream(bytes, &RoutingTable::CHAT, &mut handler, None)
            .await
            .expect("stream");
        drop(handler);

        assert_eq!(end, StreamEnd::Completed);
        assert_eq!(answer, "Hello");
        assert_eq!(total_tokens, 4);
        assert_eq!(errors, 1);
    }

    #[test]
    fn collector_accumulates_answer_and_ids() {
        let mut collector = AnswerCollector::new();
        collector.on_message(&message("Hel")).expect("first");
        collector.on_message(&message("lo")).expect("second");
        assert_eq!(collector.answer, "Hello");
        assert_eq!(collector.conversation_id.as_deref(), Some("c1"));
        assert_eq!(collector.message_id.as_deref(), Some("m1"));
    }

    #[test]
    fn collector_rejects_invalid_audio() {
        let mut collector = AnswerCollector::new();
        let bad = TtsEvent {
            audio: "***".into(),
            ..TtsEvent::default()
        };
        assert!(collector.on_tts(&bad).is_err());
        assert!(collector.audio.is_empty());
    }
}
