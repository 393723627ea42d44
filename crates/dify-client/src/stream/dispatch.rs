use std::fmt;

use futures::Stream;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::errors::{DifyError, FrameDecodeError, HandlerError};

use super::abort::AbortSignal;
use super::events::{MessageEndEvent, MessageEvent, StreamEnvelope, TtsEvent, WorkflowEvent};
use super::frame::FrameReader;
use super::handler::StreamHandler;

/// Payload shape and callback a discriminator is routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// `MessageEvent` → `on_message`
    Message,
    /// `MessageEndEvent` → `on_message_end`
    MessageEnd,
    /// `TtsEvent` → `on_tts`
    Tts,
    /// `TtsEvent` → `on_tts_end`
    TtsEnd,
    /// `WorkflowEvent` → `on_message_workflow`
    Workflow,
}

/// Discriminator → route mapping for one endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoutingTable {
    routes: &'static [(&'static str, Route)],
    fallback: Option<Route>,
}

impl RoutingTable {
    /// `/chat-messages`. There is no `tts_message_end` entry, so that event
    /// falls through to the workflow route.
    pub const CHAT: RoutingTable = RoutingTable {
        routes: &[
            ("message", Route::Message),
            ("message_end", Route::MessageEnd),
            ("tts_message", Route::Tts),
        ],
        fallback: Some(Route::Workflow),
    };

    /// `/completion-messages`. `message_end` is decoded as a message and
    /// delivered to `on_message`; unknown events are ignored.
    pub const COMPLETION: RoutingTable = RoutingTable {
        routes: &[
            ("message", Route::Message),
            ("message_end", Route::Message),
            ("tts_message", Route::Tts),
            ("tts_message_end", Route::TtsEnd),
        ],
        fallback: None,
    };

    /// `/workflows/run`.
    pub const WORKFLOW: RoutingTable = RoutingTable {
        routes: &[
            ("tts_message", Route::Tts),
            ("tts_message_end", Route::TtsEnd),
        ],
        fallback: Some(Route::Workflow),
    };

    pub fn route(&self, event: &str) -> Option<Route> {
        self.routes
            .iter()
            .find(|(name, _)| *name == event)
            .map(|(_, route)| *route)
            .or(self.fallback)
    }
}

/// Streaming endpoint, selecting its routing table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Chat,
    Completion,
    Workflow,
}

impl Endpoint {
    pub fn routing_table(self) -> &'static RoutingTable {
        match self {
            Endpoint::Chat => &RoutingTable::CHAT,
            Endpoint::Completion => &RoutingTable::COMPLETION,
            Endpoint::Workflow => &RoutingTable::WORKFLOW,
        }
    }

    pub(crate) fn path(self) -> &'static str {
        match self {
            Endpoint::Chat => "chat-messages",
            Endpoint::Completion => "completion-messages",
            Endpoint::Workflow => "workflows/run",
        }
    }

    pub(crate) fn stop_path(self, task_id: &str) -> String {
        match self {
            Endpoint::Chat => format!("chat-messages/{task_id}/stop"),
            Endpoint::Completion => format!("completion-messages/{task_id}/stop"),
            Endpoint::Workflow => format!("workflows/tasks/{task_id}/stop"),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Endpoint::Chat => "chat",
            Endpoint::Completion => "completion",
            Endpoint::Workflow => "workflow",
        })
    }
}

/// How a streaming call that did not fail came to an end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamEnd {
    /// The server closed the stream.
    Completed,
    /// The caller's abort handle fired.
    Cancelled,
}

/// Decodes one payload and invokes the routed callback.
///
/// Decode failures go to `on_error` and only abort when it returns an error;
/// callback errors always abort.
pub fn dispatch_frame<H>(
    table: &RoutingTable,
    payload: &str,
    handler: &mut H,
) -> Result<(), DifyError>
where
    H: StreamHandler + ?Sized,
{
    let envelope: StreamEnvelope = match serde_json::from_str(payload) {
        Ok(envelope) => envelope,
        Err(source) => {
            let error = FrameDecodeError::Envelope {
                source,
                payload: payload.to_string(),
            };
            return handler.on_error(&error).map_err(DifyError::Handler);
        }
    };

    let Some(route) = table.route(&envelope.event) else {
        trace!(event = "dify.stream.frame_unrouted", kind = %envelope.event, "ignoring stream event");
        return Ok(());
    };

    match route {
        Route::Message => deliver::<MessageEvent, H>(payload, envelope.event, handler, |h, e| {
            h.on_message(e)
        }),
        Route::MessageEnd => {
            deliver::<MessageEndEvent, H>(payload, envelope.event, handler, |h, e| {
                h.on_message_end(e)
            })
        }
        Route::Tts => {
            deliver::<TtsEvent, H>(payload, envelope.event, handler, |h, e| h.on_tts(e))
        }
        Route::TtsEnd => {
            deliver::<TtsEvent, H>(payload, envelope.event, handler, |h, e| h.on_tts_end(e))
        }
        Route::Workflow => {
            deliver::<WorkflowEvent, H>(payload, envelope.event, handler, |h, e| {
                h.on_message_workflow(e)
            })
        }
    }
}

fn deliver<T, H>(
    payload: &str,
    event: String,
    handler: &mut H,
    invoke: impl FnOnce(&mut H, &T) -> Result<(), HandlerError>,
) -> Result<(), DifyError>
where
    T: DeserializeOwned,
    H: StreamHandler + ?Sized,
{
    match serde_json::from_str::<T>(payload) {
        Ok(decoded) => invoke(handler, &decoded).map_err(DifyError::Handler),
        Err(source) => {
            let error = FrameDecodeError::Payload {
                event,
                source,
                payload: payload.to_string(),
            };
            handler.on_error(&error).map_err(DifyError::Handler)
        }
    }
}

/// Reads frames from `bytes` and dispatches them until end of input, abort,
/// or the first fatal error.
pub async fn consume_stream<S, B, E, H>(
    bytes: S,
    table: &RoutingTable,
    handler: &mut H,
    mut abort: Option<AbortSignal>,
) -> Result<StreamEnd, DifyError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: fmt::Display,
    H: StreamHandler + ?Sized,
{
    let mut reader = FrameReader::new(bytes);
    let mut frames = 0_u64;
    loop {
        let next = match abort.as_mut() {
            Some(signal) => {
                if signal.is_aborted() {
                    debug!(event = "dify.stream.cancelled", frames, "stream aborted by caller");
                    return Ok(StreamEnd::Cancelled);
                }
                tokio::select! {
                    biased;
                    _ = signal.aborted() => {
                        debug!(event = "dify.stream.cancelled", frames, "stream aborted by caller");
                        return Ok(StreamEnd::Cancelled);
                    }
                    next = reader.next_frame() => next,
                }
            }
            None => reader.next_frame().await,
        };

        let Some(payload) = next? else {
            debug!(event = "dify.stream.completed", frames, "stream reached end of input");
            return Ok(StreamEnd::Completed);
        };
        frames = frames.saturating_add(1);
        dispatch_frame(table, &payload, handler)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{AbortHandle, StreamHandler};
    use futures::StreamExt as _;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Message(String),
        Workflow(String),
        MessageEnd(u64),
        Tts(String),
        TtsEnd,
        Error(Option<String>),
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<Call>,
        fail_on_message: bool,
        fail_on_error: bool,
    }

    impl StreamHandler for Recorder {
        fn on_message(&mut self, event: &MessageEvent) -> Result<(), HandlerError> {
            self.calls.push(Call::Message(event.answer.clone()));
            if self.fail_on_message {
                return Err(HandlerError::new("handler refused message"));
            }
            Ok(())
        }

        fn on_message_workflow(&mut self, event: &WorkflowEvent) -> Result<(), HandlerError> {
            self.calls.push(Call::Workflow(event.envelope.event.clone()));
            Ok(())
        }

        fn on_message_end(&mut self, event: &MessageEndEvent) -> Result<(), HandlerError> {
            self.calls
                .push(Call::MessageEnd(event.metadata.usage.total_tokens));
            Ok(())
        }

        fn on_tts(&mut self, event: &TtsEvent) -> Result<(), HandlerError> {
            self.calls.push(Call::Tts(event.audio.clone()));
            Ok(())
        }

        fn on_tts_end(&mut self, _event: &TtsEvent) -> Result<(), HandlerError> {
            self.calls.push(Call::TtsEnd);
            Ok(())
        }

        fn on_error(&mut self, error: &FrameDecodeError) -> Result<(), HandlerError> {
            self.calls.push(Call::Error(error.event().map(str::to_string)));
            if self.fail_on_error {
                return Err(HandlerError::new("bad frame"));
            }
            Ok(())
        }
    }

    /// Yields one chunk per poll and counts how many chunks were pulled.
    struct CountingStream {
        chunks: Vec<Vec<u8>>,
        pulled: Arc<AtomicUsize>,
    }

    impl Stream for CountingStream {
        type Item = Result<Vec<u8>, String>;

        fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            if self.chunks.is_empty() {
                return Poll::Ready(None);
            }
            self.pulled.fetch_add(1, Ordering::SeqCst);
            let chunk = self.chunks.remove(0);
            Poll::Ready(Some(Ok(chunk)))
        }
    }

    fn counting(frames: &[&str]) -> (CountingStream, Arc<AtomicUsize>) {
        let pulled = Arc::new(AtomicUsize::new(0));
        let stream = CountingStream {
            chunks: frames.iter().map(|f| f.as_bytes().to_vec()).collect(),
            pulled: pulled.clone(),
        };
        (stream, pulled)
    }

    async fn run(
        table: &RoutingTable,
        frames: &[&str],
        handler: &mut Recorder,
    ) -> Result<StreamEnd, DifyError> {
        let (stream, _) = counting(frames);
        consume_stream(stream, table, handler, None).await
    }

    const MESSAGE: &str =
        "data: {\"event\":\"message\",\"answer\":\"hi\",\"task_id\":\"t1\",\"message_id\":\"m1\",\"created_at\":1}\n\n";
    const MESSAGE_END: &str = "data: {\"event\":\"message_end\",\"task_id\":\"t1\",\"message_id\":\"m1\",\"created_at\":2,\"metadata\":{\"usage\":{\"prompt_tokens\":1,\"completion_tokens\":1,\"total_tokens\":2},\"retriever_resources\":[]}}\n\n";
    const TTS_END: &str =
        "data: {\"event\":\"tts_message_end\",\"task_id\":\"t1\",\"message_id\":\"m1\",\"audio\":\"\"}\n\n";

    #[test]
    fn routing_tables_differ_per_endpoint() {
        assert_eq!(RoutingTable::CHAT.route("message_end"), Some(Route::MessageEnd));
        assert_eq!(RoutingTable::COMPLETION.route("message_end"), Some(Route::Message));
        assert_eq!(RoutingTable::CHAT.route("tts_message_end"), Some(Route::Workflow));
        assert_eq!(RoutingTable::COMPLETION.route("tts_message_end"), Some(Route::TtsEnd));
        assert_eq!(RoutingTable::COMPLETION.route("node_started"), None);
        assert_eq!(RoutingTable::WORKFLOW.route("message"), Some(Route::Workflow));
        assert_eq!(Endpoint::Workflow.routing_table(), &RoutingTable::WORKFLOW);
    }

    #[tokio::test]
    async fn chat_message_then_message_end() {
        let mut handler = Recorder::default();
        let end = run(&RoutingTable::CHAT, &[MESSAGE, MESSAGE_END], &mut handler)
            .await
            .expect("stream");
        assert_eq!(end, StreamEnd::Completed);
        assert_eq!(
            handler.calls,
            vec![Call::Message("hi".into()), Call::MessageEnd(2)]
        );
    }

    #[tokio::test]
    async fn tts_message_end_routes_differently_per_endpoint() {
        let mut completion = Recorder::default();
        run(&RoutingTable::COMPLETION, &[TTS_END], &mut completion)
            .await
            .expect("completion");
        assert_eq!(completion.calls, vec![Call::TtsEnd]);

        let mut chat = Recorder::default();
        run(&RoutingTable::CHAT, &[TTS_END], &mut chat)
            .await
            .expect("chat");
        assert_eq!(chat.calls, vec![Call::Workflow("tts_message_end".into())]);
    }

    #[tokio::test]
    async fn completion_message_end_is_delivered_as_message() {
        let mut handler = Recorder::default();
        run(&RoutingTable::COMPLETION, &[MESSAGE, MESSAGE_END], &mut handler)
            .await
            .expect("stream");
        assert_eq!(
            handler.calls,
            vec![Call::Message("hi".into()), Call::Message(String::new())]
        );
    }

    #[tokio::test]
    async fn workflow_routes_tts_and_everything_else() {
        let frames = [
            "data: {\"event\":\"workflow_started\",\"task_id\":\"t\",\"workflow_run_id\":\"r\",\"data\":{\"id\":\"r\",\"workflow_id\":\"w\",\"sequence_number\":1}}\n\n",
            "data: {\"event\":\"node_started\",\"task_id\":\"t\",\"data\":{\"node_id\":\"start\",\"index\":1}}\n\n",
            "data: {\"event\":\"tts_message\",\"task_id\":\"t\",\"audio\":\"aGk=\"}\n\n",
            TTS_END,
            "data: {\"event\":\"workflow_finished\",\"task_id\":\"t\",\"data\":{\"status\":\"succeeded\"}}\n\n",
        ];
        let mut handler = Recorder::default();
        run(&RoutingTable::WORKFLOW, &frames, &mut handler)
            .await
            .expect("stream");
        assert_eq!(
            handler.calls,
            vec![
                Call::Workflow("workflow_started".into()),
                Call::Workflow("node_started".into()),
                Call::Tts("aGk=".into()),
                Call::TtsEnd,
                Call::Workflow("workflow_finished".into()),
            ]
        );
    }

    #[tokio::test]
    async fn malformed_frame_is_reported_once_and_skipped() {
        let mut handler = Recorder::default();
        run(
            &RoutingTable::CHAT,
            &["data: {not json\n\n", MESSAGE],
            &mut handler,
        )
        .await
        .expect("stream");
        assert_eq!(
            handler.calls,
            vec![Call::Error(None), Call::Message("hi".into())]
        );
    }

    #[tokio::test]
    async fn null_ids_do_not_drop_the_frame() {
        let mut handler = Recorder::default();
        run(
            &RoutingTable::CHAT,
            &["data: {\"event\":\"message\",\"task_id\":\"t1\",\"message_id\":null,\"answer\":\"hi\",\"created_at\":1}\n\n"],
            &mut handler,
        )
        .await
        .expect("stream");
        assert_eq!(handler.calls, vec![Call::Message("hi".into())]);
    }

    #[tokio::test]
    async fn payload_decode_error_names_the_event() {
        let mut handler = Recorder::default();
        run(
            &RoutingTable::CHAT,
            &["data: {\"event\":\"message\",\"answer\":42}\n\n"],
            &mut handler,
        )
        .await
        .expect("stream");
        assert_eq!(handler.calls, vec![Call::Error(Some("message".into()))]);
    }

    #[tokio::test]
    async fn on_error_failure_aborts() {
        let mut handler = Recorder {
            fail_on_error: true,
            ..Recorder::default()
        };
        let err = run(&RoutingTable::CHAT, &["data: nope\n\n", MESSAGE], &mut handler)
            .await
            .expect_err("abort");
        assert!(matches!(&err, DifyError::Handler(inner) if inner.to_string() == "bad frame"));
        assert_eq!(handler.calls, vec![Call::Error(None)]);
    }

    #[tokio::test]
    async fn handler_error_stops_reading() {
        let (stream, pulled) = counting(&[MESSAGE, MESSAGE, MESSAGE]);
        let mut handler = Recorder {
            fail_on_message: true,
            ..Recorder::default()
        };
        let err = consume_stream(stream, &RoutingTable::CHAT, &mut handler, None)
            .await
            .expect_err("abort");
        assert_eq!(err.to_string(), "handler refused message");
        assert_eq!(handler.calls.len(), 1);
        assert_eq!(pulled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abort_before_first_frame_is_cancelled() {
        let (handle, signal) = AbortHandle::new();
        handle.abort();
        let (stream, pulled) = counting(&[MESSAGE]);
        let mut handler = Recorder::default();
        let end = consume_stream(stream, &RoutingTable::CHAT, &mut handler, Some(signal))
            .await
            .expect("cancelled");
        assert_eq!(end, StreamEnd::Cancelled);
        assert!(handler.calls.is_empty());
        assert_eq!(pulled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn abort_while_waiting_for_data_is_cancelled() {
        let (handle, signal) = AbortHandle::new();
        let bytes = futures::stream::iter(vec![Ok::<_, String>(MESSAGE.as_bytes().to_vec())])
            .chain(futures::stream::pending());
        let mut handler = Recorder::default();
        let consume = consume_stream(bytes, &RoutingTable::CHAT, &mut handler, Some(signal));
        let abort = async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            handle.abort();
        };
        let (end, ()) = tokio::join!(consume, abort);
        assert_eq!(end.expect("cancelled"), StreamEnd::Cancelled);
        assert_eq!(handler.calls, vec![Call::Message("hi".into())]);
    }
}
