//! Server-Sent-Events decoding for the streaming endpoints.
//!
//! A [`FrameReader`] turns the response body into `data: ` payloads and
//! [`consume_stream`] routes each payload through the endpoint's
//! [`RoutingTable`] to a [`StreamHandler`] callback. Callbacks run one at a
//! time in arrival order on the task that issued the call.

mod abort;
mod dispatch;
mod events;
mod frame;
mod handler;

pub use abort::{AbortHandle, AbortSignal};
pub use dispatch::{Endpoint, Route, RoutingTable, StreamEnd, consume_stream, dispatch_frame};
pub use events::{
    MessageEndEvent, MessageEvent, StreamEnvelope, TtsEvent, WorkflowEvent, WorkflowNodeData,
};
pub use frame::{FrameReader, data_payload};
pub use handler::{AnswerCollector, CallbackHandler, StreamHandler};
