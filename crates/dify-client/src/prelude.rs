//! Common imports for typical client usage.
pub use crate::stream::{
    AbortHandle, AbortSignal, AnswerCollector, CallbackHandler, Endpoint, MessageEndEvent,
    MessageEvent, StreamEnd, StreamHandler, TtsEvent, WorkflowEvent,
};
pub use crate::{
    ChatRequest, ClientConfig, CompletionRequest, DifyClient, DifyError, FileInput, FileKind,
    HandlerError, WorkflowRequest,
};
