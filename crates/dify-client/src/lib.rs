//! Async client for the Dify application API.
//!
//! Blocking calls return typed responses; streaming calls decode the
//! Server-Sent-Events body and hand each event to a [`StreamHandler`].
//!
//! ```no_run
//! use dify_client::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), DifyError> {
//! let client = DifyClient::from_env()?;
//! let mut collector = AnswerCollector::new();
//! let request = ChatRequest::new("Say hello").user("demo-user");
//! client.chat_stream(&request, &mut collector).await?;
//!
//! println!("{}", collector.answer);
//! # Ok(())
//! # }
//! ```

/// Endpoint methods implemented on `DifyClient`.
mod api;
/// HTTP client and shared request plumbing.
pub mod client;
/// Client configuration and environment loading.
pub mod config;
/// Error types for client calls, callbacks and stream frames.
pub mod errors;
/// Process-wide tracing subscriber setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// SSE frame reading, event routing and stream handlers.
pub mod stream;
/// Request and response bodies.
pub mod types;

pub use client::DifyClient;
pub use config::{ClientConfig, DEFAULT_BASE_URL};
pub use errors::{ApiError, DifyError, FrameDecodeError, HandlerError};
pub use stream::{AbortHandle, AbortSignal, Endpoint, StreamEnd, StreamHandler};
pub use types::{
    AppInfo, AppParameters, ChatRequest, ChatResponse, CompletionRequest, CompletionResponse,
    FeedbackRequest, FileInput, FileKind, FileUploadResponse, Rating, ResponseMetadata,
    RetrieverResource, TransferMethod, TtsRequest, Usage, WorkflowRequest, WorkflowResponse,
};
