use std::fmt;

/// Error codes the platform returns in the `code` field of an error body.
pub mod codes {
    pub const INVALID_PARAM: &str = "invalid_param";
    pub const APP_UNAVAILABLE: &str = "app_unavailable";
    pub const PROVIDER_NOT_INITIALIZE: &str = "provider_not_initialize";
    pub const PROVIDER_QUOTA_EXCEEDED: &str = "provider_quota_exceeded";
    pub const MODEL_CURRENTLY_NOT_SUPPORT: &str = "model_currently_not_support";
    pub const COMPLETION_REQUEST_ERROR: &str = "completion_request_error";
    pub const TOO_MANY_FILES: &str = "too_many_files";
    pub const UNSUPPORTED_PREVIEW: &str = "unsupported_preview";
    pub const FILE_TOO_LARGE: &str = "file_too_large";
    pub const UNSUPPORTED_FILE_TYPE: &str = "unsupported_file_type";
}

/// Structured error body returned by the platform on non-success statuses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
#[error("[{status}] {code}: {message}")]
pub struct ApiError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: u16,
}

impl ApiError {
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_invalid_param(&self) -> bool {
        self.code == codes::INVALID_PARAM
    }

    pub fn is_quota_exceeded(&self) -> bool {
        self.code == codes::PROVIDER_QUOTA_EXCEEDED
    }
}

/// Error returned by a stream callback to abort the streaming call.
///
/// The wrapped error is returned to the caller of the streaming entry point
/// unchanged and can be recovered with [`HandlerError::downcast_ref`].
pub struct HandlerError {
    inner: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl HandlerError {
    /// Wraps any error or message.
    pub fn new(error: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        Self {
            inner: error.into(),
        }
    }

    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    pub fn into_inner(self) -> Box<dyn std::error::Error + Send + Sync + 'static> {
        self.inner
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HandlerError").field(&self.inner).finish()
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

/// A single stream frame that could not be decoded.
///
/// Passed to `StreamHandler::on_error`; the frame is skipped unless the
/// handler turns it into an abort.
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    /// The common envelope (`event`, ids, timestamp) did not parse.
    #[error("failed to parse stream response: {source}")]
    Envelope {
        source: serde_json::Error,
        payload: String,
    },
    /// The envelope parsed but the kind-specific payload did not.
    #[error("failed to decode `{event}` event: {source}")]
    Payload {
        event: String,
        source: serde_json::Error,
        payload: String,
    },
}

impl FrameDecodeError {
    /// Raw JSON text of the offending frame.
    pub fn payload(&self) -> &str {
        match self {
            Self::Envelope { payload, .. } | Self::Payload { payload, .. } => payload,
        }
    }

    /// Discriminator of the frame, when the envelope was readable.
    pub fn event(&self) -> Option<&str> {
        match self {
            Self::Envelope { .. } => None,
            Self::Payload { event, .. } => Some(event),
        }
    }
}

/// Top-level error type for every client operation.
#[derive(Debug, thiserror::Error)]
pub enum DifyError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Request rejected locally before it was sent.
    #[error("validation error: {0}")]
    Validation(String),
    /// Request could not be built or sent.
    #[error("transport error: {0}")]
    Transport(String),
    /// The platform answered with a non-success status.
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    /// A non-streaming response body did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
    /// The event stream failed mid-read.
    #[error("failed to read stream: {0}")]
    StreamRead(String),
    /// A stream callback aborted the call.
    #[error(transparent)]
    Handler(HandlerError),
    /// Local file access failed.
    #[error("io error: {0}")]
    Io(String),
}

impl DifyError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// HTTP status for `Status` errors.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Parses the platform error body of a `Status` error.
    ///
    /// Returns `None` for other variants or when the body is not the
    /// platform's JSON error shape.
    pub fn api_error(&self) -> Option<ApiError> {
        let Self::Status { status, body } = self else {
            return None;
        };
        let mut api: ApiError = serde_json::from_str(body).ok()?;
        if api.code.is_empty() && api.message.is_empty() {
            return None;
        }
        if api.status == 0 {
            api.status = *status;
        }
        Some(api)
    }

    pub fn is_invalid_param(&self) -> bool {
        self.api_error().is_some_and(|api| api.is_invalid_param())
    }

    pub fn is_quota_exceeded(&self) -> bool {
        self.api_error().is_some_and(|api| api.is_quota_exceeded())
    }
}

impl From<HandlerError> for DifyError {
    fn from(value: HandlerError) -> Self {
        DifyError::Handler(value)
    }
}
