//! Request and response bodies for the non-streaming parts of the API.

use serde::{Deserialize, Serialize};

use crate::errors::DifyError;

/// App input variables, keyed by variable name.
pub type Inputs = serde_json::Map<String, serde_json::Value>;

/// How the platform should deliver the answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    Blocking,
    Streaming,
}

/// Attaches the response mode to a request body at serialization time.
#[derive(Serialize)]
pub(crate) struct WithResponseMode<'a, T: Serialize> {
    #[serde(flatten)]
    pub request: &'a T,
    pub response_mode: ResponseMode,
}

/// Kind of a file attached to a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Document,
    Audio,
    Video,
    Custom,
}

/// How the platform obtains an attached file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMethod {
    RemoteUrl,
    LocalFile,
}

/// File attached to a chat, completion or workflow request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInput {
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub transfer_method: TransferMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_file_id: Option<String>,
}

impl FileInput {
    /// File fetched by the platform from a URL.
    pub fn remote(kind: FileKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            transfer_method: TransferMethod::RemoteUrl,
            url: Some(url.into()),
            upload_file_id: None,
        }
    }

    /// File previously uploaded with `upload_file`.
    pub fn uploaded(kind: FileKind, upload_file_id: impl Into<String>) -> Self {
        Self {
            kind,
            transfer_method: TransferMethod::LocalFile,
            url: None,
            upload_file_id: Some(upload_file_id.into()),
        }
    }

    fn validate(&self) -> Result<(), DifyError> {
        match self.transfer_method {
            TransferMethod::RemoteUrl if is_blank(self.url.as_deref()) => Err(
                DifyError::validation("remote_url file input requires a url"),
            ),
            TransferMethod::LocalFile if is_blank(self.upload_file_id.as_deref()) => Err(
                DifyError::validation("local_file file input requires an upload_file_id"),
            ),
            _ => Ok(()),
        }
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

fn validate_user(user: Option<&str>) -> Result<(), DifyError> {
    if let Some(user) = user
        && user.trim().is_empty()
    {
        return Err(DifyError::validation("user must not be blank when set"));
    }
    Ok(())
}

fn validate_files(files: &[FileInput]) -> Result<(), DifyError> {
    files.iter().try_for_each(FileInput::validate)
}

/// Body of a chat turn (`/chat-messages`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub inputs: Inputs,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_generate_name: Option<bool>,
}

impl ChatRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn input(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Continues an existing conversation.
    pub fn conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn parent_message_id(mut self, id: impl Into<String>) -> Self {
        self.parent_message_id = Some(id.into());
        self
    }

    pub fn file(mut self, file: FileInput) -> Self {
        self.files.push(file);
        self
    }

    pub fn auto_generate_name(mut self, enabled: bool) -> Self {
        self.auto_generate_name = Some(enabled);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), DifyError> {
        if self.query.trim().is_empty() {
            return Err(DifyError::validation("chat query must not be empty"));
        }
        validate_user(self.user.as_deref())?;
        validate_files(&self.files)
    }
}

/// Body of a text-generation request (`/completion-messages`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    #[serde(default)]
    pub inputs: Inputs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_generate_name: Option<bool>,
}

impl CompletionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn file(mut self, file: FileInput) -> Self {
        self.files.push(file);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), DifyError> {
        validate_user(self.user.as_deref())?;
        validate_files(&self.files)
    }
}

/// Body of a workflow run (`/workflows/run`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    #[serde(default)]
    pub inputs: Inputs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileInput>,
}

impl WorkflowRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn file(mut self, file: FileInput) -> Self {
        self.files.push(file);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), DifyError> {
        validate_user(self.user.as_deref())?;
        validate_files(&self.files)
    }
}

/// Token accounting attached to a finished answer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Knowledge segment the answer cited.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrieverResource {
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub dataset_id: Option<String>,
    #[serde(default)]
    pub dataset_name: Option<String>,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub document_name: Option<String>,
    #[serde(default)]
    pub segment_id: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub retriever_resources: Vec<RetrieverResource>,
}

/// Blocking chat answer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub metadata: ResponseMetadata,
    #[serde(default)]
    pub created_at: i64,
}

/// Blocking completion answer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub metadata: ResponseMetadata,
    #[serde(default)]
    pub created_at: i64,
}

/// Result of a blocking workflow run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRunData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub workflow_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub outputs: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub elapsed_time: f64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub total_steps: u64,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub finished_at: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResponse {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub workflow_run_id: String,
    #[serde(default)]
    pub data: WorkflowRunData,
}

/// Metadata of an uploaded file; `id` is what `FileInput::uploaded` takes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUploadResponse {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub extension: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub created_at: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Like,
    Dislike,
}

/// Feedback on a message. A `None` rating revokes earlier feedback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub rating: Option<Rating>,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl FeedbackRequest {
    pub fn new(rating: Option<Rating>, user: impl Into<String>) -> Self {
        Self {
            rating,
            user: user.into(),
            content: None,
        }
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<(), DifyError> {
        if self.user.trim().is_empty() {
            return Err(DifyError::validation("feedback user must not be empty"));
        }
        Ok(())
    }
}

/// Text-to-speech request; set either `message_id` or `text`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtsRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub user: String,
}

impl TtsRequest {
    pub fn for_text(text: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            message_id: None,
            text: Some(text.into()),
            user: user.into(),
        }
    }

    pub fn for_message(message_id: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            message_id: Some(message_id.into()),
            text: None,
            user: user.into(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), DifyError> {
        if is_blank(self.message_id.as_deref()) && is_blank(self.text.as_deref()) {
            return Err(DifyError::validation(
                "text-to-audio requires a message_id or text",
            ));
        }
        if self.user.trim().is_empty() {
            return Err(DifyError::validation("text-to-audio user must not be empty"));
        }
        Ok(())
    }
}

/// Basic app information from `/info`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUploadConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub number_limits: u32,
    #[serde(default)]
    pub transfer_methods: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUploadConfig {
    #[serde(default)]
    pub image: ImageUploadConfig,
}

/// Upload size limits in MB.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemParameters {
    #[serde(default)]
    pub file_size_limit: u64,
    #[serde(default)]
    pub image_file_size_limit: u64,
    #[serde(default)]
    pub audio_file_size_limit: u64,
    #[serde(default)]
    pub video_file_size_limit: u64,
}

/// Feature switches and input form of an app, from `/parameters`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AppParameters {
    #[serde(default)]
    pub opening_statement: String,
    #[serde(default)]
    pub suggested_questions: Vec<String>,
    #[serde(default)]
    pub suggested_questions_after_answer: FeatureToggle,
    #[serde(default)]
    pub speech_to_text: FeatureToggle,
    #[serde(default)]
    pub text_to_speech: FeatureToggle,
    #[serde(default)]
    pub retriever_resource: FeatureToggle,
    #[serde(default)]
    pub annotation_reply: FeatureToggle,
    #[serde(default)]
    pub user_input_form: Vec<serde_json::Value>,
    #[serde(default)]
    pub file_upload: FileUploadConfig,
    #[serde(default)]
    pub system_parameters: SystemParameters,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureToggle {
    #[serde(default)]
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_mode_is_flattened_into_request_body() {
        let request = ChatRequest::new("hello")
            .user("user-1")
            .input("lang", "en")
            .file(FileInput::remote(FileKind::Image, "https://x/y.png"));
        let body = serde_json::to_value(WithResponseMode {
            request: &request,
            response_mode: ResponseMode::Streaming,
        })
        .expect("serialize");

        assert_eq!(body["response_mode"], "streaming");
        assert_eq!(body["query"], "hello");
        assert_eq!(body["inputs"]["lang"], "en");
        assert_eq!(body["files"][0]["type"], "image");
        assert_eq!(body["files"][0]["transfer_method"], "remote_url");
        assert!(body.get("conversation_id").is_none());
    }

    #[test]
    fn empty_inputs_serialize_as_object() {
        let body = serde_json::to_value(WorkflowRequest::new()).expect("serialize");
        assert_eq!(body["inputs"], serde_json::json!({}));
        assert!(body.get("files").is_none());
    }

    #[test]
    fn validation_rejects_blank_user_and_incomplete_files() {
        assert!(matches!(
            ChatRequest::new("hi").user(" ").validate(),
            Err(DifyError::Validation(_))
        ));
        assert!(matches!(
            ChatRequest::new("  ").validate(),
            Err(DifyError::Validation(message)) if message.contains("query")
        ));
        let missing_id = FileInput {
            kind: FileKind::Document,
            transfer_method: TransferMethod::LocalFile,
            url: None,
            upload_file_id: None,
        };
        assert!(matches!(
            WorkflowRequest::new().file(missing_id).validate(),
            Err(DifyError::Validation(message)) if message.contains("upload_file_id")
        ));
        assert!(
            CompletionRequest::new()
                .file(FileInput::uploaded(FileKind::Document, "f-1"))
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn feedback_serializes_null_rating() {
        let body = serde_json::to_value(FeedbackRequest::new(None, "u")).expect("serialize");
        assert_eq!(body, serde_json::json!({"rating": null, "user": "u"}));
    }

    #[test]
    fn tts_requires_text_or_message() {
        let empty = TtsRequest {
            user: "u".into(),
            ..TtsRequest::default()
        };
        assert!(empty.validate().is_err());
        assert!(TtsRequest::for_text("hello", "u").validate().is_ok());
    }

    #[test]
    fn app_parameters_tolerate_missing_sections() {
        let params: AppParameters = serde_json::from_value(serde_json::json!({
            "opening_statement": "hi",
            "speech_to_text": {"enabled": true},
            "system_parameters": {"file_size_limit": 15}
        }))
        .expect("decode");
        assert!(params.speech_to_text.enabled);
        assert!(!params.retriever_resource.enabled);
        assert_eq!(params.system_parameters.file_size_limit, 15);
    }
}
