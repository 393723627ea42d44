use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::types::ResponseMetadata;

/// Decodes an absent or `null` field as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Fields present on every stream frame, decoded first to pick a route.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEnvelope {
    pub event: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub task_id: String,
    /// Absent on workflow node events.
    #[serde(default, deserialize_with = "null_as_default")]
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_run_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: i64,
}

/// `message`: an incremental chunk of answer text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(flatten)]
    pub envelope: StreamEnvelope,
    #[serde(default, deserialize_with = "null_as_default")]
    pub answer: String,
}

/// `message_end`: the answer is complete.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageEndEvent {
    #[serde(flatten)]
    pub envelope: StreamEnvelope,
    #[serde(default)]
    pub metadata: ResponseMetadata,
}

/// `tts_message` / `tts_message_end`: a chunk of synthesized speech.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtsEvent {
    #[serde(flatten)]
    pub envelope: StreamEnvelope,
    /// Base64-encoded MP3 bytes. Empty on `tts_message_end`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub audio: String,
}

impl TtsEvent {
    /// Decodes the audio chunk.
    pub fn audio_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(self.audio.trim())
    }
}

/// Any other discriminator: workflow and node lifecycle events.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    #[serde(flatten)]
    pub envelope: StreamEnvelope,
    #[serde(default)]
    pub data: WorkflowNodeData,
}

/// Execution detail carried by workflow events. Which fields are set depends
/// on the event (`workflow_started`, `node_started`, `node_finished`,
/// `workflow_finished`, ...).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNodeData {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub sequence_number: Option<u64>,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub node_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub index: Option<u64>,
    #[serde(default)]
    pub predecessor_node_id: Option<String>,
    #[serde(default)]
    pub inputs: Option<serde_json::Value>,
    #[serde(default)]
    pub outputs: Option<serde_json::Value>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub elapsed_time: Option<f64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    #[serde(default)]
    pub total_steps: Option<u64>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub finished_at: Option<i64>,
    #[serde(default)]
    pub extras: Option<serde_json::Value>,
    #[serde(default)]
    pub parallel_id: Option<serde_json::Value>,
    #[serde(default)]
    pub parallel_start_node_id: Option<serde_json::Value>,
    #[serde(default)]
    pub parent_parallel_id: Option<serde_json::Value>,
    #[serde(default)]
    pub parent_parallel_start_node_id: Option<serde_json::Value>,
    #[serde(default)]
    pub iteration_id: Option<serde_json::Value>,
    #[serde(default)]
    pub parallel_run_id: Option<serde_json::Value>,
}
