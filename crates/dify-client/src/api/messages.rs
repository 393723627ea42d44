use reqwest::Method;
use tracing::debug;

use crate::client::DifyClient;
use crate::errors::DifyError;
use crate::stream::Endpoint;
use crate::types::FeedbackRequest;

impl DifyClient {
    /// Rates a message. A `None` rating clears earlier feedback.
    pub async fn send_feedback(
        &self,
        message_id: &str,
        feedback: &FeedbackRequest,
    ) -> Result<(), DifyError> {
        if message_id.trim().is_empty() {
            return Err(DifyError::validation("message_id must not be empty"));
        }
        feedback.validate()?;
        let path = format!("messages/{message_id}/feedbacks");
        self.send(self.request(Method::POST, &path).json(feedback))
            .await?;
        Ok(())
    }

    /// Stops a streaming generation identified by the `task_id` of its events.
    pub async fn stop_response(
        &self,
        endpoint: Endpoint,
        task_id: &str,
        user: &str,
    ) -> Result<(), DifyError> {
        if task_id.trim().is_empty() {
            return Err(DifyError::validation("task_id must not be empty"));
        }
        debug!(event = "dify.stop_requested", endpoint = %endpoint, task_id);
        let body = serde_json::json!({ "user": user });
        self.send(
            self.request(Method::POST, &endpoint.stop_path(task_id))
                .json(&body),
        )
        .await?;
        Ok(())
    }
}
