use reqwest::Method;

use crate::client::DifyClient;
use crate::errors::DifyError;

impl DifyClient {
    /// Deletes a conversation owned by `user`.
    pub async fn delete_conversation(
        &self,
        conversation_id: &str,
        user: &str,
    ) -> Result<(), DifyError> {
        if conversation_id.trim().is_empty() {
            return Err(DifyError::validation("conversation_id must not be empty"));
        }
        let body = serde_json::json!({ "user": user });
        self.send(
            self.request(Method::DELETE, &format!("conversations/{conversation_id}"))
                .json(&body),
        )
        .await?;
        Ok(())
    }
}
