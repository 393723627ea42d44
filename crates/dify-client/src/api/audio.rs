use reqwest::Method;

use crate::client::DifyClient;
use crate::errors::DifyError;
use crate::types::TtsRequest;

impl DifyClient {
    /// Synthesizes speech and returns the raw audio bytes.
    pub async fn text_to_audio(&self, request: &TtsRequest) -> Result<Vec<u8>, DifyError> {
        request.validate()?;
        let response = self
            .send(self.request(Method::POST, "text-to-audio").json(request))
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DifyError::Transport(format!("failed to read audio body: {e}")))?;
        Ok(bytes.to_vec())
    }
}
