use std::path::Path;

use reqwest::Method;
use reqwest::multipart::{Form, Part};
use tracing::debug;

use crate::client::DifyClient;
use crate::errors::DifyError;
use crate::types::FileUploadResponse;

impl DifyClient {
    /// Uploads a local file for use as a `FileInput::uploaded` attachment.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        user: &str,
    ) -> Result<FileUploadResponse, DifyError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                DifyError::validation(format!("{} has no usable file name", path.display()))
            })?
            .to_string();
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| DifyError::Io(format!("failed to read {}: {e}", path.display())))?;
        self.upload_file_bytes(&file_name, content, user).await
    }

    /// Uploads in-memory content under `file_name`.
    ///
    /// The MIME type is guessed from the file extension.
    pub async fn upload_file_bytes(
        &self,
        file_name: &str,
        content: Vec<u8>,
        user: &str,
    ) -> Result<FileUploadResponse, DifyError> {
        if file_name.trim().is_empty() {
            return Err(DifyError::validation("file name must not be empty"));
        }
        let mime = mime_guess::from_path(file_name).first_or_octet_stream();
        debug!(event = "dify.upload_started", file_name, mime = %mime, bytes = content.len() as u64);
        let part = Part::bytes(content)
            .file_name(file_name.to_string())
            .mime_str(mime.essence_str())
            .map_err(|e| DifyError::Transport(format!("invalid MIME type {mime}: {e}")))?;
        let form = Form::new().part("file", part).text("user", user.to_string());
        self.send_json(self.request(Method::POST, "files/upload").multipart(form))
            .await
    }
}
