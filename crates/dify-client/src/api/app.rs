use reqwest::Method;

use crate::client::DifyClient;
use crate::errors::DifyError;
use crate::types::{AppInfo, AppParameters};

impl DifyClient {
    /// Name, description and tags of the app.
    pub async fn app_info(&self) -> Result<AppInfo, DifyError> {
        self.send_json(self.request(Method::GET, "info")).await
    }

    /// Feature switches, input form and upload limits of the app.
    pub async fn app_parameters(&self) -> Result<AppParameters, DifyError> {
        self.send_json(self.request(Method::GET, "parameters"))
            .await
    }
}
