use std::time::Duration;

use crate::errors::DifyError;

/// Base URL of the hosted platform API.
pub const DEFAULT_BASE_URL: &str = "https://api.dify.ai/v1";

/// Configuration for [`DifyClient`](crate::DifyClient).
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// App API key used for bearer auth.
    pub api_key: String,
    /// Base URL including the API version segment.
    ///
    /// Useful for self-hosted deployments or local test servers.
    pub base_url: String,
    /// Overall HTTP timeout. Streaming calls are bounded by it as well.
    pub timeout: Duration,
}

impl ClientConfig {
    /// Creates a config with defaults and the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(600),
        }
    }

    /// Builds a config from `DIFY_API_KEY`, `DIFY_BASE_URL` and
    /// `DIFY_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, DifyError> {
        Self::from_lookup(None, |key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an explicit API key;
    /// `DIFY_API_KEY` is not required. Invalid values of the other
    /// variables are still errors.
    pub fn from_env_with_key(api_key: impl Into<String>) -> Result<Self, DifyError> {
        Self::from_lookup(Some(api_key.into()), |key| std::env::var(key).ok())
    }

    fn from_lookup(
        api_key: Option<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, DifyError> {
        let api_key = api_key
            .or_else(|| lookup("DIFY_API_KEY"))
            .unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(DifyError::Config("missing DIFY_API_KEY".into()));
        }
        let mut config = Self::new(api_key.trim());
        if let Some(base_url) = lookup("DIFY_BASE_URL")
            && !base_url.trim().is_empty()
        {
            config = config.base_url(base_url.trim());
        }
        if let Some(raw) = lookup("DIFY_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                DifyError::Config(format!("DIFY_TIMEOUT_SECS must be an integer, got {raw:?}"))
            })?;
            config = config.timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }

    /// Overrides the API base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), DifyError> {
        if self.api_key.trim().is_empty() {
            return Err(DifyError::Config("api_key must not be empty".into()));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(DifyError::Config(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(DifyError::Config("timeout must be greater than 0".into()));
        }
        Ok(())
    }

    pub(crate) fn endpoint_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
