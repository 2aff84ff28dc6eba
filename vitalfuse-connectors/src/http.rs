//! HTTP snapshot store
//!
//! POSTs each snapshot as JSON to `{base_url}{path}`. ureq is blocking, so
//! requests run on tokio's blocking pool. 5xx and 429 responses and
//! transport failures are reported as retryable; other 4xx responses are
//! permanent configuration errors.
//!
//! ```no_run
//! use vitalfuse_connectors::http::{HttpConfig, HttpStore};
//!
//! let store = HttpStore::new(
//!     HttpConfig::new("https://api.example.com")
//!         .path("/v1/snapshots")
//!         .bearer_token("token")
//!         .timeout_secs(5),
//! )?;
//! # Ok::<(), vitalfuse_connectors::ConnectorError>(())
//! ```

use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::Mutex;
use vitalfuse_core::SubjectSnapshot;

use crate::{ConnectionStats, ConnectorError, SnapshotStore};

/// HTTP configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Base URL for the API
    pub base_url: String,
    /// Endpoint receiving snapshots
    pub path: String,
    /// Request timeout
    pub timeout: Duration,
    pub auth: AuthMethod,
    /// Custom headers
    pub headers: HashMap<String, String>,
    pub user_agent: String,
}

/// Authentication methods
#[derive(Debug, Clone)]
pub enum AuthMethod {
    None,
    Bearer(String),
    /// API key in a named header
    ApiKey { header: String, value: String },
}

impl HttpConfig {
    /// Create new configuration with base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: "/snapshots".to_string(),
            timeout: Duration::from_secs(10),
            auth: AuthMethod::None,
            headers: HashMap::new(),
            user_agent: format!("VitalFuse/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set bearer token authentication
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.auth = AuthMethod::Bearer(token.into());
        self
    }

    /// Set API key authentication
    pub fn api_key(mut self, header: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth = AuthMethod::ApiKey { header: header.into(), value: value.into() };
        self
    }

    /// Set request timeout in seconds
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Add custom header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.path)
    }
}

/// Snapshot store backed by a REST endpoint
pub struct HttpStore {
    config: Arc<HttpConfig>,
    agent: ureq::Agent,
    stats: Mutex<ConnectionStats>,
}

impl HttpStore {
    pub fn new(config: HttpConfig) -> Result<Self, ConnectorError> {
        if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
            return Err(ConnectorError::Config("base URL must start with http:// or https://".into()));
        }
        if !config.path.starts_with('/') {
            return Err(ConnectorError::Config("path must start with /".into()));
        }

        let agent = ureq::AgentBuilder::new()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build();

        Ok(Self {
            config: Arc::new(config),
            agent,
            stats: Mutex::new(ConnectionStats::default()),
        })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    fn build_request(config: &HttpConfig, agent: &ureq::Agent) -> ureq::Request {
        let mut request = agent.post(&config.url());
        match &config.auth {
            AuthMethod::None => {}
            AuthMethod::Bearer(token) => {
                request = request.set("Authorization", &format!("Bearer {}", token));
            }
            AuthMethod::ApiKey { header, value } => {
                request = request.set(header, value);
            }
        }
        for (name, value) in &config.headers {
            request = request.set(name, value);
        }
        request.set("Content-Type", "application/json")
    }

    fn record(&self, result: &Result<(), ConnectorError>, bytes: usize) {
        let mut stats = self.stats.lock();
        match result {
            Ok(()) => stats.record_success(bytes),
            Err(err) => stats.record_failure(err),
        }
    }
}

impl std::fmt::Debug for HttpStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStore").field("url", &self.config.url()).finish()
    }
}

fn classify(error: ureq::Error) -> ConnectorError {
    match error {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            if code >= 500 || code == 429 {
                ConnectorError::Unavailable(format!("status {}: {}", code, body))
            } else {
                ConnectorError::Config(format!("status {}: {}", code, body))
            }
        }
        ureq::Error::Transport(transport) => ConnectorError::Unavailable(transport.to_string()),
    }
}

#[async_trait::async_trait]
impl SnapshotStore for HttpStore {
    async fn write(&self, snapshot: &SubjectSnapshot) -> Result<(), ConnectorError> {
        let body = serde_json::to_string(snapshot)?;
        let bytes = body.len();
        let request = Self::build_request(&self.config, &self.agent);

        let result = match tokio::task::spawn_blocking(move || request.send_string(&body)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(classify(err)),
            Err(join) => Err(ConnectorError::Unavailable(format!("request task failed: {}", join))),
        };
        self.record(&result, bytes);
        result
    }

    fn name(&self) -> &'static str {
        "http"
    }

    fn stats(&self) -> ConnectionStats {
        self.stats.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = HttpConfig::new("https://api.example.com/")
            .path("/v1/snapshots")
            .bearer_token("test-token")
            .timeout_secs(60)
            .header("X-Custom", "value");

        assert_eq!(config.url(), "https://api.example.com/v1/snapshots");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.headers.contains_key("X-Custom"));
        assert!(matches!(config.auth, AuthMethod::Bearer(ref token) if token == "test-token"));
    }

    #[test]
    fn url_validation() {
        assert!(matches!(HttpStore::new(HttpConfig::new("not-a-url")), Err(ConnectorError::Config(_))));
        assert!(HttpStore::new(HttpConfig::new("https://valid.url").path("no-slash")).is_err());
        assert!(HttpStore::new(HttpConfig::new("https://valid.url")).is_ok());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_retryable() {
        let store = HttpStore::new(HttpConfig::new("http://127.0.0.1:9").timeout_secs(1)).unwrap();
        let model = std::sync::Arc::new(vitalfuse_core::fusion::FilterModel::default());
        let noise = vitalfuse_core::tuning::NoiseHandle::new(vitalfuse_core::tuning::ProcessNoise::new(
            model.process_noise,
        ));
        let snapshot = vitalfuse_core::SubjectEstimator::new("s1", model, noise).snapshot();

        let err = store.write(&snapshot).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.stats().messages_failed, 1);
    }
}
