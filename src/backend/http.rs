use crate::analysis::{AnalysisParameters, AnalysisType};
use crate::backend::{AnalysisBackend, BackendError, BackendRequest};
use crate::result::AnalysisResult;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for the HTTP analytics backend
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Base URL of the analytics service, e.g. `http://127.0.0.1:8088`
    pub base_url: String,
    /// Request timeout in seconds (default: 30)
    pub timeout_seconds: u64,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        HttpBackendConfig {
            base_url: "http://127.0.0.1:8088".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl HttpBackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpBackendConfig {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

/// Body of `POST {base_url}/analyze`.
#[derive(Debug, Serialize)]
struct AnalyzeBody<'a> {
    analysis_type: AnalysisType,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a str>,
    parameters: &'a AnalysisParameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a AnalysisResult>,
}

impl<'a> From<BackendRequest<'a>> for AnalyzeBody<'a> {
    fn from(request: BackendRequest<'a>) -> Self {
        AnalyzeBody {
            analysis_type: request.spec.analysis_type,
            name: request.spec.name.as_deref(),
            filter: request.spec.filter.as_deref(),
            parameters: &request.spec.parameters,
            context: request.context,
        }
    }
}

/// Backend delegating each leaf to a remote analytics service.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    config: HttpBackendConfig,
}

impl HttpBackend {
    /// Creates a new HTTP backend.
    ///
    /// # Errors
    /// Returns `BackendError::Unavailable` if the HTTP client cannot be built.
    pub fn new(config: HttpBackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| BackendError::Unavailable(format!("HTTP client creation failed: {}", e)))?;

        Ok(HttpBackend { client, config })
    }

    fn analyze_url(&self) -> String {
        format!("{}/analyze", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl AnalysisBackend for HttpBackend {
    async fn analyze(&self, request: BackendRequest<'_>) -> Result<AnalysisResult, BackendError> {
        let url = self.analyze_url();
        debug!(url = %url, analysis = %request.spec.analysis_type, "HttpBackend: sending request");

        let response = self
            .client
            .post(&url)
            .json(&AnalyzeBody::from(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(Duration::from_secs(self.config.timeout_seconds))
                } else {
                    BackendError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| status.canonical_reason().unwrap_or("Unknown error").to_string());
            warn!(status = status.as_u16(), "HttpBackend: request rejected");
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let result: AnalysisResult = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        if result.analysis_type != request.spec.analysis_type {
            return Err(BackendError::InvalidResponse(format!(
                "expected {} result, got {}",
                request.spec.analysis_type, result.analysis_type
            )));
        }

        Ok(result)
    }

    fn name(&self) -> &str {
        "http"
    }
}
