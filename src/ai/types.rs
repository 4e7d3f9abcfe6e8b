use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default project type used when the caller does not supply one.
pub const DEFAULT_PROJECT_TYPE: &str = "residential";
/// Default code jurisdiction.
pub const DEFAULT_JURISDICTION: &str = "Honolulu";

/// What the caller knows about the inspection: the parts of the context that
/// do not come from session sequencing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectContext {
    pub project_type: String,
    pub jurisdiction: String,
}

impl Default for ProjectContext {
    fn default() -> Self {
        Self {
            project_type: DEFAULT_PROJECT_TYPE.into(),
            jurisdiction: DEFAULT_JURISDICTION.into(),
        }
    }
}

/// Full per-call context handed to providers. Built by the orchestrator,
/// immutable for the duration of one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisContext {
    pub project_type: String,
    pub jurisdiction: String,
    pub session_id: String,
    pub frame_number: u64,
}

impl AnalysisContext {
    pub fn new(project: ProjectContext, session_id: impl Into<String>, frame_number: u64) -> Self {
        Self {
            project_type: project.project_type,
            jurisdiction: project.jurisdiction,
            session_id: session_id.into(),
            frame_number,
        }
    }
}

/// One violation as a provider reported it, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawViolation {
    pub id: Option<String>,
    pub code: Option<String>,
    pub issue: String,
    pub severity: Option<String>,
    pub category: Option<String>,
}

/// Provider result in the common shape both adapters translate into.
/// Never leaves the fallback chain / normalizer boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawProviderResult {
    pub violations: Vec<RawViolation>,
    pub summary: String,
    pub confidence: f64,
    /// Provider-level category hint, used when there are no violations.
    pub category: Option<String>,
    /// Pre-built narration; only the unavailable sentinel sets this.
    pub narration: Option<String>,
    /// Set when every provider failed.
    pub error: Option<String>,
    /// Echo of the provider payload for diagnostics.
    pub raw_text: String,
}

/// Narration used when no provider could be reached.
pub const UNAVAILABLE_NARRATION: &str =
    "Unable to analyze the image. Please check your internet connection and try again.";

impl RawProviderResult {
    /// Sentinel returned by the fallback chain once every provider failed.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            narration: Some(UNAVAILABLE_NARRATION.into()),
            raw_text: reason.clone(),
            error: Some(reason),
            ..Default::default()
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.error.is_some()
    }
}

/// Error type for provider operations
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("Authentication failed: {0}")]
    AuthError(String),
    #[error("Provider unavailable (HTTP {status}): {body}")]
    Unavailable { status: u16, body: String },
    #[error("Service error (HTTP {status}): {body}")]
    ServiceError { status: u16, body: String },
    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("Connection failed: {0}")]
    ConnectionError(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl AiError {
    /// Classify a non-2xx status.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => AiError::AuthError(body),
            s if s >= 500 => AiError::Unavailable { status: s, body },
            s => AiError::ServiceError { status: s, body },
        }
    }

    /// Map a transport failure, treating reqwest's own timeout as `Timeout`.
    pub fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            AiError::Timeout(timeout)
        } else {
            AiError::ConnectionError(err.to_string())
        }
    }
}
