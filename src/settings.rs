use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::ai::{ProjectContext, DEFAULT_JURISDICTION, DEFAULT_PROJECT_TYPE};
use crate::capture::frame::{FrameEncoder, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_WIDTH};
use crate::retry::RetryPolicy;

pub const TOOL_API_KEY_ENV: &str = "SITEINSPECT_TOOL_API_KEY";
pub const VISION_API_KEY_ENV: &str = "SITEINSPECT_VISION_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to access settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid {field} URL '{value}': {source}")]
    InvalidEndpoint {
        field: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub tool_endpoint: String,
    pub tool_api_key: String,
    pub vision_endpoint: String,
    pub vision_api_key: String,
    pub vision_model: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub retry_auth_failures: bool,
    pub max_image_width: u32,
    pub jpeg_quality: u8,
    pub project_type: String,
    pub jurisdiction: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tool_endpoint: "http://localhost:54321/functions/v1/mcp-tools".into(),
            tool_api_key: String::new(),
            vision_endpoint: "https://api.openai.com/v1/chat/completions".into(),
            vision_api_key: String::new(),
            vision_model: crate::ai::vision_chat::DEFAULT_MODEL.into(),
            request_timeout_secs: 30,
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 5000,
            retry_auth_failures: false,
            max_image_width: DEFAULT_MAX_WIDTH,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            project_type: DEFAULT_PROJECT_TYPE.into(),
            jurisdiction: DEFAULT_JURISDICTION.into(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, falling back to defaults when the file does
    /// not exist.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            log::info!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        log::info!("Settings saved to {}", path.display());
        Ok(())
    }

    /// API keys from the environment win over the file.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var(TOOL_API_KEY_ENV) {
            self.tool_api_key = key;
        }
        if let Ok(key) = std::env::var(VISION_API_KEY_ENV) {
            self.vision_api_key = key;
        }
        self
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        for (field, value) in [
            ("toolEndpoint", &self.tool_endpoint),
            ("visionEndpoint", &self.vision_endpoint),
        ] {
            url::Url::parse(value).map_err(|source| SettingsError::InvalidEndpoint {
                field,
                value: value.clone(),
                source,
            })?;
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            retry_auth_failures: self.retry_auth_failures,
        }
    }

    pub fn frame_encoder(&self) -> FrameEncoder {
        FrameEncoder::new(self.max_image_width, self.jpeg_quality)
    }

    pub fn project_context(&self) -> ProjectContext {
        ProjectContext {
            project_type: self.project_type.clone(),
            jurisdiction: self.jurisdiction.clone(),
        }
    }
}
