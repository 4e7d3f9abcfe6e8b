use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::decode::{decode_tool_response, Decoded};
use super::{AiError, AnalysisContext, RawProviderResult, VisionProvider};
use crate::capture::frame::ImagePayload;

/// Server-side tool for live camera frames.
pub const LIVE_INSPECTION_TOOL: &str = "analyze_live_inspection";
/// Server-side tool for static plan/material uploads.
pub const PHOTO_TOOL: &str = "analyze_photo";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the inspection tool backend: a single tool-invocation endpoint
/// that dispatches on the tool name.
pub struct InspectionToolsClient {
    endpoint: String,
    api_key: String,
    client: Client,
    timeout: Duration,
}

impl InspectionToolsClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            client: Client::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_request_body(
        &self,
        tool: &str,
        image: &ImagePayload,
        context: &AnalysisContext,
        timestamp: &str,
    ) -> Value {
        json!({
            "name": tool,
            "arguments": {
                "imageUrl": image.data_url(),
                "sessionId": context.session_id,
                "frameNumber": context.frame_number,
                "timestamp": timestamp,
                "projectType": context.project_type,
                "jurisdiction": context.jurisdiction,
            }
        })
    }

    async fn call_tool(
        &self,
        tool: &str,
        image: &ImagePayload,
        context: &AnalysisContext,
    ) -> Result<RawProviderResult, AiError> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let body = self.build_request_body(tool, image, context, &timestamp);

        log::debug!(
            "Calling tool {} (session={}, frame={})",
            tool,
            context.session_id,
            context.frame_number
        );

        // The backend gateway wants the credential both as a bearer token and
        // as its own `apikey` header.
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AiError::from_transport(e, self.timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AiError::from_transport(e, self.timeout))?;

        if !status.is_success() {
            return Err(AiError::from_status(status.as_u16(), text));
        }

        match decode_tool_response(&text) {
            Decoded::Ok(result) => Ok(result),
            Decoded::Malformed(reason) => {
                log::warn!("Tool {} returned an undecodable payload: {}", tool, reason);
                Err(AiError::InvalidResponse(reason))
            }
        }
    }
}

#[async_trait]
impl VisionProvider for InspectionToolsClient {
    async fn analyze_frame(
        &self,
        image: &ImagePayload,
        context: &AnalysisContext,
    ) -> Result<RawProviderResult, AiError> {
        self.call_tool(LIVE_INSPECTION_TOOL, image, context).await
    }

    async fn analyze_plan(
        &self,
        image: &ImagePayload,
        context: &AnalysisContext,
    ) -> Result<RawProviderResult, AiError> {
        self.call_tool(PHOTO_TOOL, image, context).await
    }

    fn name(&self) -> &str {
        "inspection-tools"
    }
}
