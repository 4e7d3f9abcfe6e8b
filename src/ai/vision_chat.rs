use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::decode::{decode_chat_response, Decoded};
use super::{AiError, AnalysisContext, RawProviderResult, VisionProvider};
use crate::capture::frame::ImagePayload;

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Instruction sent with every frame. Keeps the model to the one JSON shape
/// the decoder understands.
pub const INSPECTION_PROMPT: &str = "You are a building code inspector reviewing a construction site photo. \
Identify visible building-code or safety violations only. \
Reply with a single JSON object and nothing else, in exactly this shape: \
{\"violations\":[{\"code\":\"<code section or Unknown>\",\"issue\":\"<short description>\",\
\"severity\":\"critical|high|medium|low|warning\",\
\"category\":\"structural|electrical|plumbing|fire-safety|general\"}],\
\"summary\":\"<one sentence compliance summary>\",\"confidence\":<0-100>}. \
If nothing is wrong, return an empty violations array.";

/// Direct client for a hosted vision-capable chat completion endpoint.
pub struct VisionChatClient {
    endpoint: String,
    api_key: String,
    model: String,
    client: Client,
    timeout: Duration,
}

impl VisionChatClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            client: Client::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_request_body(&self, image: &ImagePayload, context: &AnalysisContext) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": INSPECTION_PROMPT },
                {
                    "role": "user",
                    "content": [
                        {
                            "type": "text",
                            "text": format!(
                                "Project type: {}. Jurisdiction: {}.",
                                context.project_type, context.jurisdiction
                            )
                        },
                        {
                            "type": "image_url",
                            "image_url": { "url": image.data_url(), "detail": "high" }
                        }
                    ]
                }
            ],
            "max_tokens": 1000,
            "temperature": 0.2
        })
    }
}

#[async_trait]
impl VisionProvider for VisionChatClient {
    async fn analyze_frame(
        &self,
        image: &ImagePayload,
        context: &AnalysisContext,
    ) -> Result<RawProviderResult, AiError> {
        let body = self.build_request_body(image, context);

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
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

        // A reply we cannot read still counts as an answer: no violations.
        match decode_chat_response(&text) {
            Decoded::Ok(result) => Ok(result),
            Decoded::Malformed(reason) => {
                log::warn!("Vision model reply not parseable ({}), using empty result", reason);
                Ok(RawProviderResult {
                    raw_text: text,
                    ..Default::default()
                })
            }
        }
    }

    fn name(&self) -> &str {
        "vision-chat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn payload() -> ImagePayload {
        ImagePayload {
            data: "img".into(),
            width: 1,
            height: 1,
            source: PathBuf::from("f.jpg"),
        }
    }

    fn context() -> AnalysisContext {
        AnalysisContext {
            project_type: "residential".into(),
            jurisdiction: "Honolulu".into(),
            session_id: "s".into(),
            frame_number: 1,
        }
    }

    #[test]
    fn test_request_body_structure() {
        let client = VisionChatClient::new("https://api.test/v1/chat/completions", "k", "gpt-4o");
        let body = client.build_request_body(&payload(), &context());

        assert_eq!(body["model"], "gpt-4o");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], INSPECTION_PROMPT);

        let content = messages[1]["content"].as_array().unwrap();
        assert_eq!(content[0]["type"], "text");
        assert!(content[0]["text"].as_str().unwrap().contains("residential"));
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], "data:image/jpeg;base64,img");
    }

    #[test]
    fn test_client_name() {
        let client = VisionChatClient::new("https://api.test", "k", DEFAULT_MODEL);
        assert_eq!(client.name(), "vision-chat");
    }

    #[tokio::test]
    async fn plan_analysis_is_unsupported() {
        let client = VisionChatClient::new("https://api.test", "k", DEFAULT_MODEL);
        let err = client.analyze_plan(&payload(), &context()).await.unwrap_err();
        assert!(matches!(err, AiError::Unsupported(_)));
    }

    mod http_tests {
        use super::*;
        use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

        fn chat_reply(content: &str) -> String {
            json!({
                "id": "chatcmpl-1",
                "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
            })
            .to_string()
        }

        #[tokio::test]
        async fn structured_reply_is_decoded() {
            let server = MockServer::start().await;
            Mock::given(matchers::method("POST"))
                .and(matchers::header("authorization", "Bearer k"))
                .respond_with(ResponseTemplate::new(200).set_body_string(chat_reply(
                    r#"{"violations":[{"code":"IRC R314","issue":"No smoke alarm","severity":"high","category":"safety"}],"summary":"Alarm missing","confidence":70}"#,
                )))
                .expect(1)
                .mount(&server)
                .await;

            let client = VisionChatClient::new(server.uri(), "k", DEFAULT_MODEL);
            let result = client.analyze_frame(&payload(), &context()).await.unwrap();
            assert_eq!(result.violations.len(), 1);
            assert_eq!(result.violations[0].category.as_deref(), Some("safety"));
            assert_eq!(result.summary, "Alarm missing");
        }

        #[tokio::test]
        async fn malformed_reply_becomes_empty_result() {
            let server = MockServer::start().await;
            Mock::given(matchers::method("POST"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_string(chat_reply("Sorry, the photo is too dark to assess.")),
                )
                .mount(&server)
                .await;

            let client = VisionChatClient::new(server.uri(), "k", DEFAULT_MODEL);
            let result = client.analyze_frame(&payload(), &context()).await.unwrap();
            assert!(result.violations.is_empty());
            assert_eq!(result.confidence, 0.0);
            assert!(result.raw_text.contains("too dark"));
        }

        #[tokio::test]
        async fn auth_failure_is_typed() {
            let server = MockServer::start().await;
            Mock::given(matchers::method("POST"))
                .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
                .mount(&server)
                .await;

            let client = VisionChatClient::new(server.uri(), "bad", DEFAULT_MODEL);
            match client.analyze_frame(&payload(), &context()).await.unwrap_err() {
                AiError::AuthError(msg) => assert!(msg.contains("invalid api key")),
                other => panic!("expected AuthError, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn server_error_is_unavailable() {
            let server = MockServer::start().await;
            Mock::given(matchers::method("POST"))
                .respond_with(ResponseTemplate::new(500))
                .mount(&server)
                .await;

            let client = VisionChatClient::new(server.uri(), "k", DEFAULT_MODEL);
            let err = client.analyze_frame(&payload(), &context()).await.unwrap_err();
            assert!(matches!(err, AiError::Unavailable { status: 500, .. }));
        }
    }
}
