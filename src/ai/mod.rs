use async_trait::async_trait;

pub mod decode;
pub mod inspection_tools;
pub mod types;
pub mod vision_chat;
pub use types::*;

use crate::capture::frame::ImagePayload;

/// Trait for remote vision backends (the inspection tool backend, a direct
/// vision chat model, ...).
/// Each provider owns its request shape, headers and timeout, and translates
/// its reply into the shared `RawProviderResult` shape.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Analyze one live inspection frame.
    async fn analyze_frame(
        &self,
        image: &ImagePayload,
        context: &AnalysisContext,
    ) -> Result<RawProviderResult, AiError>;

    /// Analyze a static plan or material photo. Single-shot, no fallback.
    async fn analyze_plan(
        &self,
        _image: &ImagePayload,
        _context: &AnalysisContext,
    ) -> Result<RawProviderResult, AiError> {
        Err(AiError::Unsupported(format!(
            "plan analysis not supported by {}",
            self.name()
        )))
    }

    /// Provider name for logging/display
    fn name(&self) -> &str;
}
