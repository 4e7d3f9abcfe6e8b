//! Primary provider (with retries), then secondary provider (once), then a
//! degraded sentinel. Never fails.

use std::sync::Arc;

use crate::ai::{AnalysisContext, RawProviderResult, VisionProvider};
use crate::analysis::Provenance;
use crate::capture::frame::ImagePayload;
use crate::retry::RetryPolicy;

/// What the chain produced and who produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    pub raw: RawProviderResult,
    pub provider: Provenance,
}

pub struct FallbackChain {
    primary: Arc<dyn VisionProvider>,
    secondary: Arc<dyn VisionProvider>,
    retry: RetryPolicy,
}

impl FallbackChain {
    pub fn new(
        primary: Arc<dyn VisionProvider>,
        secondary: Arc<dyn VisionProvider>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            primary,
            secondary,
            retry,
        }
    }

    pub fn primary(&self) -> &Arc<dyn VisionProvider> {
        &self.primary
    }

    pub async fn run(&self, image: &ImagePayload, context: &AnalysisContext) -> ChainOutcome {
        let primary_err = match self
            .retry
            .execute(|| self.primary.analyze_frame(image, context))
            .await
        {
            Ok(raw) => {
                return ChainOutcome {
                    raw,
                    provider: Provenance::Primary,
                }
            }
            Err(e) => e,
        };

        log::warn!(
            "Primary provider {} failed ({}), falling back to {}",
            self.primary.name(),
            primary_err,
            self.secondary.name()
        );

        match self.secondary.analyze_frame(image, context).await {
            Ok(raw) => ChainOutcome {
                raw,
                provider: Provenance::Secondary,
            },
            Err(secondary_err) => {
                log::error!(
                    "All providers failed for frame {} (primary: {}; secondary: {})",
                    context.frame_number,
                    primary_err,
                    secondary_err
                );
                ChainOutcome {
                    raw: RawProviderResult::unavailable(format!(
                        "primary: {}; secondary: {}",
                        primary_err, secondary_err
                    )),
                    provider: Provenance::Degraded,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiError;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails `fail_times` times, then answers with `summary`.
    struct ScriptedProvider {
        name: &'static str,
        calls: AtomicU32,
        fail_times: u32,
        auth: bool,
        summary: &'static str,
    }

    impl ScriptedProvider {
        fn new(name: &'static str, fail_times: u32, summary: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicU32::new(0),
                fail_times,
                auth: false,
                summary,
            })
        }

        fn auth_failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicU32::new(0),
                fail_times: u32::MAX,
                auth: true,
                summary: "",
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VisionProvider for ScriptedProvider {
        async fn analyze_frame(
            &self,
            _image: &ImagePayload,
            _context: &AnalysisContext,
        ) -> Result<RawProviderResult, AiError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                if self.auth {
                    return Err(AiError::AuthError("bad key".into()));
                }
                return Err(AiError::Timeout(Duration::from_secs(30)));
            }
            Ok(RawProviderResult {
                summary: self.summary.into(),
                ..Default::default()
            })
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    fn payload() -> ImagePayload {
        ImagePayload {
            data: String::new(),
            width: 1,
            height: 1,
            source: PathBuf::from("x.jpg"),
        }
    }

    fn ctx() -> AnalysisContext {
        AnalysisContext {
            project_type: "residential".into(),
            jurisdiction: "Honolulu".into(),
            session_id: "s".into(),
            frame_number: 1,
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn primary_success_skips_secondary() {
        let primary = ScriptedProvider::new("p", 2, "from primary");
        let secondary = ScriptedProvider::new("s", 0, "from secondary");
        let chain = FallbackChain::new(primary.clone(), secondary.clone(), fast_retry());

        let outcome = chain.run(&payload(), &ctx()).await;
        assert_eq!(outcome.provider, Provenance::Primary);
        assert_eq!(outcome.raw.summary, "from primary");
        assert_eq!(primary.calls(), 3);
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn exhausted_primary_falls_back_once() {
        let primary = ScriptedProvider::new("p", u32::MAX, "");
        let secondary = ScriptedProvider::new("s", 0, "from secondary");
        let chain = FallbackChain::new(primary.clone(), secondary.clone(), fast_retry());

        let outcome = chain.run(&payload(), &ctx()).await;
        assert_eq!(outcome.provider, Provenance::Secondary);
        assert_eq!(outcome.raw.summary, "from secondary");
        assert_eq!(primary.calls(), 4);
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn both_failing_yields_unavailable_sentinel() {
        let primary = ScriptedProvider::new("p", u32::MAX, "");
        let secondary = ScriptedProvider::new("s", u32::MAX, "");
        let chain = FallbackChain::new(primary.clone(), secondary.clone(), fast_retry());

        let outcome = chain.run(&payload(), &ctx()).await;
        assert_eq!(outcome.provider, Provenance::Degraded);
        assert!(outcome.raw.is_unavailable());
        assert!(outcome.raw.error.as_deref().unwrap().contains("timed out"));
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn auth_failure_skips_retries_but_still_falls_back() {
        let primary = ScriptedProvider::auth_failing("p");
        let secondary = ScriptedProvider::new("s", 0, "ok");
        let chain = FallbackChain::new(primary.clone(), secondary.clone(), fast_retry());

        let outcome = chain.run(&payload(), &ctx()).await;
        assert_eq!(outcome.provider, Provenance::Secondary);
        assert_eq!(primary.calls(), 1);
    }
}
