// orchestrator.rs - Orchestrates photo → encoder → provider chain → analysis.
//
// One orchestrator per inspection session. At most one analysis is in flight
// per instance; callers arriving while it runs join it and receive the same
// result instead of issuing another provider request.

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::path::{Path, PathBuf};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use crate::ai::inspection_tools::InspectionToolsClient;
use crate::ai::vision_chat::VisionChatClient;
use crate::ai::{AiError, AnalysisContext, ProjectContext};
use crate::analysis::{Analysis, Provenance};
use crate::capture::frame::{EncodeError, FrameEncoder};
use crate::fallback::FallbackChain;
use crate::normalize::normalize;
use crate::settings::Settings;

/// Narration when the photo itself could not be read.
pub const ENCODING_NARRATION: &str =
    "Could not read the captured photo. Please retake it and try again.";
/// Narration when the analysis task itself blew up.
const INTERNAL_NARRATION: &str = "Analysis failed unexpectedly. Please try again.";

/// Errors surfaced by plan analysis, which does not degrade.
#[derive(Debug, thiserror::Error)]
pub enum PlanAnalysisError {
    #[error(transparent)]
    Encoding(#[from] EncodeError),
    #[error(transparent)]
    Provider(#[from] AiError),
}

type SharedAnalysis = Shared<BoxFuture<'static, Analysis>>;

/// Session sequencing. `frame_number` is the last frame handed out.
struct SessionState {
    id: String,
    frame_number: u64,
}

impl SessionState {
    fn fresh() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            frame_number: 0,
        }
    }
}

/// Single-slot registry of the in-flight analysis.
#[derive(Default)]
struct InFlight {
    generation: u64,
    pending: Option<(u64, SharedAnalysis)>,
}

struct Inner {
    chain: FallbackChain,
    encoder: FrameEncoder,
    session: Mutex<SessionState>,
    last_analysis: RwLock<Option<Analysis>>,
    in_flight: Mutex<InFlight>,
}

/// Entry point for frame analysis.
pub struct InspectionOrchestrator {
    inner: Arc<Inner>,
}

impl InspectionOrchestrator {
    pub fn new(chain: FallbackChain, encoder: FrameEncoder) -> Self {
        Self {
            inner: Arc::new(Inner {
                chain,
                encoder,
                session: Mutex::new(SessionState::fresh()),
                last_analysis: RwLock::new(None),
                in_flight: Mutex::new(InFlight::default()),
            }),
        }
    }

    /// Wire the production providers from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let timeout = settings.request_timeout();
        let primary = InspectionToolsClient::new(&settings.tool_endpoint, &settings.tool_api_key)
            .with_timeout(timeout);
        let secondary = VisionChatClient::new(
            &settings.vision_endpoint,
            &settings.vision_api_key,
            &settings.vision_model,
        )
        .with_timeout(timeout);

        let chain = FallbackChain::new(
            Arc::new(primary),
            Arc::new(secondary),
            settings.retry_policy(),
        );
        log::info!(
            "Orchestrator configured (tools={}, vision model={})",
            settings.tool_endpoint,
            settings.vision_model
        );
        Self::new(chain, settings.frame_encoder())
    }

    /// Analyze a captured frame. Never fails: every failure becomes a
    /// degraded `Analysis`.
    pub async fn analyze(&self, image: impl AsRef<Path>, project: ProjectContext) -> Analysis {
        let shared = {
            let mut slot = lock(&self.inner.in_flight);
            let existing = slot
                .pending
                .as_ref()
                .map(|(generation, pending)| (*generation, pending.clone()));
            match existing {
                Some((generation, pending)) => {
                    log::debug!("Joining in-flight analysis #{}", generation);
                    pending
                }
                None => {
                    slot.generation += 1;
                    let generation = slot.generation;
                    let inner = Arc::clone(&self.inner);
                    let path = image.as_ref().to_path_buf();

                    // The task owns the run so it settles even if every
                    // caller stops polling.
                    let task = tokio::spawn(async move {
                        let _release = InFlightGuard {
                            inner: Arc::clone(&inner),
                            generation,
                        };
                        inner.run(path, project).await
                    });

                    let fut = async move {
                        task.await.unwrap_or_else(|e| {
                            log::error!("Analysis #{} did not complete: {}", generation, e);
                            Analysis::degraded(INTERNAL_NARRATION, e.to_string(), Utc::now())
                        })
                    }
                    .boxed()
                    .shared();

                    slot.pending = Some((generation, fut.clone()));
                    fut
                }
            }
        };
        shared.await
    }

    /// Single-shot plan/material photo analysis on the primary provider.
    /// No retry, no fallback; failures go straight back to the caller.
    pub async fn analyze_plan(
        &self,
        image: impl AsRef<Path>,
        project: ProjectContext,
    ) -> Result<Analysis, PlanAnalysisError> {
        let context = {
            let session = lock(&self.inner.session);
            AnalysisContext::new(project, session.id.clone(), session.frame_number)
        };
        let payload = self.inner.encoder.encode(image.as_ref())?;
        let raw = self
            .inner
            .chain
            .primary()
            .analyze_plan(&payload, &context)
            .await?;
        Ok(normalize(&raw, Provenance::Primary, &context))
    }

    /// Start a new session: fresh id, frame counter back to 0, last analysis
    /// cleared.
    ///
    /// An analysis still running for the old session is detached: its
    /// current callers get its result, later callers start a new one.
    pub fn reset_session(&self) {
        let new_id = {
            let mut session = lock(&self.inner.session);
            *session = SessionState::fresh();
            session.id.clone()
        };
        let detached = lock(&self.inner.in_flight).pending.take();
        drop(detached);
        *write_lock(&self.inner.last_analysis) = None;
        log::info!("Inspection session reset (session={})", new_id);
    }

    pub fn last_analysis(&self) -> Option<Analysis> {
        read_lock(&self.inner.last_analysis).clone()
    }

    pub fn clear_last_analysis(&self) {
        *write_lock(&self.inner.last_analysis) = None;
    }

    pub fn session_id(&self) -> String {
        lock(&self.inner.session).id.clone()
    }

    /// Last frame number handed out in this session (0 before the first).
    pub fn frame_number(&self) -> u64 {
        lock(&self.inner.session).frame_number
    }

    /// Whether an analysis for the current session is in flight.
    pub fn is_busy(&self) -> bool {
        lock(&self.inner.in_flight).pending.is_some()
    }
}

impl Inner {
    async fn run(&self, path: PathBuf, project: ProjectContext) -> Analysis {
        let context = self.next_context(project);

        let image = match self.encoder.encode(&path) {
            Ok(image) => image,
            Err(e) => {
                log::error!("Frame {} could not be encoded: {}", context.frame_number, e);
                return Analysis::degraded(ENCODING_NARRATION, e.to_string(), Utc::now());
            }
        };

        let outcome = self.chain.run(&image, &context).await;
        let analysis = normalize(&outcome.raw, outcome.provider, &context);

        if analysis.is_degraded() {
            log::warn!("Frame {} produced a degraded analysis", context.frame_number);
        } else {
            self.store_last(&context.session_id, &analysis);
        }
        analysis
    }

    fn next_context(&self, project: ProjectContext) -> AnalysisContext {
        let mut session = lock(&self.session);
        session.frame_number += 1;
        AnalysisContext::new(project, session.id.clone(), session.frame_number)
    }

    /// Results from a session that was reset mid-flight are dropped.
    fn store_last(&self, session_id: &str, analysis: &Analysis) {
        let session = lock(&self.session);
        if session.id != session_id {
            log::debug!("Discarding analysis from stale session {}", session_id);
            return;
        }
        *write_lock(&self.last_analysis) = Some(analysis.clone());
    }
}

/// Frees the in-flight slot when the analysis settles or is dropped.
struct InFlightGuard {
    inner: Arc<Inner>,
    generation: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let released = {
            let mut slot = lock(&self.inner.in_flight);
            let ours = slot
                .pending
                .as_ref()
                .is_some_and(|(generation, _)| *generation == self.generation);
            if ours {
                slot.pending.take()
            } else {
                None
            }
        };
        // Dropped outside the lock.
        drop(released);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_lock<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}
