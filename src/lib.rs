pub mod ai;
pub mod analysis;
pub mod capture;
pub mod fallback;
pub mod normalize;
pub mod orchestrator;
pub mod retry;
pub mod settings;

pub use ai::{AnalysisContext, ProjectContext};
pub use analysis::{Analysis, Category, Provenance, Severity, Violation};
pub use orchestrator::{InspectionOrchestrator, PlanAnalysisError};
pub use settings::Settings;
