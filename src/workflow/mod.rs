//! Documentation workflow engine.
//!
//! A fixed chain of stages turns selected repositories into documentation:
//!
//! ```text
//! repo_discovery -> repo_analysis -> quality_analyzer -> refactor_proposal
//!     -> docs_planner -> docs_writer -> git_ops -> complete
//! ```
//!
//! - [`WorkflowState`] - the record every stage reads and patches
//! - [`StageRegistry`] - stage executors and their readiness predicates
//! - [`TransitionTable`] - allowed stage-to-stage edges
//! - [`WorkflowManager`] - runs ready stages and merges their output

mod error;
mod manager;
mod registry;
mod state;
mod transitions;

pub use error::{ErrorKey, WorkflowError};
pub use manager::{WorkflowManager, DEFAULT_MAX_ITERATIONS};
pub use registry::{
    default_readiness, ProgressReporter, Readiness, Stage, StageContext, StageEntry,
    StageRegistry,
};
pub use state::{
    DocsPlan, Effort, PlannedSection, Progress, QualityFinding, QualityReport, RefactorProposal,
    RepoAnalysis, RepoKey, RepoRef, Severity, StatePatch, StepId, WorkflowState, DEFAULT_LANGUAGE,
    DEFAULT_MODEL,
};
pub use transitions::{Guard, TransitionEdge, TransitionTable};
