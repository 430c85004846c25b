//! Stage registry and readiness predicates.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use super::state::{Progress, RepoKey, StatePatch, StepId, WorkflowState};

/// Predicate deciding whether a stage may run against the current state.
pub type Readiness = Arc<dyn Fn(&WorkflowState) -> bool + Send + Sync>;

/// One step of the documentation pipeline.
///
/// A stage reads the state and returns the changes it wants applied. The
/// manager merges the returned patch; stages never mutate state in place.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Identifier of this stage.
    fn id(&self) -> StepId;

    /// Run the stage.
    ///
    /// Per-repository failures belong in the returned patch's `errors`.
    /// Returning `Err` aborts the whole run.
    async fn execute(&self, state: &WorkflowState, ctx: &StageContext)
        -> anyhow::Result<StatePatch>;
}

/// Forwards intermediate progress to the manager, which merges it into state.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<UnboundedSender<Progress>>,
}

impl ProgressReporter {
    pub fn new(tx: Option<UnboundedSender<Progress>>) -> Self {
        Self { tx }
    }

    /// Send a progress update. A closed receiver is ignored.
    pub fn report(&self, progress: &Progress) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(progress.clone());
        }
    }
}

/// Per-execution context handed to a stage.
#[derive(Debug, Clone)]
pub struct StageContext {
    step: StepId,
    progress: ProgressReporter,
}

impl StageContext {
    pub fn new(step: StepId, progress: ProgressReporter) -> Self {
        Self { step, progress }
    }

    /// Context with no progress observer attached.
    pub fn detached(step: StepId) -> Self {
        Self::new(step, ProgressReporter::default())
    }

    /// Report progress through the current stage and return the update.
    pub fn progress(&self, current: usize, total: usize, repo: Option<&RepoKey>) -> Progress {
        let progress = Progress {
            current,
            total,
            current_repo: repo.cloned(),
            current_step: Some(self.step.display_name().to_string()),
        };
        tracing::debug!(step = %self.step, current, total, "Stage progress");
        self.progress.report(&progress);
        progress
    }
}

/// A registered stage.
pub struct StageEntry {
    pub id: StepId,
    pub name: String,
    pub stage: Arc<dyn Stage>,
    ready: Readiness,
}

impl StageEntry {
    /// Evaluate the readiness predicate.
    pub fn is_ready(&self, state: &WorkflowState) -> bool {
        (self.ready)(state)
    }
}

impl fmt::Debug for StageEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageEntry").field("id", &self.id).field("name", &self.name).finish()
    }
}

/// Maps stage identifiers to their executors and readiness predicates.
#[derive(Debug, Default)]
pub struct StageRegistry {
    entries: BTreeMap<StepId, StageEntry>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every stage under its own id with its default readiness predicate.
    pub fn pipeline(stages: impl IntoIterator<Item = Arc<dyn Stage>>) -> Self {
        stages.into_iter().fold(Self::new(), |registry, stage| {
            let id = stage.id();
            registry.register_arc(id, id.display_name(), stage, default_readiness(id))
        })
    }

    /// Register a stage with a custom readiness predicate.
    pub fn register<S, F>(self, id: StepId, name: impl Into<String>, stage: S, ready: F) -> Self
    where
        S: Stage + 'static,
        F: Fn(&WorkflowState) -> bool + Send + Sync + 'static,
    {
        self.register_arc(id, name, Arc::new(stage), Arc::new(ready))
    }

    /// Register an already shared stage.
    pub fn register_arc(
        mut self,
        id: StepId,
        name: impl Into<String>,
        stage: Arc<dyn Stage>,
        ready: Readiness,
    ) -> Self {
        self.entries.insert(id, StageEntry { id, name: name.into(), stage, ready });
        self
    }

    pub fn get(&self, id: StepId) -> Option<&StageEntry> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: StepId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered stage ids in pipeline order.
    pub fn ids(&self) -> impl Iterator<Item = StepId> + '_ {
        self.entries.keys().copied()
    }
}

/// Readiness predicate for a stage in the default pipeline.
///
/// The first stage only needs selected repositories. Every later stage needs
/// its predecessor completed, itself not yet completed, and a non-empty input
/// collection.
pub fn default_readiness(id: StepId) -> Readiness {
    match id {
        StepId::Discovery => Arc::new(|state: &WorkflowState| !state.selected_repos.is_empty()),
        StepId::Analysis => after(StepId::Discovery, id, |s| !s.discovered_repos.is_empty()),
        StepId::Quality => after(StepId::Analysis, id, |s| !s.analyses.is_empty()),
        StepId::Refactor => after(StepId::Quality, id, |s| !s.quality_reports.is_empty()),
        StepId::Planner => after(StepId::Refactor, id, |s| !s.analyses.is_empty()),
        StepId::Writer => after(StepId::Planner, id, |s| !s.plans.is_empty()),
        StepId::GitOps => after(StepId::Writer, id, |s| !s.documentation.is_empty()),
        StepId::Complete => Arc::new(|_: &WorkflowState| false),
    }
}

fn after(previous: StepId, this: StepId, has_input: fn(&WorkflowState) -> bool) -> Readiness {
    Arc::new(move |state: &WorkflowState| {
        state.is_complete(previous) && !state.is_complete(this) && has_input(state)
    })
}
