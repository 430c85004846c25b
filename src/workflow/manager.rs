//! Workflow manager.
//!
//! Walks the transition table, running each stage whose readiness predicate
//! holds and merging its result into the shared state.

use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, error, info, warn};

use super::error::{ErrorKey, WorkflowError};
use super::registry::{ProgressReporter, StageContext, StageRegistry};
use super::state::{Progress, StatePatch, StepId, WorkflowState};
use super::transitions::TransitionTable;

/// Iteration cap for [`WorkflowManager::run`].
pub const DEFAULT_MAX_ITERATIONS: usize = 20;

/// Result of attempting a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    Executed,
    Skipped,
    Failed,
    Missing,
}

/// Drives a [`WorkflowState`] through the registered stages.
pub struct WorkflowManager {
    state: WorkflowState,
    registry: StageRegistry,
    transitions: TransitionTable,
    initial_step: StepId,
    max_iterations: usize,
    state_tx: Option<UnboundedSender<WorkflowState>>,
    progress_tx: Option<UnboundedSender<Progress>>,
}

impl WorkflowManager {
    /// Create a manager using the linear transition table.
    pub fn new(initial_state: WorkflowState, registry: StageRegistry) -> Self {
        Self {
            state: initial_state,
            registry,
            transitions: TransitionTable::linear(),
            initial_step: StepId::Discovery,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            state_tx: None,
            progress_tx: None,
        }
    }

    /// Use a custom transition table. Its first edge defines the first stage.
    pub fn with_transitions(mut self, transitions: TransitionTable) -> Self {
        if let Some(initial) = transitions.initial() {
            self.initial_step = initial;
        }
        self.transitions = transitions;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Receive the full state after every merge.
    pub fn on_state_update(mut self, tx: UnboundedSender<WorkflowState>) -> Self {
        self.state_tx = Some(tx);
        self
    }

    /// Receive progress updates.
    pub fn on_progress(mut self, tx: UnboundedSender<Progress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> WorkflowState {
        self.state.clone()
    }

    pub fn into_state(self) -> WorkflowState {
        self.state
    }

    /// Run the pipeline to completion or until a fatal condition.
    ///
    /// Never fails: fatal conditions are recorded in `errors`. The returned
    /// state always has `current_step == Complete`.
    pub async fn run(&mut self) -> WorkflowState {
        let mut current = self.initial_step;
        let mut iterations = 0;

        info!(
            repos = self.state.selected_repos.len(),
            max_iterations = self.max_iterations,
            "Starting workflow"
        );

        while !current.is_terminal() {
            if iterations >= self.max_iterations {
                self.record_fatal(current, &WorkflowError::IterationLimit(self.max_iterations));
                break;
            }
            iterations += 1;

            match self.execute(current).await {
                StepOutcome::Executed => {}
                StepOutcome::Failed => break,
                StepOutcome::Missing => {
                    self.record_fatal(current, &WorkflowError::UnknownStage(current));
                    break;
                }
                StepOutcome::Skipped if current == self.initial_step => {
                    self.record_fatal(current, &WorkflowError::FirstStageNotReady(current));
                    break;
                }
                StepOutcome::Skipped => {
                    warn!(step = %current, "Stage not ready, skipping");
                }
            }

            match self.transitions.next(current, &self.state) {
                Some(next) if next == current => {
                    self.record_fatal(current, &WorkflowError::StuckTransition(current));
                    break;
                }
                Some(next) => {
                    debug!(from = %current, to = %next, "Transition");
                    current = next;
                }
                None => {
                    debug!(step = %current, "No outgoing transition, workflow ended");
                    break;
                }
            }
        }

        self.apply(StatePatch::for_step(StepId::Complete).completed(StepId::Complete));

        info!(
            completed = self.state.completed_steps.len(),
            errors = self.state.errors.len(),
            "Workflow finished"
        );

        self.snapshot()
    }

    /// Execute a single stage if it is ready.
    ///
    /// Returns whether the stage ran to completion. A failing stage has its
    /// error recorded and returns false.
    pub async fn execute_step(&mut self, step: StepId) -> bool {
        self.execute(step).await == StepOutcome::Executed
    }

    /// Clear run status and apply new inputs.
    ///
    /// Stage outputs from a previous run are kept until the stages that
    /// produce them run again.
    pub fn reset(&mut self, patch: StatePatch) {
        self.state.current_step = None;
        self.state.completed_steps.clear();
        self.state.errors.clear();
        self.state.progress = None;
        self.apply(patch);
    }

    async fn execute(&mut self, step: StepId) -> StepOutcome {
        let Some(entry) = self.registry.get(step) else {
            return StepOutcome::Missing;
        };

        if !entry.is_ready(&self.state) {
            debug!(step = %step, "Readiness check failed");
            return StepOutcome::Skipped;
        }

        let stage = entry.stage.clone();
        let name = entry.name.clone();
        info!(step = %step, name = %name, "Running stage");

        // The stage reads a snapshot so reported progress can be merged
        // into the live state while it runs.
        let snapshot = self.state.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = StageContext::new(step, ProgressReporter::new(Some(tx)));
        let result = {
            let mut run = stage.execute(&snapshot, &ctx);
            loop {
                tokio::select! {
                    result = &mut run => break result,
                    Some(progress) = rx.recv() => self.apply_progress(progress),
                }
            }
        };
        while let Ok(progress) = rx.try_recv() {
            self.apply_progress(progress);
        }

        match result {
            Ok(patch) => {
                self.apply(patch);
                info!(step = %step, "Stage finished");
                StepOutcome::Executed
            }
            Err(err) => {
                self.record_fatal(step, &WorkflowError::StageFailed(format!("{err:#}")));
                StepOutcome::Failed
            }
        }
    }

    fn record_fatal(&mut self, step: StepId, err: &WorkflowError) {
        error!(step = %step, error = %err, "Workflow aborted");
        self.apply(StatePatch::default().error(ErrorKey::stage(step), err.to_string()));
    }

    fn apply_progress(&mut self, progress: Progress) {
        self.apply(StatePatch::default().with_progress(progress));
    }

    /// Merge a patch and notify observers.
    fn apply(&mut self, patch: StatePatch) {
        let has_progress = self.state.merge(patch);

        if let Some(tx) = &self.state_tx {
            let _ = tx.send(self.state.clone());
        }
        if has_progress {
            if let (Some(tx), Some(progress)) = (&self.progress_tx, &self.state.progress) {
                let _ = tx.send(progress.clone());
            }
        }
    }
}
