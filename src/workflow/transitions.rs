//! Stage transition table.

use std::fmt;
use std::sync::Arc;

use super::state::{StepId, WorkflowState};

/// Extra condition an edge requires before it can be taken.
pub type Guard = Arc<dyn Fn(&WorkflowState) -> bool + Send + Sync>;

/// A directed edge between two stages.
#[derive(Clone)]
pub struct TransitionEdge {
    pub from: StepId,
    pub to: StepId,
    guard: Option<Guard>,
}

impl TransitionEdge {
    pub fn new(from: StepId, to: StepId) -> Self {
        Self { from, to, guard: None }
    }

    /// Edge that is only taken while `guard` holds.
    pub fn guarded<F>(from: StepId, to: StepId, guard: F) -> Self
    where
        F: Fn(&WorkflowState) -> bool + Send + Sync + 'static,
    {
        Self { from, to, guard: Some(Arc::new(guard)) }
    }

    /// Check whether this edge can be taken from `state`.
    pub fn allows(&self, state: &WorkflowState) -> bool {
        self.guard.as_ref().map_or(true, |guard| guard(state))
    }
}

impl fmt::Debug for TransitionEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionEdge")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}

/// Ordered list of allowed stage transitions.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    edges: Vec<TransitionEdge>,
}

impl TransitionTable {
    pub fn new(edges: Vec<TransitionEdge>) -> Self {
        Self { edges }
    }

    /// The fixed pipeline: each stage leads to the next, and the last one to
    /// [`StepId::Complete`].
    pub fn linear() -> Self {
        let edges = StepId::PIPELINE
            .iter()
            .zip(StepId::PIPELINE.iter().skip(1).chain(std::iter::once(&StepId::Complete)))
            .map(|(from, to)| TransitionEdge::new(*from, *to))
            .collect();
        Self { edges }
    }

    /// Next stage after `from`, if any edge allows it.
    ///
    /// The first matching edge whose guard holds wins.
    pub fn next(&self, from: StepId, state: &WorkflowState) -> Option<StepId> {
        self.edges.iter().find(|edge| edge.from == from && edge.allows(state)).map(|edge| edge.to)
    }

    /// Stage the table starts from.
    pub fn initial(&self) -> Option<StepId> {
        self.edges.first().map(|edge| edge.from)
    }

    pub fn edges(&self) -> &[TransitionEdge] {
        &self.edges
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::linear()
    }
}
