//! Error keys and fatal workflow conditions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::state::{RepoKey, StepId};

/// Key of an entry in [`WorkflowState::errors`](super::WorkflowState::errors).
///
/// Renders as `<step>` for whole-stage errors and `<step>:<owner>/<name>` for
/// errors scoped to one repository.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ErrorKey {
    pub step: StepId,
    pub repo: Option<RepoKey>,
}

impl ErrorKey {
    /// Key for an error affecting a whole stage.
    pub fn stage(step: StepId) -> Self {
        Self { step, repo: None }
    }

    /// Key for an error affecting one repository within a stage.
    pub fn repo(step: StepId, repo: RepoKey) -> Self {
        Self { step, repo: Some(repo) }
    }

    pub fn is_stage_wide(&self) -> bool {
        self.repo.is_none()
    }
}

impl fmt::Display for ErrorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repo {
            Some(repo) => write!(f, "{}:{}", self.step, repo),
            None => write!(f, "{}", self.step),
        }
    }
}

impl FromStr for ErrorKey {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((step, repo)) => {
                let repo = RepoKey::parse(repo)
                    .ok_or_else(|| WorkflowError::InvalidErrorKey(s.to_string()))?;
                Ok(Self::repo(step.parse()?, repo))
            }
            None => Ok(Self::stage(s.parse()?)),
        }
    }
}

impl Serialize for ErrorKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ErrorKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Conditions that end a workflow run early.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0} is not ready: no repositories selected")]
    FirstStageNotReady(StepId),

    #[error("stage failed: {0}")]
    StageFailed(String),

    #[error("transition from {0} loops back onto itself")]
    StuckTransition(StepId),

    #[error("no stage registered for {0}")]
    UnknownStage(StepId),

    #[error("stopped after reaching the iteration limit of {0}")]
    IterationLimit(usize),

    #[error("unknown workflow step: {0}")]
    UnknownStep(String),

    #[error("invalid error key: {0}")]
    InvalidErrorKey(String),
}
