//! Shared workflow state.
//!
//! A single [`WorkflowState`] is threaded through every stage. Stages never
//! mutate it directly; they return a [`StatePatch`] which the manager merges.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{ErrorKey, WorkflowError};
use crate::docs::{DocumentSet, OutputFormat, SectionType};
use crate::integrations::github::CommitInfo;

/// Default model identifier when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default natural language for generated prose.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Identifier of a pipeline stage.
///
/// Variants are ordered by their position in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StepId {
    #[serde(rename = "repo_discovery")]
    Discovery,
    #[serde(rename = "repo_analysis")]
    Analysis,
    #[serde(rename = "quality_analyzer")]
    Quality,
    #[serde(rename = "refactor_proposal")]
    Refactor,
    #[serde(rename = "docs_planner")]
    Planner,
    #[serde(rename = "docs_writer")]
    Writer,
    #[serde(rename = "git_ops")]
    GitOps,
    /// Terminal sentinel; never executed.
    #[serde(rename = "complete")]
    Complete,
}

impl StepId {
    /// The executable stages in pipeline order.
    pub const PIPELINE: [Self; 7] = [
        Self::Discovery,
        Self::Analysis,
        Self::Quality,
        Self::Refactor,
        Self::Planner,
        Self::Writer,
        Self::GitOps,
    ];

    /// Stable identifier used in error keys and serialized state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovery => "repo_discovery",
            Self::Analysis => "repo_analysis",
            Self::Quality => "quality_analyzer",
            Self::Refactor => "refactor_proposal",
            Self::Planner => "docs_planner",
            Self::Writer => "docs_writer",
            Self::GitOps => "git_ops",
            Self::Complete => "complete",
        }
    }

    /// Human-readable stage name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Discovery => "Repository Discovery",
            Self::Analysis => "Repository Analysis",
            Self::Quality => "Quality Analyzer",
            Self::Refactor => "Refactor Proposals",
            Self::Planner => "Documentation Planner",
            Self::Writer => "Documentation Writer",
            Self::GitOps => "Git Operations",
            Self::Complete => "Complete",
        }
    }

    /// Check if this is the terminal sentinel.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepId {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::PIPELINE
            .into_iter()
            .chain(std::iter::once(Self::Complete))
            .find(|step| step.as_str() == s)
            .ok_or_else(|| WorkflowError::UnknownStep(s.to_string()))
    }
}

/// `owner/name` key joining per-repository data across stage outputs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoKey(String);

impl RepoKey {
    /// Build a key from owner and repository name.
    pub fn new(owner: &str, name: &str) -> Self {
        Self(format!("{owner}/{name}"))
    }

    /// Parse an `owner/name` string.
    ///
    /// Both parts are used as directory names, so `.` and `..` are rejected.
    pub fn parse(s: &str) -> Option<Self> {
        let (owner, name) = s.trim().split_once('/')?;
        let valid = |part: &str| !part.is_empty() && part != "." && part != "..";
        if !valid(owner) || !valid(name) || name.contains('/') {
            return None;
        }
        Some(Self::new(owner, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn owner(&self) -> &str {
        self.0.split_once('/').map_or("", |(owner, _)| owner)
    }

    pub fn name(&self) -> &str {
        self.0.split_once('/').map_or("", |(_, name)| name)
    }
}

impl fmt::Display for RepoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    /// Numeric repository id (0 when not yet resolved)
    pub id: u64,
    /// Repository name
    pub name: String,
    /// `owner/name`
    pub full_name: String,
    /// Owner login
    pub owner: String,
    /// Whether the repository is private
    pub private: bool,
    /// Canonical web URL
    pub html_url: String,
    /// Default branch
    pub default_branch: String,
}

impl RepoRef {
    /// Build an unresolved reference from an `owner/name` string.
    pub fn from_full_name(full_name: &str) -> Option<Self> {
        let key = RepoKey::parse(full_name)?;
        Some(Self {
            id: 0,
            name: key.name().to_string(),
            full_name: key.as_str().to_string(),
            owner: key.owner().to_string(),
            private: false,
            html_url: format!("https://github.com/{}", key),
            default_branch: "main".to_string(),
        })
    }

    /// Join key for this repository.
    pub fn key(&self) -> RepoKey {
        RepoKey::new(&self.owner, &self.name)
    }
}

/// Structure and stack analysis for one repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoAnalysis {
    /// Short description of what the repository does
    pub summary: String,
    /// Languages, most prominent first
    pub languages: Vec<String>,
    /// Frameworks and notable libraries
    pub frameworks: Vec<String>,
    /// Entry point files
    pub entry_points: Vec<String>,
    /// Files worth reading first
    pub key_files: Vec<String>,
    /// Whether the repository exposes an HTTP API
    pub has_http_api: bool,
}

/// Finding severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
}

/// A single quality finding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityFinding {
    pub severity: Severity,
    pub area: String,
    pub message: String,
}

/// Code quality assessment for one repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityReport {
    /// Overall score, 0-100
    pub score: u8,
    pub findings: Vec<QualityFinding>,
}

impl QualityReport {
    /// Report used when the assessment could not be parsed.
    pub fn neutral() -> Self {
        Self { score: 50, findings: Vec::new() }
    }
}

impl Default for QualityReport {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Estimated effort of a refactor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effort {
    Small,
    #[default]
    Medium,
    Large,
}

/// A proposed refactor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefactorProposal {
    pub title: String,
    pub rationale: String,
    pub files: Vec<String>,
    pub effort: Effort,
}

/// A section the planner decided to write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedSection {
    pub section: SectionType,
    pub title: String,
    #[serde(default)]
    pub outline: Vec<String>,
}

/// Documentation plan for one repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocsPlan {
    #[serde(default)]
    pub sections: Vec<PlannedSection>,
}

/// Progress of the running stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_repo: Option<RepoKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
}

/// The record threaded through every stage of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowState {
    // Inputs
    pub selected_repos: Vec<RepoRef>,
    pub formats: BTreeSet<OutputFormat>,
    pub sections: BTreeSet<SectionType>,
    pub language: String,
    pub model: String,

    // Stage outputs
    pub discovered_repos: Vec<RepoRef>,
    pub analyses: BTreeMap<RepoKey, RepoAnalysis>,
    pub quality_reports: BTreeMap<RepoKey, QualityReport>,
    pub refactor_proposals: BTreeMap<RepoKey, Vec<RefactorProposal>>,
    pub plans: BTreeMap<RepoKey, DocsPlan>,
    pub generated_docs: BTreeMap<RepoKey, BTreeMap<OutputFormat, String>>,
    pub documentation: BTreeMap<RepoKey, DocumentSet>,
    pub commits: BTreeMap<RepoKey, Vec<CommitInfo>>,

    // Status
    pub current_step: Option<StepId>,
    pub completed_steps: BTreeSet<StepId>,
    pub errors: BTreeMap<ErrorKey, String>,
    pub progress: Option<Progress>,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self {
            selected_repos: Vec::new(),
            formats: BTreeSet::from([OutputFormat::Markdown]),
            sections: BTreeSet::from([
                SectionType::Overview,
                SectionType::Installation,
                SectionType::Usage,
            ]),
            language: DEFAULT_LANGUAGE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            discovered_repos: Vec::new(),
            analyses: BTreeMap::new(),
            quality_reports: BTreeMap::new(),
            refactor_proposals: BTreeMap::new(),
            plans: BTreeMap::new(),
            generated_docs: BTreeMap::new(),
            documentation: BTreeMap::new(),
            commits: BTreeMap::new(),
            current_step: None,
            completed_steps: BTreeSet::new(),
            errors: BTreeMap::new(),
            progress: None,
        }
    }
}

impl WorkflowState {
    /// Create a state for the given repositories with default options.
    pub fn new(selected_repos: Vec<RepoRef>) -> Self {
        Self { selected_repos, ..Default::default() }
    }

    pub fn with_formats(mut self, formats: impl IntoIterator<Item = OutputFormat>) -> Self {
        self.formats = formats.into_iter().collect();
        self
    }

    pub fn with_sections(mut self, sections: impl IntoIterator<Item = SectionType>) -> Self {
        self.sections = sections.into_iter().collect();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Check if a stage has completed.
    pub fn is_complete(&self, step: StepId) -> bool {
        self.completed_steps.contains(&step)
    }

    /// Check if any error has been recorded.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Whole-stage error for a step, if any.
    pub fn stage_error(&self, step: StepId) -> Option<&str> {
        self.errors.get(&ErrorKey::stage(step)).map(String::as_str)
    }

    /// Pipeline steps that recorded a whole-stage error and never completed.
    ///
    /// A completed step with a whole-stage error ran in a degraded mode.
    pub fn failed_steps(&self) -> impl Iterator<Item = StepId> + '_ {
        StepId::PIPELINE
            .into_iter()
            .filter(|step| self.stage_error(*step).is_some() && !self.is_complete(*step))
    }

    /// All errors recorded by a step, whole-stage and per-repository.
    pub fn errors_for(&self, step: StepId) -> impl Iterator<Item = (&ErrorKey, &str)> {
        self.errors.iter().filter(move |(k, _)| k.step == step).map(|(k, v)| (k, v.as_str()))
    }

    /// Discovered repositories that have an entry in `map`, in discovery order.
    pub fn discovered_with<'a, V>(
        &'a self,
        map: &'a BTreeMap<RepoKey, V>,
    ) -> impl Iterator<Item = (&'a RepoRef, &'a V)> + 'a {
        self.discovered_repos.iter().filter_map(move |repo| map.get(&repo.key()).map(|v| (repo, v)))
    }

    /// Merge a partial state into this one.
    ///
    /// Every present field replaces the current value, except
    /// `completed_steps` (set union) and `errors` (map union, later value
    /// wins). Returns whether the patch carried a progress update.
    pub fn merge(&mut self, patch: StatePatch) -> bool {
        let StatePatch {
            selected_repos,
            formats,
            sections,
            language,
            model,
            discovered_repos,
            analyses,
            quality_reports,
            refactor_proposals,
            plans,
            generated_docs,
            documentation,
            commits,
            current_step,
            completed_steps,
            errors,
            progress,
        } = patch;

        if let Some(value) = selected_repos {
            self.selected_repos = value;
        }
        if let Some(value) = formats {
            self.formats = value;
        }
        if let Some(value) = sections {
            self.sections = value;
        }
        if let Some(value) = language {
            self.language = value;
        }
        if let Some(value) = model {
            self.model = value;
        }
        if let Some(value) = discovered_repos {
            self.discovered_repos = value;
        }
        if let Some(value) = analyses {
            self.analyses = value;
        }
        if let Some(value) = quality_reports {
            self.quality_reports = value;
        }
        if let Some(value) = refactor_proposals {
            self.refactor_proposals = value;
        }
        if let Some(value) = plans {
            self.plans = value;
        }
        if let Some(value) = generated_docs {
            self.generated_docs = value;
        }
        if let Some(value) = documentation {
            self.documentation = value;
        }
        if let Some(value) = commits {
            self.commits = value;
        }

        if current_step.is_some() {
            self.current_step = current_step;
        }

        self.completed_steps.extend(completed_steps);
        self.errors.extend(errors);

        let has_progress = progress.is_some();
        if has_progress {
            self.progress = progress;
        }
        has_progress
    }
}

/// Partial update to a [`WorkflowState`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    pub selected_repos: Option<Vec<RepoRef>>,
    pub formats: Option<BTreeSet<OutputFormat>>,
    pub sections: Option<BTreeSet<SectionType>>,
    pub language: Option<String>,
    pub model: Option<String>,
    pub discovered_repos: Option<Vec<RepoRef>>,
    pub analyses: Option<BTreeMap<RepoKey, RepoAnalysis>>,
    pub quality_reports: Option<BTreeMap<RepoKey, QualityReport>>,
    pub refactor_proposals: Option<BTreeMap<RepoKey, Vec<RefactorProposal>>>,
    pub plans: Option<BTreeMap<RepoKey, DocsPlan>>,
    pub generated_docs: Option<BTreeMap<RepoKey, BTreeMap<OutputFormat, String>>>,
    pub documentation: Option<BTreeMap<RepoKey, DocumentSet>>,
    pub commits: Option<BTreeMap<RepoKey, Vec<CommitInfo>>>,
    pub current_step: Option<StepId>,
    pub completed_steps: BTreeSet<StepId>,
    pub errors: BTreeMap<ErrorKey, String>,
    pub progress: Option<Progress>,
}

impl StatePatch {
    /// Patch that marks `step` as the current step.
    pub fn for_step(step: StepId) -> Self {
        Self { current_step: Some(step), ..Default::default() }
    }

    /// Add `step` to the completed set.
    pub fn completed(mut self, step: StepId) -> Self {
        self.completed_steps.insert(step);
        self
    }

    /// Record an error.
    pub fn error(mut self, key: ErrorKey, message: impl Into<String>) -> Self {
        self.errors.insert(key, message.into());
        self
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Replace the selected repositories.
    pub fn selected_repos(mut self, repos: Vec<RepoRef>) -> Self {
        self.selected_repos = Some(repos);
        self
    }
}
