//! Pipeline stage implementations.
//!
//! Each agent is a [`Stage`] that reads the workflow state, calls its
//! collaborators, and returns a patch. Per-repository work runs sequentially;
//! a failing repository is recorded under its own error key and the rest
//! continue.

mod analysis;
mod discovery;
mod gitops;
mod parse;
mod planner;
mod quality;
mod refactor;
mod writer;

pub use analysis::RepoAnalyzer;
pub use discovery::RepoDiscovery;
pub use gitops::{GitOps, GitOpsOptions};
pub use parse::{extract_sections, parse_json, strip_code_fence};
pub use planner::DocsPlanner;
pub use quality::QualityAnalyzer;
pub use refactor::RefactorAdvisor;
pub use writer::DocsWriter;

use std::sync::Arc;

use crate::ai::{CompletionRequest, LlmClient, LlmResult, DEFAULT_TEMPERATURE};
use crate::integrations::{CommitSink, ListReposOptions, RepoSource};
use crate::workflow::{Stage, StageRegistry, WorkflowState};

/// External services the stages depend on.
#[derive(Clone)]
pub struct Collaborators {
    pub llm: Arc<dyn LlmClient>,
    pub repos: Arc<dyn RepoSource>,
    pub commits: Arc<dyn CommitSink>,
}

/// Options shared by the whole pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub discovery: ListReposOptions,
    pub temperature: f32,
    pub git: GitOpsOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            discovery: ListReposOptions::default(),
            temperature: DEFAULT_TEMPERATURE,
            git: GitOpsOptions::default(),
        }
    }
}

/// Build the default registry holding all seven stages.
pub fn pipeline(collaborators: &Collaborators, options: &PipelineOptions) -> StageRegistry {
    let prompter = Prompter::new(collaborators.llm.clone(), options.temperature);
    let stages: Vec<Arc<dyn Stage>> = vec![
        Arc::new(RepoDiscovery::new(collaborators.repos.clone(), options.discovery.clone())),
        Arc::new(RepoAnalyzer::new(prompter.clone(), collaborators.repos.clone())),
        Arc::new(QualityAnalyzer::new(prompter.clone())),
        Arc::new(RefactorAdvisor::new(prompter.clone())),
        Arc::new(DocsPlanner::new(prompter.clone())),
        Arc::new(DocsWriter::new(prompter)),
        Arc::new(GitOps::new(collaborators.commits.clone(), options.git.clone())),
    ];
    StageRegistry::pipeline(stages)
}

/// Sends stage prompts using the model and language chosen for the run.
#[derive(Clone)]
pub struct Prompter {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
}

impl Prompter {
    pub fn new(llm: Arc<dyn LlmClient>, temperature: f32) -> Self {
        Self { llm, temperature }
    }

    /// Ask for a JSON object response.
    pub async fn json(
        &self,
        state: &WorkflowState,
        system: &str,
        prompt: String,
    ) -> LlmResult<String> {
        self.send(state, system, prompt, true).await
    }

    /// Ask for free-form text.
    pub async fn text(
        &self,
        state: &WorkflowState,
        system: &str,
        prompt: String,
    ) -> LlmResult<String> {
        self.send(state, system, prompt, false).await
    }

    async fn send(
        &self,
        state: &WorkflowState,
        system: &str,
        prompt: String,
        json: bool,
    ) -> LlmResult<String> {
        let system = format!(
            "{system}\n\nWrite all prose in the language with code \"{}\".",
            state.language
        );
        let mut request = CompletionRequest::new(prompt)
            .with_system(system)
            .with_model(state.model.clone())
            .with_temperature(self.temperature);
        if json {
            request = request.json();
        }
        self.llm.complete(&request).await
    }
}
