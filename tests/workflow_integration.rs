//! End-to-end runs of the documentation pipeline against in-memory collaborators.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gitscribe::agents::{pipeline, Collaborators, GitOpsOptions, PipelineOptions};
use gitscribe::ai::{CompletionRequest, LlmClient, LlmError, LlmResult};
use gitscribe::docs::{OutputFormat, SectionType};
use gitscribe::integrations::{
    CommitInfo, CommitRequest, CommitSink, GitHubError, GitHubResult, ListReposOptions,
    RepoSource, TreeEntry,
};
use gitscribe::workflow::{
    default_readiness, ErrorKey, RepoKey, RepoRef, Stage, StageContext, StageRegistry,
    StatePatch, StepId, TransitionEdge, TransitionTable, WorkflowManager, WorkflowState,
};

/// LLM that answers every prompt with prose, forcing the deterministic fallbacks.
#[derive(Default)]
struct ProseLlm {
    calls: AtomicUsize,
}

#[async_trait]
impl LlmClient for ProseLlm {
    async fn complete(&self, _request: &CompletionRequest) -> LlmResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("Happy to help with that repository.".to_string())
    }

    fn name(&self) -> &str {
        "prose"
    }
}

/// LLM that fails every prompt mentioning one repository.
struct FailingFor {
    repo: &'static str,
}

#[async_trait]
impl LlmClient for FailingFor {
    async fn complete(&self, request: &CompletionRequest) -> LlmResult<String> {
        if request.prompt.contains(self.repo) {
            return Err(LlmError::Api { status: 503, message: "overloaded".to_string() });
        }
        Ok("{}".to_string())
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// In-memory GitHub: lists `repos` and serves a small tree for each.
struct MemoryGitHub {
    repos: Vec<RepoRef>,
    missing_trees: Vec<String>,
    listing_fails: bool,
    commits: Mutex<Vec<CommitRequest>>,
}

impl MemoryGitHub {
    fn new(names: &[&str]) -> Self {
        let repos = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let mut repo = RepoRef::from_full_name(name).unwrap();
                repo.id = i as u64 + 1;
                repo.default_branch = "trunk".to_string();
                repo
            })
            .collect();
        Self {
            repos,
            missing_trees: Vec::new(),
            listing_fails: false,
            commits: Mutex::new(Vec::new()),
        }
    }

    fn with_failing_listing(mut self) -> Self {
        self.listing_fails = true;
        self
    }

    fn without_tree(mut self, name: &str) -> Self {
        self.missing_trees.push(name.to_string());
        self
    }
}

#[async_trait]
impl RepoSource for MemoryGitHub {
    async fn list_repositories(
        &self,
        _options: &ListReposOptions,
    ) -> GitHubResult<Vec<RepoRef>> {
        if self.listing_fails {
            return Err(GitHubError::RateLimited);
        }
        Ok(self.repos.clone())
    }

    async fn tree(&self, repo: &RepoRef) -> GitHubResult<Vec<TreeEntry>> {
        if self.missing_trees.contains(&repo.full_name) {
            return Err(GitHubError::NotFound(repo.full_name.clone()));
        }
        Ok(vec![
            TreeEntry::blob("Cargo.toml"),
            TreeEntry::blob("src/main.rs"),
            TreeEntry::blob("src/lib.rs"),
        ])
    }

    async fn readme(&self, repo: &RepoRef) -> GitHubResult<Option<String>> {
        Ok(Some(format!("# {}\n\nA small service.\n", repo.name)))
    }
}

#[async_trait]
impl CommitSink for MemoryGitHub {
    async fn commit_file(&self, request: &CommitRequest) -> GitHubResult<CommitInfo> {
        let mut commits = self.commits.lock().unwrap();
        commits.push(request.clone());
        Ok(CommitInfo {
            path: request.path.clone(),
            sha: format!("{:040}", commits.len()),
            html_url: None,
        })
    }
}

fn refs(names: &[&str]) -> Vec<RepoRef> {
    names.iter().map(|name| RepoRef::from_full_name(name).unwrap()).collect()
}

fn manager_with(
    llm: Arc<dyn LlmClient>,
    github: Arc<MemoryGitHub>,
    options: &PipelineOptions,
    selected: &[&str],
) -> WorkflowManager {
    let collaborators = Collaborators { llm, repos: github.clone(), commits: github };
    let state = WorkflowState::new(refs(selected))
        .with_formats([OutputFormat::Markdown, OutputFormat::Html])
        .with_sections([SectionType::Overview, SectionType::Usage]);
    WorkflowManager::new(state, pipeline(&collaborators, options))
}

const THREE: [&str; 3] = ["octo/alpha", "octo/beta", "octo/gamma"];

#[tokio::test]
async fn test_full_run_completes_every_stage() {
    let llm = Arc::new(ProseLlm::default());
    let github = Arc::new(MemoryGitHub::new(&THREE));
    let mut manager = manager_with(llm.clone(), github, &PipelineOptions::default(), &THREE);

    let state = manager.run().await;

    let mut expected: BTreeSet<StepId> = StepId::PIPELINE.into_iter().collect();
    expected.insert(StepId::Complete);
    assert_eq!(state.completed_steps, expected);
    assert_eq!(state.current_step, Some(StepId::Complete));
    assert!(state.errors.is_empty(), "unexpected errors: {:?}", state.errors);

    assert_eq!(state.discovered_repos.len(), 3);
    assert_eq!(state.discovered_repos[1].default_branch, "trunk");
    for name in THREE {
        let key = RepoKey::parse(name).unwrap();
        assert_eq!(state.documentation[&key].sections.len(), 2);
        let docs = &state.generated_docs[&key];
        assert!(docs[&OutputFormat::Markdown].starts_with("# "));
        assert!(docs[&OutputFormat::Html].contains("<html"));
    }
    assert!(state.commits.values().all(Vec::is_empty));
    assert!(llm.calls.load(Ordering::SeqCst) > 0);
}

#[tokio::test]
async fn test_empty_selection_runs_nothing() {
    let llm = Arc::new(ProseLlm::default());
    let github = Arc::new(MemoryGitHub::new(&THREE));
    let mut manager = manager_with(llm.clone(), github, &PipelineOptions::default(), &[]);

    let state = manager.run().await;

    assert!(state.stage_error(StepId::Discovery).is_some());
    assert!(state.completed_steps.iter().all(|step| *step == StepId::Complete));
    assert!(state.analyses.is_empty());
    assert!(state.plans.is_empty());
    assert!(state.documentation.is_empty());
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_one_failing_repo_is_isolated() {
    let llm = Arc::new(ProseLlm::default());
    let github = Arc::new(MemoryGitHub::new(&THREE).without_tree("octo/beta"));
    let mut manager = manager_with(llm, github, &PipelineOptions::default(), &THREE);

    let state = manager.run().await;

    let beta = RepoKey::new("octo", "beta");
    let analysis_errors: Vec<_> = state.errors_for(StepId::Analysis).collect();
    assert_eq!(analysis_errors.len(), 1);
    assert_eq!(analysis_errors[0].0, &ErrorKey::repo(StepId::Analysis, beta.clone()));
    assert!(state.is_complete(StepId::Analysis));

    assert_eq!(state.analyses.len(), 2);
    assert!(!state.analyses.contains_key(&beta));
    assert!(state.documentation.contains_key(&RepoKey::new("octo", "alpha")));
    assert!(state.documentation.contains_key(&RepoKey::new("octo", "gamma")));
    assert!(state.is_complete(StepId::Complete));
}

#[tokio::test]
async fn test_llm_failure_for_one_repo_keeps_others() {
    let llm = Arc::new(FailingFor { repo: "octo/gamma" });
    let github = Arc::new(MemoryGitHub::new(&THREE));
    let mut manager = manager_with(llm, github, &PipelineOptions::default(), &THREE);

    let state = manager.run().await;

    let gamma = RepoKey::new("octo", "gamma");
    assert_eq!(state.errors.len(), 1);
    assert!(state.errors.contains_key(&ErrorKey::repo(StepId::Analysis, gamma.clone())));
    assert_eq!(state.analyses.len(), 2);
    assert!(!state.documentation.contains_key(&gamma));
    assert_eq!(state.documentation.len(), 2);
}

#[tokio::test]
async fn test_reset_starts_over() {
    let llm = Arc::new(ProseLlm::default());
    let github = Arc::new(MemoryGitHub::new(&THREE));
    let mut manager = manager_with(llm.clone(), github, &PipelineOptions::default(), &THREE);

    manager.run().await;
    let first_run_calls = llm.calls.load(Ordering::SeqCst);

    manager.reset(StatePatch::default().selected_repos(refs(&["octo/alpha"])));
    let state = manager.state();
    assert!(state.completed_steps.is_empty());
    assert!(state.errors.is_empty());
    assert!(state.current_step.is_none());
    assert_eq!(state.selected_repos.len(), 1);

    let state = manager.run().await;
    assert!(state.is_complete(StepId::GitOps));
    assert_eq!(state.discovered_repos.len(), 1);
    assert!(llm.calls.load(Ordering::SeqCst) > first_run_calls);
}

#[tokio::test]
async fn test_commits_generated_files() {
    let llm = Arc::new(ProseLlm::default());
    let github = Arc::new(MemoryGitHub::new(&["octo/alpha"]));
    let options = PipelineOptions {
        git: GitOpsOptions { enabled: true, ..Default::default() },
        ..Default::default()
    };
    let mut manager = manager_with(llm, github.clone(), &options, &["octo/alpha"]);

    let state = manager.run().await;

    // Two sections in two formats, plus one index per format.
    let commits = &state.commits[&RepoKey::new("octo", "alpha")];
    assert_eq!(commits.len(), 6);

    let requests = github.commits.lock().unwrap();
    let paths: BTreeSet<&str> = requests.iter().map(|r| r.path.as_str()).collect();
    assert!(paths.contains("docs/overview.md"));
    assert!(paths.contains("docs/usage.html"));
    assert!(paths.contains("docs/index.md"));
    assert!(requests.iter().all(|r| r.branch.as_deref() == Some("trunk")));
}

#[tokio::test]
async fn test_execute_step_twice_is_noop() {
    let llm = Arc::new(ProseLlm::default());
    let github = Arc::new(MemoryGitHub::new(&THREE));
    let mut manager = manager_with(llm, github, &PipelineOptions::default(), &THREE);

    assert!(manager.execute_step(StepId::Discovery).await);
    assert!(manager.execute_step(StepId::Analysis).await);
    let before = manager.snapshot();

    assert!(!manager.execute_step(StepId::Analysis).await);
    assert_eq!(manager.snapshot(), before);
}

/// Stage that records when it runs and marks itself complete.
struct Recording {
    id: StepId,
    log: Arc<Mutex<Vec<StepId>>>,
    fail: bool,
}

#[async_trait]
impl Stage for Recording {
    fn id(&self) -> StepId {
        self.id
    }

    async fn execute(
        &self,
        _state: &WorkflowState,
        _ctx: &StageContext,
    ) -> anyhow::Result<StatePatch> {
        self.log.lock().unwrap().push(self.id);
        if self.fail {
            anyhow::bail!("{} exploded", self.id);
        }
        Ok(StatePatch::for_step(self.id).completed(self.id))
    }
}

/// Every pipeline stage as a [`Recording`] stage gated only on its predecessor.
fn recording_registry(fail: Option<StepId>) -> (StageRegistry, Arc<Mutex<Vec<StepId>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = StageRegistry::new();
    for (index, id) in StepId::PIPELINE.into_iter().enumerate() {
        let stage = Recording { id, log: log.clone(), fail: fail == Some(id) };
        registry = if index == 0 {
            registry.register_arc(id, id.display_name(), Arc::new(stage), default_readiness(id))
        } else {
            let previous = StepId::PIPELINE[index - 1];
            registry.register(id, id.display_name(), stage, move |s: &WorkflowState| {
                s.is_complete(previous) && !s.is_complete(id)
            })
        };
    }
    (registry, log)
}

#[tokio::test]
async fn test_stage_never_runs_before_predecessor() {
    let (registry, log) = recording_registry(Some(StepId::Quality));
    let mut manager = WorkflowManager::new(WorkflowState::new(refs(&THREE)), registry);

    assert!(!manager.execute_step(StepId::Writer).await);
    let state = manager.run().await;

    assert_eq!(
        *log.lock().unwrap(),
        vec![StepId::Discovery, StepId::Analysis, StepId::Quality]
    );
    assert!(state.stage_error(StepId::Quality).unwrap().contains("exploded"));
    assert!(!state.is_complete(StepId::Refactor));
}

#[tokio::test]
async fn test_self_loop_terminates() {
    let (registry, log) = recording_registry(None);
    let table =
        TransitionTable::new(vec![TransitionEdge::new(StepId::Discovery, StepId::Discovery)]);
    let mut manager = WorkflowManager::new(WorkflowState::new(refs(&THREE)), registry)
        .with_transitions(table);

    let state = manager.run().await;

    assert_eq!(log.lock().unwrap().len(), 1);
    assert!(state.stage_error(StepId::Discovery).is_some());
    assert_eq!(state.current_step, Some(StepId::Complete));
}

#[tokio::test]
async fn test_cycle_stops_at_iteration_cap() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = StageRegistry::new();
    for id in [StepId::Discovery, StepId::Analysis] {
        let stage = Recording { id, log: log.clone(), fail: false };
        registry = registry.register(id, id.display_name(), stage, |_: &WorkflowState| true);
    }
    let table = TransitionTable::new(vec![
        TransitionEdge::new(StepId::Discovery, StepId::Analysis),
        TransitionEdge::new(StepId::Analysis, StepId::Discovery),
    ]);
    let mut manager = WorkflowManager::new(WorkflowState::new(refs(&THREE)), registry)
        .with_transitions(table)
        .with_max_iterations(5);

    let state = manager.run().await;

    assert_eq!(log.lock().unwrap().len(), 5);
    let message = state.stage_error(StepId::Analysis).unwrap();
    assert!(message.contains("iteration limit of 5"));
}

#[test]
fn test_merges_never_shrink_completed_steps() {
    let mut state = WorkflowState::default();
    let mut previous = BTreeSet::new();
    let patches = [
        StatePatch::for_step(StepId::Discovery).completed(StepId::Discovery),
        StatePatch::default(),
        StatePatch::for_step(StepId::Analysis).completed(StepId::Analysis),
        StatePatch::for_step(StepId::Writer),
    ];
    for patch in patches {
        state.merge(patch);
        assert!(state.completed_steps.is_superset(&previous));
        previous = state.completed_steps.clone();
    }
    assert_eq!(previous.len(), 2);
}

#[test]
fn test_merged_errors_last_write_wins() {
    let shared = ErrorKey::stage(StepId::Writer);
    let only_first = ErrorKey::repo(StepId::Writer, RepoKey::new("octo", "alpha"));
    let only_second = ErrorKey::repo(StepId::Writer, RepoKey::new("octo", "beta"));

    let mut state = WorkflowState::default();
    state.merge(
        StatePatch::default().error(shared.clone(), "first").error(only_first.clone(), "a"),
    );
    state.merge(
        StatePatch::default().error(shared.clone(), "second").error(only_second.clone(), "b"),
    );

    let expected: HashMap<ErrorKey, &str> =
        HashMap::from([(shared, "second"), (only_first, "a"), (only_second, "b")]);
    assert_eq!(state.errors.len(), expected.len());
    for (key, message) in expected {
        assert_eq!(state.errors[&key], message);
    }
}

#[tokio::test]
async fn test_state_observer_sees_final_state() {
    let llm = Arc::new(ProseLlm::default());
    let github = Arc::new(MemoryGitHub::new(&["octo/alpha"]));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut manager = manager_with(llm, github, &PipelineOptions::default(), &["octo/alpha"])
        .on_state_update(tx);

    let state = manager.run().await;
    drop(manager);

    let mut last = None;
    let mut updates = 0;
    while let Some(update) = rx.recv().await {
        updates += 1;
        last = Some(update);
    }
    assert!(updates >= StepId::PIPELINE.len());
    assert_eq!(last, Some(state));
}

#[tokio::test]
async fn test_progress_travels_with_state_updates() {
    let llm = Arc::new(ProseLlm::default());
    let github = Arc::new(MemoryGitHub::new(&THREE));
    let (state_tx, mut state_rx) = tokio::sync::mpsc::unbounded_channel();
    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut manager = manager_with(llm, github, &PipelineOptions::default(), &THREE)
        .on_state_update(state_tx)
        .on_progress(progress_tx);

    let state = manager.run().await;
    drop(manager);

    let mut updates = Vec::new();
    while let Some(update) = state_rx.recv().await {
        updates.push(update);
    }
    let mut events = Vec::new();
    while let Some(event) = progress_rx.recv().await {
        events.push(event);
    }

    assert!(state.progress.is_some());
    assert!(!events.is_empty());
    // Every progress event is visible in a state update.
    for event in &events {
        assert!(updates.iter().any(|update| update.progress.as_ref() == Some(event)));
    }

    // Each report is delivered once.
    let discovery = Some(StepId::Discovery.display_name().to_string());
    let alpha = RepoKey::new("octo", "alpha");
    let alpha_discovery = events
        .iter()
        .filter(|event| {
            event.current_step == discovery && event.current_repo.as_ref() == Some(&alpha)
        })
        .count();
    assert_eq!(alpha_discovery, 1);
}

#[tokio::test]
async fn test_failed_listing_degrades_without_failing() {
    let llm = Arc::new(ProseLlm::default());
    let github = Arc::new(MemoryGitHub::new(&THREE).with_failing_listing());
    let mut manager = manager_with(llm, github, &PipelineOptions::default(), &THREE);

    let state = manager.run().await;

    assert!(state.stage_error(StepId::Discovery).unwrap().contains("listing failed"));
    assert!(state.is_complete(StepId::Discovery));
    assert_eq!(state.discovered_repos.len(), 3);
    assert!(state.is_complete(StepId::Writer));
    assert_eq!(state.failed_steps().count(), 0);
}
