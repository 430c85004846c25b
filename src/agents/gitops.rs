//! Committing generated documentation back to each repository.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::docs::repo_files;
use crate::integrations::{CommitRequest, CommitSink};
use crate::workflow::{ErrorKey, Stage, StageContext, StatePatch, StepId, WorkflowState};

/// Default directory inside the repository for committed docs.
pub const DEFAULT_DOCS_DIR: &str = "docs";

/// Default commit message; `{path}` is replaced with the file path.
pub const DEFAULT_COMMIT_MESSAGE: &str = "docs: update {path}";

/// How generated files are committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOpsOptions {
    /// Commit at all; when false the stage completes without side effects
    pub enabled: bool,
    /// Target branch; each repository's default branch when `None`
    pub branch: Option<String>,
    pub docs_dir: String,
    pub commit_message: String,
}

impl Default for GitOpsOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            branch: None,
            docs_dir: DEFAULT_DOCS_DIR.to_string(),
            commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
        }
    }
}

/// Last stage: commits every generated file.
pub struct GitOps {
    commits: Arc<dyn CommitSink>,
    options: GitOpsOptions,
}

impl GitOps {
    pub fn new(commits: Arc<dyn CommitSink>, options: GitOpsOptions) -> Self {
        Self { commits, options }
    }
}

#[async_trait]
impl Stage for GitOps {
    fn id(&self) -> StepId {
        StepId::GitOps
    }

    async fn execute(
        &self,
        state: &WorkflowState,
        ctx: &StageContext,
    ) -> anyhow::Result<StatePatch> {
        let step = self.id();
        let mut patch = StatePatch::for_step(step).completed(step);
        let mut commits = BTreeMap::new();

        if !self.options.enabled {
            tracing::info!("Committing disabled, leaving repositories untouched");
            patch.commits = Some(commits);
            return Ok(patch);
        }

        let work: Vec<_> = state.discovered_with(&state.documentation).collect();
        for (index, (repo, _)) in work.iter().enumerate() {
            let key = repo.key();
            ctx.progress(index + 1, work.len(), Some(&key));

            let branch =
                self.options.branch.clone().unwrap_or_else(|| repo.default_branch.clone());
            let mut made = Vec::new();

            for file in repo_files(state, &key, &self.options.docs_dir) {
                let request = CommitRequest {
                    repo: key.clone(),
                    message: self.options.commit_message.replace("{path}", &file.path),
                    path: file.path,
                    content: file.content,
                    branch: Some(branch.clone()),
                };
                match self.commits.commit_file(&request).await {
                    Ok(info) => made.push(info),
                    Err(err) => {
                        tracing::warn!(repo = %key, path = %request.path, %err, "Commit failed");
                        patch = patch.error(
                            ErrorKey::repo(step, key.clone()),
                            format!("failed to commit {}: {err}", request.path),
                        );
                        break;
                    }
                }
            }

            tracing::info!(repo = %key, %branch, count = made.len(), "Committed documentation");
            commits.insert(key, made);
        }

        patch.commits = Some(commits);
        Ok(patch)
    }
}
