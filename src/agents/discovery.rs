//! Resolves the selected repositories against the user's listing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::integrations::{ListReposOptions, RepoSource};
use crate::workflow::{ErrorKey, RepoRef, Stage, StageContext, StatePatch, StepId, WorkflowState};

/// First stage: turns selected repositories into canonical records.
pub struct RepoDiscovery {
    repos: Arc<dyn RepoSource>,
    options: ListReposOptions,
}

impl RepoDiscovery {
    pub fn new(repos: Arc<dyn RepoSource>, options: ListReposOptions) -> Self {
        Self { repos, options }
    }
}

#[async_trait]
impl Stage for RepoDiscovery {
    fn id(&self) -> StepId {
        StepId::Discovery
    }

    async fn execute(
        &self,
        state: &WorkflowState,
        ctx: &StageContext,
    ) -> anyhow::Result<StatePatch> {
        let step = self.id();
        let mut patch = StatePatch::for_step(step).completed(step);

        let listing = match self.repos.list_repositories(&self.options).await {
            Ok(listing) => Some(listing),
            Err(err) => {
                tracing::warn!(%err, "Repository listing failed, using selection as supplied");
                patch = patch
                    .error(ErrorKey::stage(step), format!("repository listing failed: {err}"));
                None
            }
        };
        let by_name: HashMap<String, &RepoRef> = listing
            .iter()
            .flatten()
            .map(|repo| (repo.full_name.to_lowercase(), repo))
            .collect();

        let total = state.selected_repos.len();
        let mut seen = HashSet::new();
        let mut discovered = Vec::with_capacity(total);

        for (index, selected) in state.selected_repos.iter().enumerate() {
            let key = selected.key();
            ctx.progress(index + 1, total, Some(&key));

            let resolved = match by_name.get(&selected.full_name.to_lowercase()) {
                Some(found) => (*found).clone(),
                None => {
                    if listing.is_some() {
                        tracing::warn!(repo = %key, "Selected repository not in listing");
                        patch = patch.error(
                            ErrorKey::repo(step, key.clone()),
                            "not found in the repository listing; using it as supplied",
                        );
                    }
                    selected.clone()
                }
            };

            if seen.insert(resolved.key()) {
                discovered.push(resolved);
            }
        }

        tracing::info!(count = discovered.len(), "Discovered repositories");
        patch.discovered_repos = Some(discovered);
        Ok(patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::FakeRepos;
    use crate::workflow::RepoKey;

    fn listed(full_name: &str, id: u64) -> RepoRef {
        let mut repo = RepoRef::from_full_name(full_name).unwrap();
        repo.id = id;
        repo.default_branch = "develop".to_string();
        repo
    }

    fn stage(listing: Option<Vec<RepoRef>>) -> RepoDiscovery {
        let repos = FakeRepos { listing, ..Default::default() };
        RepoDiscovery::new(Arc::new(repos), ListReposOptions::default())
    }

    #[tokio::test]
    async fn test_adopts_listing_record() {
        let selected = RepoRef::from_full_name("Octo/Hello").unwrap();
        let state = WorkflowState::new(vec![selected]);
        let stage = stage(Some(vec![listed("octo/hello", 42), listed("octo/other", 7)]));

        let ctx = StageContext::detached(StepId::Discovery);
        let patch = stage.execute(&state, &ctx).await.unwrap();
        let discovered = patch.discovered_repos.unwrap();

        assert_eq!(discovered.len(), 1);
        assert_eq!(discovered[0].id, 42);
        assert_eq!(discovered[0].default_branch, "develop");
        assert!(patch.errors.is_empty());
        assert!(patch.completed_steps.contains(&StepId::Discovery));
    }

    #[tokio::test]
    async fn test_keeps_unlisted_with_error() {
        let state = WorkflowState::new(vec![
            RepoRef::from_full_name("octo/hello").unwrap(),
            RepoRef::from_full_name("octo/ghost").unwrap(),
        ]);
        let stage = stage(Some(vec![listed("octo/hello", 1)]));

        let ctx = StageContext::detached(StepId::Discovery);
        let patch = stage.execute(&state, &ctx).await.unwrap();
        let names: Vec<_> =
            patch.discovered_repos.unwrap().into_iter().map(|r| r.full_name).collect();

        assert_eq!(names, vec!["octo/hello", "octo/ghost"]);
        let key = ErrorKey::repo(StepId::Discovery, RepoKey::new("octo", "ghost"));
        assert!(patch.errors.contains_key(&key));
    }

    #[tokio::test]
    async fn test_listing_failure_falls_back() {
        let state = WorkflowState::new(vec![
            RepoRef::from_full_name("octo/hello").unwrap(),
            RepoRef::from_full_name("octo/hello").unwrap(),
        ]);

        let patch =
            stage(None).execute(&state, &StageContext::detached(StepId::Discovery)).await.unwrap();

        assert_eq!(patch.discovered_repos.unwrap().len(), 1);
        assert_eq!(patch.errors.len(), 1);
        assert!(patch.errors.contains_key(&ErrorKey::stage(StepId::Discovery)));
    }
}
