//! Refactor proposals derived from quality findings.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;

use super::{parse_json, Prompter};
use crate::workflow::{
    ErrorKey, QualityReport, RefactorProposal, RepoAnalysis, RepoRef, Stage, StageContext,
    StatePatch, StepId, WorkflowState,
};

const SYSTEM: &str = "You are a staff engineer planning refactors. Respond with a JSON object \
{\"proposals\": [{\"title\": string, \"rationale\": string, \"files\": [string], \"effort\": \
\"small\"|\"medium\"|\"large\"}]}. Propose at most five changes, most valuable first.";

/// Fourth stage: proposes refactors for each assessed repository.
pub struct RefactorAdvisor {
    prompter: Prompter,
}

impl RefactorAdvisor {
    pub fn new(prompter: Prompter) -> Self {
        Self { prompter }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProposalResponse {
    List(Vec<RefactorProposal>),
    Wrapped { proposals: Vec<RefactorProposal> },
}

#[async_trait]
impl Stage for RefactorAdvisor {
    fn id(&self) -> StepId {
        StepId::Refactor
    }

    async fn execute(
        &self,
        state: &WorkflowState,
        ctx: &StageContext,
    ) -> anyhow::Result<StatePatch> {
        let step = self.id();
        let mut patch = StatePatch::for_step(step).completed(step);
        let mut proposals = BTreeMap::new();

        let work: Vec<_> = state.discovered_with(&state.quality_reports).collect();
        for (index, (repo, report)) in work.iter().enumerate() {
            let key = repo.key();
            ctx.progress(index + 1, work.len(), Some(&key));

            let prompt = build_prompt(repo, state.analyses.get(&key), report);
            match self.prompter.json(state, SYSTEM, prompt).await {
                Ok(response) => {
                    proposals.insert(key, parse_proposals(&response));
                }
                Err(err) => {
                    tracing::warn!(repo = %key, error = %err, "Refactor proposals failed");
                    patch = patch.error(ErrorKey::repo(step, key), err.to_string());
                }
            }
        }

        patch.refactor_proposals = Some(proposals);
        Ok(patch)
    }
}

fn build_prompt(
    repo: &RepoRef,
    analysis: Option<&RepoAnalysis>,
    report: &QualityReport,
) -> String {
    let mut prompt = format!("Repository: {}\nQuality score: {}\n", repo.full_name, report.score);
    if let Some(analysis) = analysis {
        prompt.push_str(&format!(
            "Summary: {}\nLanguages: {}\n",
            analysis.summary,
            analysis.languages.join(", ")
        ));
    }
    prompt.push_str("\nFindings:\n");
    if report.findings.is_empty() {
        prompt.push_str("- none recorded\n");
    }
    for finding in &report.findings {
        let line = format!("- [{:?}] {}: {}\n", finding.severity, finding.area, finding.message);
        prompt.push_str(&line);
    }
    prompt
}

/// Proposals from a response; unparsable output yields none.
fn parse_proposals(response: &str) -> Vec<RefactorProposal> {
    match parse_json::<ProposalResponse>(response) {
        Some(ProposalResponse::List(list) | ProposalResponse::Wrapped { proposals: list }) => list
            .into_iter()
            .filter(|p| !p.title.trim().is_empty())
            .collect(),
        None => {
            tracing::debug!("Unparsable refactor proposals, using none");
            Vec::new()
        }
    }
}
