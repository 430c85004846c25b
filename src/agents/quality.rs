//! Code quality assessment.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::{parse_json, Prompter};
use crate::workflow::{
    ErrorKey, QualityReport, RepoAnalysis, RepoRef, Stage, StageContext, StatePatch, StepId,
    WorkflowState,
};

const SYSTEM: &str = "You are a code reviewer assessing repository quality. \
Respond with a single JSON object: {\"score\": integer 0-100, \"findings\": [{\"severity\": \
\"low\"|\"medium\"|\"high\", \"area\": string, \"message\": string}]}.";

/// Third stage: scores each analysed repository.
pub struct QualityAnalyzer {
    prompter: Prompter,
}

impl QualityAnalyzer {
    pub fn new(prompter: Prompter) -> Self {
        Self { prompter }
    }
}

#[async_trait]
impl Stage for QualityAnalyzer {
    fn id(&self) -> StepId {
        StepId::Quality
    }

    async fn execute(
        &self,
        state: &WorkflowState,
        ctx: &StageContext,
    ) -> anyhow::Result<StatePatch> {
        let step = self.id();
        let mut patch = StatePatch::for_step(step).completed(step);
        let mut reports = BTreeMap::new();

        let work: Vec<_> = state.discovered_with(&state.analyses).collect();
        for (index, (repo, analysis)) in work.iter().enumerate() {
            let key = repo.key();
            ctx.progress(index + 1, work.len(), Some(&key));

            match self.prompter.json(state, SYSTEM, build_prompt(repo, analysis)).await {
                Ok(response) => {
                    let report = parse_report(&response).unwrap_or_else(|| {
                        tracing::debug!(repo = %key, "Unparsable quality report, using neutral");
                        QualityReport::neutral()
                    });
                    reports.insert(key, report);
                }
                Err(err) => {
                    tracing::warn!(repo = %key, error = %err, "Quality assessment failed");
                    patch = patch.error(ErrorKey::repo(step, key), err.to_string());
                }
            }
        }

        patch.quality_reports = Some(reports);
        Ok(patch)
    }
}

fn build_prompt(repo: &RepoRef, analysis: &RepoAnalysis) -> String {
    format!(
        "Repository: {}\nSummary: {}\nLanguages: {}\nFrameworks: {}\nEntry points: {}\n\
         Key files: {}\n\nAssess maintainability, testing signals and documentation.",
        repo.full_name,
        analysis.summary,
        analysis.languages.join(", "),
        analysis.frameworks.join(", "),
        analysis.entry_points.join(", "),
        analysis.key_files.join(", ")
    )
}

fn parse_report(response: &str) -> Option<QualityReport> {
    let mut report: QualityReport = parse_json(response)?;
    report.score = report.score.min(100);
    Some(report)
}
