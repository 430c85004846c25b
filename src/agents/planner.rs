//! Documentation planning.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use async_trait::async_trait;
use serde::Deserialize;

use super::{parse_json, Prompter};
use crate::docs::SectionType;
use crate::workflow::{
    DocsPlan, ErrorKey, PlannedSection, RepoAnalysis, RepoRef, Stage, StageContext, StatePatch,
    StepId, WorkflowState,
};

const SYSTEM: &str = "You are a technical writer planning project documentation. Respond with \
a JSON object {\"sections\": [{\"section\": string, \"title\": string, \"outline\": [string]}]} \
using only the section identifiers you are given, in reading order.";

/// Fifth stage: decides which sections to write and what they cover.
pub struct DocsPlanner {
    prompter: Prompter,
}

impl DocsPlanner {
    pub fn new(prompter: Prompter) -> Self {
        Self { prompter }
    }
}

#[derive(Deserialize)]
struct RawPlan {
    #[serde(default)]
    sections: Vec<RawSection>,
}

#[derive(Deserialize)]
struct RawSection {
    section: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    outline: Vec<String>,
}

#[async_trait]
impl Stage for DocsPlanner {
    fn id(&self) -> StepId {
        StepId::Planner
    }

    async fn execute(
        &self,
        state: &WorkflowState,
        ctx: &StageContext,
    ) -> anyhow::Result<StatePatch> {
        let step = self.id();
        let mut patch = StatePatch::for_step(step).completed(step);
        let mut plans = BTreeMap::new();

        let work: Vec<_> = state.discovered_with(&state.analyses).collect();
        for (index, (repo, analysis)) in work.iter().enumerate() {
            let key = repo.key();
            ctx.progress(index + 1, work.len(), Some(&key));

            let prompt = build_prompt(repo, analysis, &state.sections);
            match self.prompter.json(state, SYSTEM, prompt).await {
                Ok(response) => {
                    plans.insert(key, parse_plan(&response, &state.sections, analysis));
                }
                Err(err) => {
                    tracing::warn!(repo = %key, error = %err, "Planning failed");
                    patch = patch.error(ErrorKey::repo(step, key), err.to_string());
                }
            }
        }

        patch.plans = Some(plans);
        Ok(patch)
    }
}

fn build_prompt(
    repo: &RepoRef,
    analysis: &RepoAnalysis,
    requested: &BTreeSet<SectionType>,
) -> String {
    let sections: Vec<&str> = requested.iter().map(SectionType::slug).collect();
    format!(
        "Repository: {}\nSummary: {}\nLanguages: {}\nFrameworks: {}\nHTTP API: {}\n\n\
         Plan these sections: {}",
        repo.full_name,
        analysis.summary,
        analysis.languages.join(", "),
        analysis.frameworks.join(", "),
        if analysis.has_http_api { "yes" } else { "no" },
        sections.join(", ")
    )
}

/// Plan from a response, restricted to the requested sections.
///
/// Falls back to [`default_plan`] when nothing usable is left.
fn parse_plan(
    response: &str,
    requested: &BTreeSet<SectionType>,
    analysis: &RepoAnalysis,
) -> DocsPlan {
    let mut seen = HashSet::new();
    let sections: Vec<PlannedSection> = parse_json::<RawPlan>(response)
        .map(|raw| raw.sections)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|raw| {
            let section = raw.section.parse::<SectionType>().ok()?;
            if !requested.contains(&section) || !seen.insert(section) {
                return None;
            }
            let title = match raw.title.trim() {
                "" => section.default_title().to_string(),
                title => title.to_string(),
            };
            Some(PlannedSection { section, title, outline: raw.outline })
        })
        .collect();

    if sections.is_empty() {
        tracing::debug!("Unusable plan, planning requested sections");
        return default_plan(requested, analysis);
    }
    DocsPlan { sections }
}

/// Plan covering exactly the requested sections with default titles.
pub fn default_plan(requested: &BTreeSet<SectionType>, analysis: &RepoAnalysis) -> DocsPlan {
    let sections = requested
        .iter()
        .map(|section| PlannedSection {
            section: *section,
            title: section.default_title().to_string(),
            outline: default_outline(*section, analysis),
        })
        .collect();
    DocsPlan { sections }
}

fn default_outline(section: SectionType, analysis: &RepoAnalysis) -> Vec<String> {
    let mut outline = Vec::new();
    match section {
        SectionType::Overview => {
            if !analysis.summary.is_empty() {
                outline.push(analysis.summary.clone());
            }
            if !analysis.languages.is_empty() {
                outline.push(format!("Built with {}", analysis.languages.join(", ")));
            }
        }
        SectionType::Installation => {
            outline.push("Prerequisites".to_string());
            outline.extend(analysis.key_files.iter().map(|f| format!("Configured by {f}")));
        }
        SectionType::Usage => {
            outline.extend(analysis.entry_points.iter().map(|f| format!("Entry point {f}")));
        }
        SectionType::Api => outline.push("Endpoints and request formats".to_string()),
        SectionType::Architecture => {
            outline.extend(analysis.key_files.iter().map(|f| format!("Role of {f}")));
        }
        SectionType::Contributing => outline.push("Development workflow".to_string()),
        SectionType::Changelog => outline.push("Notable changes".to_string()),
    }
    outline
}
