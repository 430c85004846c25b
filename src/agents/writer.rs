//! Documentation writing.

use std::collections::BTreeMap;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::Serialize;

use super::{extract_sections, strip_code_fence, Prompter};
use crate::docs::{render_outline, DocSection, DocumentSet, OutputFormat};
use crate::workflow::{
    DocsPlan, ErrorKey, RepoAnalysis, RepoRef, Stage, StageContext, StatePatch, StepId,
    WorkflowState,
};

const SYSTEM: &str = "You are a technical writer producing accurate, concise project \
documentation. Never invent features that the repository context does not support.";

const OPENAPI_SYSTEM: &str = "You are an API designer. Respond with an OpenAPI 3.0 document \
in YAML and nothing else.";

/// Sixth stage: writes every planned section in every requested format.
pub struct DocsWriter {
    prompter: Prompter,
}

impl DocsWriter {
    pub fn new(prompter: Prompter) -> Self {
        Self { prompter }
    }

    async fn write_repo(
        &self,
        state: &WorkflowState,
        repo: &RepoRef,
        plan: &DocsPlan,
    ) -> anyhow::Result<DocumentSet> {
        let key = repo.key();
        let analysis = state.analyses.get(&key);
        let mut set = DocumentSet::new(key.clone());
        set.sections = plan
            .sections
            .iter()
            .map(|planned| DocSection {
                section: planned.section,
                title: planned.title.clone(),
                content: BTreeMap::new(),
            })
            .collect();

        for format in &state.formats {
            if !format.is_sectioned() {
                let prompt = openapi_prompt(repo, analysis);
                let response = self
                    .prompter
                    .text(state, OPENAPI_SYSTEM, prompt)
                    .await
                    .with_context(|| format!("{format} generation failed"))?;
                set.openapi = Some(validated_openapi(&response).map_or_else(
                    || {
                        tracing::debug!(repo = %key, "Invalid OpenAPI output, using skeleton");
                        openapi_skeleton(repo, analysis)
                    },
                    Ok,
                )?);
                continue;
            }

            let prompt = sections_prompt(repo, analysis, state, plan, *format);
            let response = self
                .prompter
                .text(state, SYSTEM, prompt)
                .await
                .with_context(|| format!("{format} generation failed"))?;
            let mut written = extract_sections(&response);

            for (section, planned) in set.sections.iter_mut().zip(&plan.sections) {
                let body = written.remove(planned.section.slug()).unwrap_or_else(|| {
                    tracing::debug!(repo = %key, section = %planned.section, "Section missing");
                    render_outline(*format, &planned.title, &planned.outline)
                });
                section.content.insert(*format, body);
            }
        }

        Ok(set)
    }
}

#[async_trait]
impl Stage for DocsWriter {
    fn id(&self) -> StepId {
        StepId::Writer
    }

    async fn execute(
        &self,
        state: &WorkflowState,
        ctx: &StageContext,
    ) -> anyhow::Result<StatePatch> {
        let step = self.id();
        let mut patch = StatePatch::for_step(step).completed(step);
        let mut documentation = BTreeMap::new();
        let mut generated = BTreeMap::new();

        let work: Vec<_> = state.discovered_with(&state.plans).collect();
        for (index, (repo, plan)) in work.iter().enumerate() {
            let key = repo.key();
            ctx.progress(index + 1, work.len(), Some(&key));

            match self.write_repo(state, repo, plan).await {
                Ok(set) => {
                    let combined: BTreeMap<OutputFormat, String> = state
                        .formats
                        .iter()
                        .filter_map(|f| set.combined(*f, &state.language).map(|doc| (*f, doc)))
                        .collect();
                    tracing::info!(repo = %key, formats = combined.len(), "Wrote documentation");
                    generated.insert(key.clone(), combined);
                    documentation.insert(key, set);
                }
                Err(err) => {
                    tracing::warn!(repo = %key, error = %err, "Writing failed");
                    patch = patch.error(ErrorKey::repo(step, key), format!("{err:#}"));
                }
            }
        }

        patch.documentation = Some(documentation);
        patch.generated_docs = Some(generated);
        Ok(patch)
    }
}

fn format_instructions(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Markdown => {
            "GitHub-flavoured Markdown. Start each section with a level-two heading."
        }
        OutputFormat::Mdx => {
            "MDX. Start each section with a level-two heading. Do not add frontmatter or imports."
        }
        OutputFormat::Html => {
            "HTML fragments using h2, p, ul, li, pre and code elements only. \
             Do not emit section, html, head or body elements."
        }
        OutputFormat::OpenApi => "OpenAPI 3.0 YAML.",
    }
}

fn repo_context(repo: &RepoRef, analysis: Option<&RepoAnalysis>) -> String {
    let mut context = format!("Repository: {}\n", repo.full_name);
    if let Some(analysis) = analysis {
        context.push_str(&format!(
            "Summary: {}\nLanguages: {}\nFrameworks: {}\nEntry points: {}\nKey files: {}\n",
            analysis.summary,
            analysis.languages.join(", "),
            analysis.frameworks.join(", "),
            analysis.entry_points.join(", "),
            analysis.key_files.join(", ")
        ));
    }
    context
}

fn sections_prompt(
    repo: &RepoRef,
    analysis: Option<&RepoAnalysis>,
    state: &WorkflowState,
    plan: &DocsPlan,
    format: OutputFormat,
) -> String {
    let mut prompt = repo_context(repo, analysis);

    if let Some(proposals) = state.refactor_proposals.get(&repo.key()) {
        if !proposals.is_empty() {
            let titles: Vec<&str> = proposals.iter().map(|p| p.title.as_str()).collect();
            prompt.push_str(&format!("Known improvement areas: {}\n", titles.join("; ")));
        }
    }

    prompt.push_str(&format!(
        "\nWrite the sections below as {} Wrap each one in \
         <section id=\"IDENTIFIER\">...</section> using the identifier given.\n",
        format_instructions(format)
    ));
    for planned in &plan.sections {
        prompt.push_str(&format!("\n- {} ({})\n", planned.section.slug(), planned.title));
        for item in &planned.outline {
            prompt.push_str(&format!("  - {item}\n"));
        }
    }
    prompt
}

fn openapi_prompt(repo: &RepoRef, analysis: Option<&RepoAnalysis>) -> String {
    format!(
        "{}\nDescribe the HTTP API of this repository. When no endpoints can be inferred, \
         return a valid document with empty paths.",
        repo_context(repo, analysis)
    )
}

/// The response as an OpenAPI document, if it is valid YAML with a version key.
fn validated_openapi(response: &str) -> Option<String> {
    let text = strip_code_fence(response);
    let value: serde_yaml::Value = serde_yaml::from_str(&text).ok()?;
    let mapping = value.as_mapping()?;
    let versioned = ["openapi", "swagger"].iter().any(|k| mapping.contains_key(*k));
    versioned.then(|| format!("{}\n", text.trim_end()))
}

#[derive(Serialize)]
struct Skeleton<'a> {
    openapi: &'static str,
    info: SkeletonInfo<'a>,
    paths: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Serialize)]
struct SkeletonInfo<'a> {
    title: &'a str,
    version: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    description: &'a str,
}

/// Minimal OpenAPI 3.0 document for a repository.
fn openapi_skeleton(repo: &RepoRef, analysis: Option<&RepoAnalysis>) -> anyhow::Result<String> {
    let skeleton = Skeleton {
        openapi: "3.0.3",
        info: SkeletonInfo {
            title: &repo.name,
            version: "0.1.0",
            description: analysis.map_or("", |a| a.summary.as_str()),
        },
        paths: BTreeMap::new(),
    };
    serde_yaml::to_string(&skeleton).context("Failed to render OpenAPI skeleton")
}
