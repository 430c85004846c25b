//! Repository structure and stack analysis.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use super::{parse_json, Prompter};
use crate::integrations::{RepoSource, TreeEntry};
use crate::workflow::{
    ErrorKey, RepoAnalysis, RepoRef, Stage, StageContext, StatePatch, StepId, WorkflowState,
};

/// Files listed in the prompt at most.
const MAX_TREE_ENTRIES: usize = 300;

/// README characters included in the prompt at most.
const MAX_README_CHARS: usize = 4000;

const SYSTEM: &str = "You are a senior engineer reviewing a code repository. \
Respond with a single JSON object with the keys: summary (string), languages (array of \
strings, most used first), frameworks (array of strings), entry_points (array of file \
paths), key_files (array of file paths), has_http_api (boolean).";

const EXTENSIONS: &[(&str, &str)] = &[
    ("rs", "Rust"),
    ("go", "Go"),
    ("py", "Python"),
    ("ts", "TypeScript"),
    ("tsx", "TypeScript"),
    ("js", "JavaScript"),
    ("jsx", "JavaScript"),
    ("java", "Java"),
    ("kt", "Kotlin"),
    ("rb", "Ruby"),
    ("php", "PHP"),
    ("cs", "C#"),
    ("c", "C"),
    ("h", "C"),
    ("cpp", "C++"),
    ("cc", "C++"),
    ("swift", "Swift"),
    ("scala", "Scala"),
    ("ex", "Elixir"),
    ("sh", "Shell"),
];

const ENTRY_POINTS: &[&str] = &[
    "main.rs",
    "lib.rs",
    "main.go",
    "main.py",
    "__main__.py",
    "app.py",
    "manage.py",
    "index.js",
    "index.ts",
    "server.js",
    "server.ts",
    "main.ts",
    "Main.java",
    "Program.cs",
];

const KEY_FILES: &[&str] = &[
    "README.md",
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    "setup.py",
    "requirements.txt",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "Gemfile",
    "composer.json",
    "Dockerfile",
    "docker-compose.yml",
    "Makefile",
];

const FRAMEWORK_MARKERS: &[(&str, &str)] = &[
    ("next.config.js", "Next.js"),
    ("next.config.mjs", "Next.js"),
    ("nuxt.config.ts", "Nuxt"),
    ("angular.json", "Angular"),
    ("vite.config.ts", "Vite"),
    ("manage.py", "Django"),
    ("Gemfile", "Bundler"),
    ("pom.xml", "Maven"),
    ("build.gradle", "Gradle"),
];

const API_MARKERS: &[&str] = &[
    "openapi.yaml",
    "openapi.yml",
    "openapi.json",
    "swagger.json",
    "swagger.yaml",
    "routes/",
    "controllers/",
    "handlers/",
    "api/",
];

/// Second stage: describes each discovered repository.
pub struct RepoAnalyzer {
    prompter: Prompter,
    repos: Arc<dyn RepoSource>,
}

impl RepoAnalyzer {
    pub fn new(prompter: Prompter, repos: Arc<dyn RepoSource>) -> Self {
        Self { prompter, repos }
    }

    async fn analyze(
        &self,
        state: &WorkflowState,
        repo: &RepoRef,
    ) -> anyhow::Result<RepoAnalysis> {
        let tree = self.repos.tree(repo).await?;
        let readme = match self.repos.readme(repo).await {
            Ok(readme) => readme,
            Err(err) => {
                tracing::debug!(repo = %repo.key(), %err, "README unavailable");
                None
            }
        };

        let prompt = build_prompt(repo, &tree, readme.as_deref());
        tracing::debug!(repo = %repo.key(), prompt_len = prompt.len(), "Analyzing repository");
        let response = self.prompter.json(state, SYSTEM, prompt).await?;

        Ok(parse_json(&response).unwrap_or_else(|| {
            tracing::debug!(repo = %repo.key(), "Unparsable analysis, using tree heuristics");
            from_tree(repo, &tree, readme.as_deref())
        }))
    }
}

#[async_trait]
impl Stage for RepoAnalyzer {
    fn id(&self) -> StepId {
        StepId::Analysis
    }

    async fn execute(
        &self,
        state: &WorkflowState,
        ctx: &StageContext,
    ) -> anyhow::Result<StatePatch> {
        let step = self.id();
        let mut patch = StatePatch::for_step(step).completed(step);
        let mut analyses = BTreeMap::new();
        let total = state.discovered_repos.len();

        for (index, repo) in state.discovered_repos.iter().enumerate() {
            let key = repo.key();
            ctx.progress(index + 1, total, Some(&key));

            match self.analyze(state, repo).await {
                Ok(analysis) => {
                    analyses.insert(key, analysis);
                }
                Err(err) => {
                    tracing::warn!(repo = %key, error = %err, "Analysis failed");
                    patch = patch.error(ErrorKey::repo(step, key), format!("{err:#}"));
                }
            }
        }

        patch.analyses = Some(analyses);
        Ok(patch)
    }
}

fn build_prompt(repo: &RepoRef, tree: &[TreeEntry], readme: Option<&str>) -> String {
    let files: Vec<&str> = tree
        .iter()
        .filter(|e| e.is_file())
        .take(MAX_TREE_ENTRIES)
        .map(|e| e.path.as_str())
        .collect();

    let mut prompt = format!(
        "Repository: {}\nDefault branch: {}\n\nFiles ({} shown):\n{}\n",
        repo.full_name,
        repo.default_branch,
        files.len(),
        files.join("\n")
    );
    if let Some(readme) = readme {
        let excerpt: String = readme.chars().take(MAX_README_CHARS).collect();
        prompt.push_str(&format!("\nREADME:\n{excerpt}\n"));
    }
    prompt
}

/// Derive an analysis from the file tree alone.
pub fn from_tree(repo: &RepoRef, tree: &[TreeEntry], readme: Option<&str>) -> RepoAnalysis {
    let files: Vec<&str> = tree.iter().filter(|e| e.is_file()).map(|e| e.path.as_str()).collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for ext in files.iter().filter_map(|path| extension(path)) {
        if let Some((_, language)) = EXTENSIONS.iter().find(|(e, _)| *e == ext) {
            *counts.entry(*language).or_default() += 1;
        }
    }
    let mut languages: Vec<(&str, usize)> = counts.into_iter().collect();
    languages.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    let entry_points = files
        .iter()
        .filter(|path| ENTRY_POINTS.contains(&file_name(path)))
        .map(|path| (*path).to_string())
        .collect();
    let key_files = files
        .iter()
        .filter(|path| KEY_FILES.contains(*path))
        .map(|path| (*path).to_string())
        .collect();

    let mut frameworks: Vec<String> = FRAMEWORK_MARKERS
        .iter()
        .filter(|(marker, _)| files.contains(marker))
        .map(|(_, name)| (*name).to_string())
        .collect();
    frameworks.dedup();

    let has_http_api = files.iter().any(|path| {
        API_MARKERS.iter().any(|marker| {
            if marker.ends_with('/') {
                path.starts_with(marker) || path.contains(&format!("/{marker}"))
            } else {
                file_name(path) == *marker
            }
        })
    });

    let summary = readme
        .and_then(readme_summary)
        .unwrap_or_else(|| format!("The {} repository.", repo.name));

    RepoAnalysis {
        summary,
        languages: languages.into_iter().map(|(name, _)| name.to_string()).collect(),
        frameworks,
        entry_points,
        key_files,
        has_http_api,
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn extension(path: &str) -> Option<String> {
    let (stem, ext) = file_name(path).rsplit_once('.')?;
    (!stem.is_empty()).then(|| ext.to_lowercase())
}

/// First prose line of a README.
fn readme_summary(readme: &str) -> Option<String> {
    readme
        .lines()
        .map(str::trim)
        .find(|line| {
            !line.is_empty()
                && !line.starts_with('#')
                && !line.starts_with('!')
                && !line.starts_with('[')
                && !line.starts_with('<')
        })
        .map(String::from)
}
