//! Writing generated documentation to the local filesystem.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::workflow::{RepoKey, WorkflowState};

/// A file to be written or committed, with a `/`-separated relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    pub path: String,
    pub content: String,
}

/// Every file generated for one repository, relative to `dir`.
///
/// Section files come from the document set; each sectioned format also
/// gets an `index.<ext>` holding the combined document.
pub fn repo_files(state: &WorkflowState, key: &RepoKey, dir: &str) -> Vec<OutputFile> {
    let mut files = state.documentation.get(key).map(|set| set.files(dir)).unwrap_or_default();
    let Some(combined) = state.generated_docs.get(key) else {
        return files;
    };

    let dir = dir.trim_end_matches('/');
    for (format, content) in combined.iter().filter(|(format, _)| format.is_sectioned()) {
        let name = format!("index.{}", format.extension());
        let path = if dir.is_empty() { name } else { format!("{dir}/{name}") };
        files.push(OutputFile { path, content: content.clone() });
    }
    files
}

/// Write every repository's documentation under `out_dir`.
///
/// Layout is `<out_dir>/<owner>/<name>/<file>` for each of [`repo_files`].
pub fn write_outputs(out_dir: &Path, state: &WorkflowState) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    for repo in &state.discovered_repos {
        let key = repo.key();
        let repo_dir = out_dir.join(key.owner()).join(key.name());

        for file in repo_files(state, &key, "") {
            let path = repo_dir.join(&file.path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(&path, &file.content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::debug!(path = %path.display(), "Wrote documentation file");
            written.push(path);
        }
    }

    Ok(written)
}
