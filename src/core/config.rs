//! Configuration management for GitScribe.
//!
//! Handles loading and saving configuration from TOML files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agents::{GitOpsOptions, PipelineOptions};
use crate::ai::DEFAULT_TEMPERATURE;
use crate::docs::{OutputFormat, SectionType};
use crate::integrations::{ListReposOptions, Visibility, DEFAULT_API_URL};
use crate::workflow::{DEFAULT_LANGUAGE, DEFAULT_MAX_ITERATIONS, DEFAULT_MODEL};

/// Name of the per-project config file.
pub const LOCAL_CONFIG_FILE: &str = ".gitscribe.toml";

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// LLM backend proxy
    pub llm: LlmConfig,

    /// GitHub API settings
    pub github: GitHubConfig,

    /// Generated output
    pub output: OutputConfig,

    /// Committing generated docs
    pub git: GitConfig,
}

/// General settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Language code for generated prose
    pub language: String,

    /// Model requested from the proxy
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Stepper iteration cap
    pub max_iterations: usize,
}

/// LLM proxy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible proxy
    pub proxy_url: String,

    /// Environment variable holding the proxy API key, if it needs one
    pub api_key_env: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// GitHub settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_url: String,

    /// Environment variable holding the access token
    pub token_env: String,

    pub visibility: Visibility,
    pub per_page: u32,
    pub max_pages: u32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Formats generated when none are given on the command line
    pub formats: Vec<OutputFormat>,

    /// Sections generated when none are given on the command line
    pub sections: Vec<SectionType>,

    /// Local directory the documents are written to
    pub out_dir: PathBuf,

    /// Directory inside each repository for committed docs
    pub docs_dir: String,
}

/// Commit settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Commit generated docs back to the repositories
    pub commit: bool,

    /// Target branch; the repository default branch when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Commit message, `{path}` is replaced with the file path
    pub commit_message: String,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Looks for config in:
    /// 1. `.gitscribe.toml` in current directory
    /// 2. `~/.config/gitscribe/config.toml`
    /// 3. Falls back to defaults
    pub fn load() -> anyhow::Result<Self> {
        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(global_config) = Self::global_path() {
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Path of the file [`Config::load`] would read, if any exists.
    pub fn active_path() -> Option<PathBuf> {
        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Some(local_config);
        }
        Self::global_path().filter(|path| path.exists())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the global config file and return its path.
    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let path = Self::global_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(crate::APP_NAME))
    }

    /// Get the global config file path.
    pub fn global_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("config.toml"))
    }

    /// Stage options derived from this configuration.
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            discovery: self.github.list_options(),
            temperature: self.general.temperature,
            git: GitOpsOptions {
                enabled: self.git.commit,
                branch: self.git.branch.clone(),
                docs_dir: self.output.docs_dir.clone(),
                commit_message: self.git.commit_message.clone(),
            },
        }
    }
}

impl GitHubConfig {
    pub fn list_options(&self) -> ListReposOptions {
        ListReposOptions {
            visibility: self.visibility,
            per_page: self.per_page.clamp(1, 100),
            max_pages: self.max_pages.max(1),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            proxy_url: "http://localhost:8080/v1".to_string(),
            api_key_env: "GITSCRIBE_API_KEY".to_string(),
            timeout_secs: 120,
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        let list = ListReposOptions::default();
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
            visibility: list.visibility,
            per_page: list.per_page,
            max_pages: list.max_pages,
            timeout_secs: 30,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        let git = GitOpsOptions::default();
        Self {
            formats: vec![OutputFormat::Markdown],
            sections: vec![SectionType::Overview, SectionType::Installation, SectionType::Usage],
            out_dir: PathBuf::from("gitscribe-docs"),
            docs_dir: git.docs_dir,
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        let git = GitOpsOptions::default();
        Self { commit: git.enabled, branch: git.branch, commit_message: git.commit_message }
    }
}
