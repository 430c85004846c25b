//! GitScribe - repository documentation from an LLM pipeline.
//!
//! Runs the seven-stage documentation workflow against GitHub repositories
//! and writes the generated documents to disk.

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gitscribe::core::{Config, LOCAL_CONFIG_FILE};
use gitscribe::docs::{OutputFormat, SectionType};
use gitscribe::integrations::Visibility;

/// Generate repository documentation with an LLM pipeline
#[derive(Parser)]
#[command(name = "gitscribe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate documentation for one or more repositories
    #[cfg(all(feature = "ai", feature = "github"))]
    Generate(GenerateArgs),

    /// List repositories visible to the GitHub token
    #[cfg(feature = "github")]
    Repos {
        /// Visibility filter (all, public, private)
        #[arg(long)]
        visibility: Option<Visibility>,
    },

    /// Show configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,

        /// Write a default config file (.gitscribe.toml in the current directory)
        #[arg(long, conflicts_with = "path")]
        init: bool,

        /// With --init, write the global config file instead
        #[arg(long, requires = "init")]
        global: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// Repositories as owner/name
    #[arg(required = true)]
    repos: Vec<String>,

    /// Output format (markdown, mdx, openapi, html); repeatable
    #[arg(short, long = "format")]
    formats: Vec<OutputFormat>,

    /// Section to generate (overview, installation, usage, api, ...); repeatable
    #[arg(short, long = "section")]
    sections: Vec<SectionType>,

    /// Language code for generated prose
    #[arg(short, long)]
    language: Option<String>,

    /// Model requested from the LLM proxy
    #[arg(short, long)]
    model: Option<String>,

    /// Directory the documents are written to
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Commit the generated files back to each repository
    #[arg(long)]
    commit: bool,

    /// Branch to commit to (defaults to each repository's default branch)
    #[arg(long, requires = "commit")]
    branch: Option<String>,

    /// Print the final workflow state as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Secrets may live in a local .env file
    dotenvy::dotenv().ok();

    // Setup logging
    let filter = if cli.verbose { EnvFilter::new("debug") } else { EnvFilter::new("warn") };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    match cli.command {
        #[cfg(all(feature = "ai", feature = "github"))]
        Commands::Generate(args) => cmd_generate(args)?,
        #[cfg(feature = "github")]
        Commands::Repos { visibility } => cmd_repos(visibility)?,
        Commands::Config { path, init, global } => cmd_config(path, init, global)?,
        Commands::Completions { shell } => cmd_completions(shell),
    }

    Ok(())
}

/// Read a secret from the environment variable the config names.
fn secret_from_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|value| !value.trim().is_empty())
}

/// Build a GitHub client from the config and `token_env`.
#[cfg(feature = "github")]
fn github_client(config: &Config) -> Result<gitscribe::GitHubClient> {
    let token = secret_from_env(&config.github.token_env).ok_or_else(|| {
        anyhow::anyhow!(
            "GitHub integration not configured.\n\n\
             To enable, set {} to a token with 'repo' scope.",
            config.github.token_env
        )
    })?;
    let client =
        gitscribe::GitHubClient::new(token, &config.github.api_url, config.github.timeout())?;
    Ok(client)
}

/// Run the documentation pipeline.
#[cfg(all(feature = "ai", feature = "github"))]
fn cmd_generate(args: GenerateArgs) -> Result<()> {
    use std::sync::Arc;

    use gitscribe::docs::write_outputs;
    use gitscribe::workflow::{RepoRef, StepId, WorkflowManager, WorkflowState};
    use gitscribe::{pipeline, Collaborators, ProxyClient};

    let config = Config::load()?;

    let selected = args
        .repos
        .iter()
        .map(|name| {
            RepoRef::from_full_name(name)
                .ok_or_else(|| anyhow::anyhow!("Invalid repository '{name}', expected owner/name"))
        })
        .collect::<Result<Vec<_>>>()?;

    let github = Arc::new(github_client(&config)?);
    let mut llm = ProxyClient::new(&config.llm.proxy_url, config.llm.timeout())?;
    if let Some(api_key) = secret_from_env(&config.llm.api_key_env) {
        llm = llm.with_api_key(api_key);
    }

    let formats =
        if args.formats.is_empty() { config.output.formats.clone() } else { args.formats };
    let sections =
        if args.sections.is_empty() { config.output.sections.clone() } else { args.sections };
    let state = WorkflowState::new(selected)
        .with_formats(formats)
        .with_sections(sections)
        .with_language(args.language.unwrap_or_else(|| config.general.language.clone()))
        .with_model(args.model.unwrap_or_else(|| config.general.model.clone()));

    let mut options = config.pipeline_options();
    options.git.enabled |= args.commit;
    if args.branch.is_some() {
        options.git.branch = args.branch;
    }

    let collaborators =
        Collaborators { llm: Arc::new(llm), repos: github.clone(), commits: github };
    let registry = pipeline(&collaborators, &options);

    // Create tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new()?;

    let state = rt.block_on(async {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<gitscribe::workflow::Progress>();
        let printer = tokio::spawn(async move {
            while let Some(progress) = rx.recv().await {
                let step = progress.current_step.unwrap_or_default();
                match progress.current_repo {
                    Some(repo) => eprintln!(
                        "  [{}/{}] {step}: {repo}",
                        progress.current, progress.total
                    ),
                    None => eprintln!("  [{}/{}] {step}", progress.current, progress.total),
                }
            }
        });

        let mut manager = WorkflowManager::new(state, registry)
            .with_max_iterations(config.general.max_iterations)
            .on_progress(tx);
        manager.run().await;
        let state = manager.into_state();
        printer.await.ok();
        state
    });

    if args.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        println!();
        for step in StepId::PIPELINE {
            let failed = state.errors_for(step).count();
            let status = match (state.stage_error(step), state.is_complete(step)) {
                (Some(error), false) => format!("failed: {error}"),
                (Some(error), true) => format!("degraded: {error}"),
                (None, false) => "not run".to_string(),
                (None, true) if failed > 0 => format!("done, {failed} repository error(s)"),
                (None, true) => "done".to_string(),
            };
            println!("  {:<22} {status}", step.display_name());
        }
    }

    let out_dir = args.out.unwrap_or_else(|| config.output.out_dir.clone());
    let written = write_outputs(&out_dir, &state)?;
    if !args.json {
        println!("\nWrote {} file(s) to {}", written.len(), out_dir.display());
        for (key, commits) in state.commits.iter().filter(|(_, commits)| !commits.is_empty()) {
            println!("Committed {} file(s) to {key}", commits.len());
        }
    }

    let fatal: Vec<&str> = state.failed_steps().map(|step| step.as_str()).collect();
    if !fatal.is_empty() {
        anyhow::bail!("Workflow failed at: {}", fatal.join(", "));
    }

    Ok(())
}

/// List repositories visible to the token.
#[cfg(feature = "github")]
fn cmd_repos(visibility: Option<Visibility>) -> Result<()> {
    use gitscribe::integrations::RepoSource;

    let config = Config::load()?;
    let github = github_client(&config)?;

    let mut options = config.github.list_options();
    if let Some(visibility) = visibility {
        options.visibility = visibility;
    }

    // Create tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let repos = github
            .list_repositories(&options)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to list repositories: {e}"))?;

        if repos.is_empty() {
            println!("  No repositories found.");
            return Ok(());
        }
        for repo in &repos {
            let marker = if repo.private { " (private)" } else { "" };
            println!("  {}{marker}", repo.full_name);
        }
        let noun = if repos.len() == 1 { "repository" } else { "repositories" };
        println!("\nShowing {} {noun}", repos.len());
        Ok(())
    })
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "gitscribe", &mut io::stdout());
}

/// Show or initialize configuration.
fn cmd_config(show_path: bool, init: bool, global: bool) -> Result<()> {
    if init {
        let target = if global {
            Config::global_path()
                .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        } else {
            PathBuf::from(LOCAL_CONFIG_FILE)
        };
        if target.exists() {
            anyhow::bail!("{} already exists", target.display());
        }

        let config = Config::default();
        let written = if global {
            config.save()?
        } else {
            config.save_to(&target)?;
            target
        };
        println!("Wrote default configuration to {}", written.display());
        return Ok(());
    }

    if show_path {
        if let Some(path) = Config::active_path().or_else(Config::global_path) {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let config = Config::load()?;
    let toml = toml::to_string_pretty(&config)?;
    println!("{toml}");

    Ok(())
}
