//! # GitScribe
//!
//! Generate repository documentation with an LLM-driven pipeline.
//!
//! GitScribe takes a set of GitHub repositories through seven stages
//! (discovery, analysis, quality review, refactor proposals, planning,
//! writing and committing) and produces Markdown, MDX, OpenAPI and HTML
//! documentation for each of them.
//!
//! ## Features
//!
//! - **Stepper**: a small state machine runs each stage once it is ready
//! - **Partial failure**: one broken repository never stops the others
//! - **Formats**: Markdown, MDX, OpenAPI 3 YAML and standalone HTML
//! - **GitOps**: optionally commits the generated files back to GitHub
//!
//! ## Quick Start
//!
//! ```bash
//! # Document two repositories as Markdown and HTML
//! gitscribe generate octo/api octo/web --format markdown --format html
//!
//! # List the repositories the token can see
//! gitscribe repos --visibility private
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::derivable_impls)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::trivially_copy_pass_by_ref)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::future_not_send)]

pub mod agents;
pub mod ai;
pub mod core;
pub mod docs;
pub mod integrations;
pub mod workflow;

pub use agents::{pipeline, Collaborators, PipelineOptions};
pub use ai::{CompletionRequest, LlmClient, LlmError};
#[cfg(feature = "ai")]
pub use ai::ProxyClient;
pub use core::Config;
pub use docs::{DocumentSet, OutputFormat, SectionType};
#[cfg(feature = "github")]
pub use integrations::GitHubClient;
pub use integrations::{CommitSink, RepoSource};
pub use workflow::{StepId, WorkflowManager, WorkflowState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "gitscribe";
