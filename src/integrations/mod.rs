//! External integrations module.
//!
//! Hosted git services the pipeline reads from and commits to.

pub mod github;

pub use github::{
    CommitInfo, CommitRequest, CommitSink, GitHubError, GitHubResult, ListReposOptions,
    RepoSource, TreeEntry, Visibility, DEFAULT_API_URL,
};

#[cfg(feature = "github")]
pub use github::GitHubClient;
