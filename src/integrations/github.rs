//! GitHub integration.
//!
//! The pipeline reads repositories through [`RepoSource`] and commits
//! generated files through [`CommitSink`]. [`GitHubClient`] implements both
//! against the GitHub REST API.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::workflow::{RepoKey, RepoRef};

/// Default GitHub REST API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Repository visibility filter for listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    All,
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(format!("unknown visibility: {other}")),
        }
    }
}

/// Options for listing repositories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListReposOptions {
    pub visibility: Visibility,
    /// Page size, 1-100
    pub per_page: u32,
    /// Maximum number of pages fetched
    pub max_pages: u32,
}

impl Default for ListReposOptions {
    fn default() -> Self {
        Self { visibility: Visibility::All, per_page: 100, max_pages: 10 }
    }
}

/// An entry of a repository file tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    /// `blob` or `tree`
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>) -> Self {
        Self { path: path.into(), kind: "blob".to_string(), size: None }
    }

    pub fn is_file(&self) -> bool {
        self.kind == "blob"
    }
}

/// A single file to commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    pub repo: RepoKey,
    /// `/`-separated path inside the repository
    pub path: String,
    pub content: String,
    pub message: String,
    /// Target branch; the repository default when `None`
    pub branch: Option<String>,
}

/// A commit made for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub path: String,
    pub sha: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
}

/// Result type for GitHub operations.
pub type GitHubResult<T> = Result<T, GitHubError>;

/// Error types for GitHub operations.
#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    #[cfg(feature = "github")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub API error: {message} (status: {status})")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Read access to hosted repositories.
#[async_trait]
pub trait RepoSource: Send + Sync {
    /// List repositories of the authenticated user.
    async fn list_repositories(&self, options: &ListReposOptions) -> GitHubResult<Vec<RepoRef>>;

    /// Recursive file tree of the repository's default branch.
    async fn tree(&self, repo: &RepoRef) -> GitHubResult<Vec<TreeEntry>>;

    /// README contents, if the repository has one.
    async fn readme(&self, repo: &RepoRef) -> GitHubResult<Option<String>>;
}

/// Write access for committing generated files.
#[async_trait]
pub trait CommitSink: Send + Sync {
    /// Create or update one file in a single commit.
    async fn commit_file(&self, request: &CommitRequest) -> GitHubResult<CommitInfo>;
}

#[cfg(feature = "github")]
pub use client::GitHubClient;

#[cfg(feature = "github")]
mod client {
    use std::time::Duration;

    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use reqwest::{Method, RequestBuilder, Response, StatusCode};
    use serde::Deserialize;

    use super::{
        CommitInfo, CommitRequest, CommitSink, GitHubError, GitHubResult, ListReposOptions,
        RepoSource, TreeEntry,
    };
    use crate::workflow::{RepoKey, RepoRef};

    /// GitHub REST API client.
    #[derive(Debug, Clone)]
    pub struct GitHubClient {
        token: String,
        api_url: String,
        client: reqwest::Client,
    }

    impl GitHubClient {
        /// Create a client for `api_url` authenticated with `token`.
        pub fn new(
            token: impl Into<String>,
            api_url: impl Into<String>,
            timeout: Duration,
        ) -> GitHubResult<Self> {
            let token = token.into();
            if token.trim().is_empty() {
                return Err(GitHubError::InvalidInput("GitHub token is empty".to_string()));
            }
            let api_url = api_url.into().trim_end_matches('/').to_string();
            let client = reqwest::Client::builder().timeout(timeout).build()?;
            Ok(Self { token, api_url, client })
        }

        fn repo_url(&self, key: &RepoKey, path: &str) -> String {
            format!(
                "{}/repos/{}/{}/{}",
                self.api_url,
                urlencoding::encode(key.owner()),
                urlencoding::encode(key.name()),
                path
            )
        }

        /// Make an authenticated request.
        fn request(&self, method: Method, url: &str) -> RequestBuilder {
            self.request_as(method, url, "application/vnd.github+json")
        }

        fn request_as(&self, method: Method, url: &str, accept: &str) -> RequestBuilder {
            self.client
                .request(method, url)
                .header("Authorization", format!("Bearer {}", self.token))
                .header("Accept", accept)
                .header("User-Agent", crate::APP_NAME)
                .header("X-GitHub-Api-Version", "2022-11-28")
        }

        /// SHA of the existing file at `path`, if there is one.
        async fn existing_sha(
            &self,
            key: &RepoKey,
            path: &str,
            branch: Option<&str>,
        ) -> GitHubResult<Option<String>> {
            let mut url = self.repo_url(key, &format!("contents/{}", encode_path(path)));
            if let Some(branch) = branch {
                url = format!("{url}?ref={}", urlencoding::encode(branch));
            }

            let response = self.request(Method::GET, &url).send().await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !response.status().is_success() {
                return Err(parse_error(response).await);
            }

            let existing: ContentRef = response.json().await?;
            Ok(Some(existing.sha))
        }
    }

    #[async_trait]
    impl RepoSource for GitHubClient {
        async fn list_repositories(
            &self,
            options: &ListReposOptions,
        ) -> GitHubResult<Vec<RepoRef>> {
            let per_page = options.per_page.clamp(1, 100);
            let mut repos = Vec::new();

            for page in 1..=options.max_pages.max(1) {
                let url = format!(
                    "{}/user/repos?visibility={}&sort=updated&per_page={}&page={}",
                    self.api_url, options.visibility, per_page, page
                );
                let response = self.request(Method::GET, &url).send().await?;
                if !response.status().is_success() {
                    return Err(parse_error(response).await);
                }

                let batch: Vec<ApiRepo> = response.json().await?;
                let done = batch.len() < per_page as usize;
                repos.extend(batch.into_iter().map(RepoRef::from));
                if done {
                    break;
                }
            }

            tracing::debug!(count = repos.len(), "Listed repositories");
            Ok(repos)
        }

        async fn tree(&self, repo: &RepoRef) -> GitHubResult<Vec<TreeEntry>> {
            let url = self.repo_url(
                &repo.key(),
                &format!("git/trees/{}?recursive=1", urlencoding::encode(&repo.default_branch)),
            );
            let response = self.request(Method::GET, &url).send().await?;
            if !response.status().is_success() {
                return Err(parse_error(response).await);
            }

            let tree: ApiTree = response.json().await?;
            if tree.truncated {
                tracing::debug!(repo = %repo.key(), "Repository tree truncated by GitHub");
            }
            Ok(tree.tree)
        }

        async fn readme(&self, repo: &RepoRef) -> GitHubResult<Option<String>> {
            let url = self.repo_url(&repo.key(), "readme");
            let response = self
                .request_as(Method::GET, &url, "application/vnd.github.raw+json")
                .send()
                .await?;

            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !response.status().is_success() {
                return Err(parse_error(response).await);
            }
            Ok(Some(response.text().await?))
        }
    }

    #[async_trait]
    impl CommitSink for GitHubClient {
        async fn commit_file(&self, request: &CommitRequest) -> GitHubResult<CommitInfo> {
            let path = request.path.trim_matches('/');
            if path.is_empty() {
                return Err(GitHubError::InvalidInput("File path is required".to_string()));
            }
            if request.message.trim().is_empty() {
                return Err(GitHubError::InvalidInput("Commit message is required".to_string()));
            }

            let branch = request.branch.as_deref();
            let sha = self.existing_sha(&request.repo, path, branch).await?;

            let mut body = serde_json::json!({
                "message": request.message,
                "content": STANDARD.encode(request.content.as_bytes()),
            });
            if let Some(branch) = branch {
                body["branch"] = serde_json::json!(branch);
            }
            if let Some(sha) = sha {
                body["sha"] = serde_json::json!(sha);
            }

            let url = self.repo_url(&request.repo, &format!("contents/{}", encode_path(path)));
            let response = self.request(Method::PUT, &url).json(&body).send().await?;
            if !response.status().is_success() {
                return Err(parse_error(response).await);
            }

            let result: ContentResponse = response.json().await?;
            tracing::info!(repo = %request.repo, path, sha = %result.commit.sha, "Committed file");
            Ok(CommitInfo {
                path: path.to_string(),
                sha: result.commit.sha,
                html_url: result.commit.html_url,
            })
        }
    }

    fn encode_path(path: &str) -> String {
        path.split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Parse error response from GitHub API.
    async fn parse_error(response: Response) -> GitHubError {
        let status = response.status().as_u16();

        match status {
            401 => GitHubError::Unauthorized,
            403 => {
                if response
                    .headers()
                    .get("x-ratelimit-remaining")
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|s| s == "0")
                {
                    return GitHubError::RateLimited;
                }
                GitHubError::Api { status, message: "Forbidden".to_string() }
            }
            404 => GitHubError::NotFound(response.url().path().to_string()),
            _ => {
                let message = response
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
                    .unwrap_or_else(|| format!("HTTP {}", status));
                GitHubError::Api { status, message }
            }
        }
    }

    // Response types

    #[derive(Debug, Deserialize)]
    struct ApiRepo {
        id: u64,
        name: String,
        full_name: String,
        owner: ApiOwner,
        #[serde(default)]
        private: bool,
        html_url: String,
        #[serde(default)]
        default_branch: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    struct ApiOwner {
        login: String,
    }

    impl From<ApiRepo> for RepoRef {
        fn from(repo: ApiRepo) -> Self {
            Self {
                id: repo.id,
                name: repo.name,
                full_name: repo.full_name,
                owner: repo.owner.login,
                private: repo.private,
                html_url: repo.html_url,
                default_branch: repo.default_branch.unwrap_or_else(|| "main".to_string()),
            }
        }
    }

    #[derive(Debug, Deserialize)]
    struct ApiTree {
        tree: Vec<TreeEntry>,
        #[serde(default)]
        truncated: bool,
    }

    #[derive(Debug, Deserialize)]
    struct ContentRef {
        sha: String,
    }

    #[derive(Debug, Deserialize)]
    struct ContentResponse {
        commit: ApiCommit,
    }

    #[derive(Debug, Deserialize)]
    struct ApiCommit {
        sha: String,
        #[serde(default)]
        html_url: Option<String>,
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::integrations::github::Visibility;
        use mockito::{Matcher, Server};
        use serde_json::json;

        fn client(url: String) -> GitHubClient {
            GitHubClient::new("ghp_test", url, Duration::from_secs(5)).unwrap()
        }

        fn repo_json(id: u64, name: &str) -> serde_json::Value {
            json!({
                "id": id,
                "name": name,
                "full_name": format!("octo/{name}"),
                "owner": { "login": "octo" },
                "private": false,
                "html_url": format!("https://github.com/octo/{name}"),
                "default_branch": "main"
            })
        }

        #[test]
        fn test_rejects_empty_token() {
            assert!(matches!(
                GitHubClient::new(" ", "http://localhost", Duration::from_secs(1)),
                Err(GitHubError::InvalidInput(_))
            ));
        }

        #[test]
        fn test_encode_path() {
            assert_eq!(encode_path("docs/my file.md"), "docs/my%20file.md");
        }

        #[tokio::test]
        async fn test_list_repositories_pages() {
            let mut server = Server::new_async().await;
            let first = server
                .mock("GET", "/user/repos")
                .match_header("authorization", "Bearer ghp_test")
                .match_query(Matcher::AllOf(vec![
                    Matcher::UrlEncoded("page".into(), "1".into()),
                    Matcher::UrlEncoded("per_page".into(), "2".into()),
                    Matcher::UrlEncoded("visibility".into(), "public".into()),
                ]))
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(json!([repo_json(1, "one"), repo_json(2, "two")]).to_string())
                .create_async()
                .await;
            let second = server
                .mock("GET", "/user/repos")
                .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(json!([repo_json(3, "three")]).to_string())
                .create_async()
                .await;

            let options = ListReposOptions {
                visibility: Visibility::Public,
                per_page: 2,
                max_pages: 5,
            };
            let repos = client(server.url()).list_repositories(&options).await.unwrap();

            assert_eq!(repos.len(), 3);
            assert_eq!(repos[2].full_name, "octo/three");
            assert_eq!(repos[0].owner, "octo");
            first.assert_async().await;
            second.assert_async().await;
        }

        #[tokio::test]
        async fn test_list_repositories_unauthorized() {
            let mut server = Server::new_async().await;
            let _mock = server
                .mock("GET", "/user/repos")
                .match_query(Matcher::Any)
                .with_status(401)
                .create_async()
                .await;

            let err = client(server.url())
                .list_repositories(&ListReposOptions::default())
                .await
                .unwrap_err();
            assert!(matches!(err, GitHubError::Unauthorized));
        }

        #[tokio::test]
        async fn test_rate_limited() {
            let mut server = Server::new_async().await;
            let _mock = server
                .mock("GET", "/repos/octo/hello/git/trees/main")
                .match_query(Matcher::Any)
                .with_status(403)
                .with_header("x-ratelimit-remaining", "0")
                .create_async()
                .await;

            let repo = RepoRef::from_full_name("octo/hello").unwrap();
            let err = client(server.url()).tree(&repo).await.unwrap_err();
            assert!(matches!(err, GitHubError::RateLimited));
        }

        #[tokio::test]
        async fn test_tree() {
            let mut server = Server::new_async().await;
            let _mock = server
                .mock("GET", "/repos/octo/hello/git/trees/main")
                .match_query(Matcher::UrlEncoded("recursive".into(), "1".into()))
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(
                    json!({
                        "sha": "abc",
                        "tree": [
                            { "path": "src", "type": "tree" },
                            { "path": "src/main.rs", "type": "blob", "size": 120 }
                        ],
                        "truncated": false
                    })
                    .to_string(),
                )
                .create_async()
                .await;

            let repo = RepoRef::from_full_name("octo/hello").unwrap();
            let tree = client(server.url()).tree(&repo).await.unwrap();
            assert_eq!(tree.len(), 2);
            assert!(!tree[0].is_file());
            assert_eq!(tree[1].size, Some(120));
        }

        #[tokio::test]
        async fn test_readme_missing() {
            let mut server = Server::new_async().await;
            let _mock = server
                .mock("GET", "/repos/octo/hello/readme")
                .with_status(404)
                .create_async()
                .await;

            let repo = RepoRef::from_full_name("octo/hello").unwrap();
            assert_eq!(client(server.url()).readme(&repo).await.unwrap(), None);
        }

        #[tokio::test]
        async fn test_readme_raw() {
            let mut server = Server::new_async().await;
            let _mock = server
                .mock("GET", "/repos/octo/hello/readme")
                .match_header("accept", "application/vnd.github.raw+json")
                .with_status(200)
                .with_body("# Hello\n")
                .create_async()
                .await;

            let repo = RepoRef::from_full_name("octo/hello").unwrap();
            let readme = client(server.url()).readme(&repo).await.unwrap();
            assert_eq!(readme.as_deref(), Some("# Hello\n"));
        }

        #[tokio::test]
        async fn test_commit_file_updates_existing() {
            let mut server = Server::new_async().await;
            let lookup = server
                .mock("GET", "/repos/octo/hello/contents/docs/overview.md")
                .match_query(Matcher::UrlEncoded("ref".into(), "docs".into()))
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(r#"{"sha":"old-sha","path":"docs/overview.md"}"#)
                .create_async()
                .await;
            let put = server
                .mock("PUT", "/repos/octo/hello/contents/docs/overview.md")
                .match_body(Matcher::PartialJson(json!({
                    "message": "docs: update overview",
                    "content": "IyBIZWxsbwo=",
                    "branch": "docs",
                    "sha": "old-sha"
                })))
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(
                    json!({
                        "content": { "path": "docs/overview.md", "sha": "blob-sha" },
                        "commit": {
                            "sha": "new-sha",
                            "html_url": "https://github.com/octo/hello/commit/new-sha"
                        }
                    })
                    .to_string(),
                )
                .create_async()
                .await;

            let request = CommitRequest {
                repo: RepoKey::new("octo", "hello"),
                path: "docs/overview.md".to_string(),
                content: "# Hello\n".to_string(),
                message: "docs: update overview".to_string(),
                branch: Some("docs".to_string()),
            };
            let info = client(server.url()).commit_file(&request).await.unwrap();

            assert_eq!(info.path, "docs/overview.md");
            assert_eq!(info.sha, "new-sha");
            lookup.assert_async().await;
            put.assert_async().await;
        }

        #[tokio::test]
        async fn test_commit_file_creates_new() {
            let mut server = Server::new_async().await;
            let _lookup = server
                .mock("GET", "/repos/octo/hello/contents/README.md")
                .with_status(404)
                .create_async()
                .await;
            let put = server
                .mock("PUT", "/repos/octo/hello/contents/README.md")
                .with_status(201)
                .with_header("content-type", "application/json")
                .with_body(r#"{"content":{"path":"README.md"},"commit":{"sha":"c1"}}"#)
                .create_async()
                .await;

            let request = CommitRequest {
                repo: RepoKey::new("octo", "hello"),
                path: "README.md".to_string(),
                content: "hi".to_string(),
                message: "docs: add readme".to_string(),
                branch: None,
            };
            let info = client(server.url()).commit_file(&request).await.unwrap();
            assert_eq!(info.sha, "c1");
            assert_eq!(info.html_url, None);
            put.assert_async().await;
        }

        #[tokio::test]
        async fn test_commit_file_requires_message() {
            let request = CommitRequest {
                repo: RepoKey::new("octo", "hello"),
                path: "README.md".to_string(),
                content: String::new(),
                message: " ".to_string(),
                branch: None,
            };
            let err =
                client("http://127.0.0.1:9".to_string()).commit_file(&request).await.unwrap_err();
            assert!(matches!(err, GitHubError::InvalidInput(_)));
        }
    }
}
