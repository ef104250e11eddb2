//! Source-host API client: file tree, file contents, recent commits, diffs.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const USER_AGENT: &str = concat!("aufnahme/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum SourceHostError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} — {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("not a recognizable repository URL: {0}")]
    BadUrl(String),
}

/// `owner/name` pair identifying one repository on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    /// Parse from a browse URL like `https://github.com/acme/widgets`
    /// (trailing `.git` and path segments are tolerated).
    pub fn parse(url: &str) -> Result<Self, SourceHostError> {
        let stripped = url
            .trim_end_matches('/')
            .splitn(2, "://")
            .last()
            .unwrap_or(url);
        let mut parts = stripped.split('/').skip(1); // hostname
        let owner = parts.next().filter(|s| !s.is_empty());
        let name = parts.next().filter(|s| !s.is_empty());
        match (owner, name) {
            (Some(owner), Some(name)) => Ok(Self {
                owner: owner.to_string(),
                name: name.trim_end_matches(".git").to_string(),
            }),
            _ => Err(SourceHostError::BadUrl(url.to_string())),
        }
    }

    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// One file in the repository tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoFile {
    pub path: String,
    pub size: u64,
}

/// One commit as listed by the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitInfo {
    pub hash: String,
    pub message: String,
    pub author_name: String,
    pub author_avatar_url: Option<String>,
    pub date: DateTime<Utc>,
}

/// Trait over the repository provider's read API.
#[async_trait]
pub trait SourceHost: Send + Sync {
    async fn list_files(&self, repo: &RepoRef) -> Result<Vec<RepoFile>, SourceHostError>;

    async fn fetch_file(&self, repo: &RepoRef, path: &str) -> Result<String, SourceHostError>;

    async fn recent_commits(
        &self,
        repo: &RepoRef,
        limit: u32,
    ) -> Result<Vec<CommitInfo>, SourceHostError>;

    /// Raw unified diff for one commit. Callers bound the size before use.
    async fn diff(&self, repo: &RepoRef, hash: &str) -> Result<String, SourceHostError>;
}

/// GitHub REST backend.
pub struct GithubHost {
    client: Client,
    api_base: String,
    token: Option<String>,
}

impl GithubHost {
    pub fn new(api_base: String, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_base,
            token,
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(url).header("User-Agent", USER_AGENT);
        if let Some(ref token) = self.token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        req
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value, SourceHostError> {
        debug!(url, "source host request");
        let response = self.get(url).send().await?;
        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceHostError::Api { status, body });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl SourceHost for GithubHost {
    async fn list_files(&self, repo: &RepoRef) -> Result<Vec<RepoFile>, SourceHostError> {
        let url = format!(
            "{}/repos/{}/{}/git/trees/HEAD?recursive=1",
            self.api_base, repo.owner, repo.name
        );
        let resp = self.get_json(&url).await?;
        let tree = resp["tree"]
            .as_array()
            .ok_or_else(|| SourceHostError::Parse("missing tree array".into()))?;

        Ok(tree
            .iter()
            .filter(|entry| entry["type"].as_str() == Some("blob"))
            .filter_map(|entry| {
                entry["path"].as_str().map(|path| RepoFile {
                    path: path.to_string(),
                    size: entry["size"].as_u64().unwrap_or(0),
                })
            })
            .collect())
    }

    async fn fetch_file(&self, repo: &RepoRef, path: &str) -> Result<String, SourceHostError> {
        let url = format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base, repo.owner, repo.name, path
        );
        let resp = self.get_json(&url).await?;
        let content = resp["content"]
            .as_str()
            .ok_or_else(|| SourceHostError::Parse(format!("no content for {path}")))?;

        // The host wraps base64 payloads at 60 columns.
        let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| SourceHostError::Parse(format!("base64 decode for {path}: {e}")))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn recent_commits(
        &self,
        repo: &RepoRef,
        limit: u32,
    ) -> Result<Vec<CommitInfo>, SourceHostError> {
        let url = format!(
            "{}/repos/{}/{}/commits?per_page={}",
            self.api_base, repo.owner, repo.name, limit
        );
        let resp = self.get_json(&url).await?;
        let commits = resp
            .as_array()
            .ok_or_else(|| SourceHostError::Parse("expected commit array".into()))?;

        commits
            .iter()
            .map(|c| {
                let hash = c["sha"]
                    .as_str()
                    .ok_or_else(|| SourceHostError::Parse("commit missing sha".into()))?
                    .to_string();
                let date = c["commit"]["author"]["date"]
                    .as_str()
                    .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
                    .map(|d| d.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now);
                Ok(CommitInfo {
                    hash,
                    message: c["commit"]["message"].as_str().unwrap_or_default().to_string(),
                    author_name: c["commit"]["author"]["name"]
                        .as_str()
                        .unwrap_or("unknown")
                        .to_string(),
                    author_avatar_url: c["author"]["avatar_url"].as_str().map(String::from),
                    date,
                })
            })
            .collect()
    }

    async fn diff(&self, repo: &RepoRef, hash: &str) -> Result<String, SourceHostError> {
        let url = format!(
            "{}/repos/{}/{}/commits/{}",
            self.api_base, repo.owner, repo.name, hash
        );
        let response = self
            .get(&url)
            .header("Accept", "application/vnd.github.diff")
            .send()
            .await?;
        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceHostError::Api { status, body });
        }
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_browse_urls() {
        let repo = RepoRef::parse("https://github.com/acme/widgets").unwrap();
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.name, "widgets");
        assert_eq!(repo.slug(), "acme/widgets");
    }

    #[test]
    fn tolerates_git_suffix_and_trailing_slash() {
        let repo = RepoRef::parse("https://github.com/acme/widgets.git/").unwrap();
        assert_eq!(repo.name, "widgets");
    }

    #[test]
    fn rejects_urls_without_owner_and_name() {
        assert!(RepoRef::parse("https://github.com/").is_err());
        assert!(RepoRef::parse("https://github.com/acme").is_err());
    }
}
