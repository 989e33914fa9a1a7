use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;

use super::{ClientResult, check_status, decode_json, transport};

const SERVICE: &str = "GitSee";

/// Datasets GitSee is asked to build for a repository.
const GITSEE_DATA: &[&str] = &["repo_info", "contributors", "icon", "files", "stats"];

#[async_trait]
pub trait GitSeeClient: Send + Sync {
    /// Ask the swarm's GitSee server to analyse `owner/repo`.
    async fn trigger(
        &self,
        swarm_url: &str,
        swarm_api_key: &str,
        owner: &str,
        repo: &str,
    ) -> ClientResult<Value>;
}

#[derive(Clone, Default)]
pub struct HttpGitSeeClient {
    http: reqwest::Client,
}

impl HttpGitSeeClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GitSeeClient for HttpGitSeeClient {
    async fn trigger(
        &self,
        swarm_url: &str,
        swarm_api_key: &str,
        owner: &str,
        repo: &str,
    ) -> ClientResult<Value> {
        let body = serde_json::json!({
            "owner": owner,
            "repo": repo,
            "data": GITSEE_DATA,
        });
        let resp = self
            .http
            .post(format!("{}/gitsee", swarm_url.trim_end_matches('/')))
            .header("x-api-token", swarm_api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport(SERVICE))?;
        let resp = check_status(SERVICE, resp).await?;
        decode_json(SERVICE, resp).await
    }
}

/// Extract `(owner, repo)` from a GitHub repository URL.
///
/// Accepts `https://github.com/owner/repo[.git]`, token-embedded HTTPS URLs,
/// `git@github.com:owner/repo.git` and trailing paths such as `/tree/main`.
/// The host must be `github.com` or `www.github.com`.
pub fn parse_github_repo(url: &str) -> Option<(String, String)> {
    let url = url.trim();
    if let Some(rest) = url.strip_prefix("git@github.com:") {
        return owner_and_repo(rest.split('/'));
    }

    let parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "https" | "http") {
        return None;
    }
    if !matches!(parsed.host_str(), Some("github.com" | "www.github.com")) {
        return None;
    }
    owner_and_repo(parsed.path_segments()?)
}

fn owner_and_repo<'a>(mut segments: impl Iterator<Item = &'a str>) -> Option<(String, String)> {
    let owner = segments.next().filter(|s| !s.is_empty())?;
    let repo = segments.next().filter(|s| !s.is_empty())?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    if repo.is_empty() {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}
