//! A `RepoFetcher` backed by the GitHub REST API: the git trees endpoint for
//! the file tree, the contents endpoint for individual files, and the
//! readme endpoint for the top-level README. Grounded on the pack's
//! reqwest-plus-GitHub-API pattern (api.github.com with a bearer token and a
//! required `User-Agent` header).

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;

use super::RepoFile;
use crate::domain::job::{Job, PathFilters};
use crate::error::{Error, Result};

const USER_AGENT: &str = "deepwiki-core";
const MAX_FETCHED_FILES: usize = 2000;
const MAX_FILE_BYTES: usize = 400_000;

pub struct GithubRepoFetcher {
    client: Client,
    api_base: String,
}

impl Default for GithubRepoFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl GithubRepoFetcher {
    pub fn new() -> Self {
        crate::ensure_crypto_provider();
        Self { client: Client::new(), api_base: "https://api.github.com".to_string() }
    }

    #[cfg(test)]
    fn with_api_base(api_base: impl Into<String>) -> Self {
        crate::ensure_crypto_provider();
        Self { client: Client::new(), api_base: api_base.into() }
    }

    fn request(&self, job: &Job, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(format!("{}{path}", self.api_base)).header("User-Agent", USER_AGENT);
        if let Some(token) = &job.access_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        req
    }
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    content: Option<String>,
    encoding: Option<String>,
    size: u64,
}

#[derive(Debug, Deserialize)]
struct ReadmeResponse {
    content: Option<String>,
    encoding: Option<String>,
}

fn is_included(path: &str, filters: &PathFilters) -> bool {
    let segments: Vec<&str> = path.split('/').collect();

    if filters.excluded_dirs.iter().any(|d| segments.iter().any(|s| s == d)) {
        return false;
    }
    if filters.excluded_files.iter().any(|f| path.ends_with(f.as_str())) {
        return false;
    }
    if !filters.included_dirs.is_empty() && !filters.included_dirs.iter().any(|d| segments.iter().any(|s| s == d)) {
        return false;
    }
    if !filters.included_files.is_empty() && !filters.included_files.iter().any(|f| path.ends_with(f.as_str())) {
        return false;
    }
    true
}

fn decode_base64_content(content: &str, encoding: Option<&str>) -> Result<String> {
    if encoding != Some("base64") {
        return Err(Error::Other(format!("unsupported content encoding: {encoding:?}")));
    }
    let cleaned: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(cleaned)
        .map_err(|e| Error::Other(format!("failed to decode base64 content: {e}")))?;
    String::from_utf8(bytes).map_err(|e| Error::Other(format!("file is not valid utf-8: {e}")))
}

#[async_trait]
impl super::RepoFetcher for GithubRepoFetcher {
    async fn file_tree(&self, job: &Job) -> Result<Vec<String>> {
        let path = format!("/repos/{}/{}/git/trees/HEAD?recursive=1", job.owner, job.repo);
        let response = self.request(job, &path).send().await?;
        if !response.status().is_success() {
            return Err(Error::Other(format!("github tree request failed: {}", response.status())));
        }
        let body: TreeResponse = response.json().await?;
        if body.truncated {
            tracing::warn!(owner = %job.owner, repo = %job.repo, "github tree response truncated, file list may be incomplete");
        }

        let files = body
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob")
            .map(|entry| entry.path)
            .filter(|path| is_included(path, &job.filters))
            .take(MAX_FETCHED_FILES)
            .collect();
        Ok(files)
    }

    async fn readme(&self, job: &Job) -> Result<Option<String>> {
        let path = format!("/repos/{}/{}/readme", job.owner, job.repo);
        let response = self.request(job, &path).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::Other(format!("github readme request failed: {}", response.status())));
        }
        let body: ReadmeResponse = response.json().await?;
        match body.content {
            Some(content) => Ok(Some(decode_base64_content(&content, body.encoding.as_deref())?)),
            None => Ok(None),
        }
    }

    async fn fetch_files(&self, job: &Job) -> Result<Vec<RepoFile>> {
        let paths = self.file_tree(job).await?;
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let contents_path = format!("/repos/{}/{}/contents/{path}", job.owner, job.repo);
            let response = self.request(job, &contents_path).send().await?;
            if !response.status().is_success() {
                tracing::warn!(%path, status = %response.status(), "skipping file that failed to fetch");
                continue;
            }
            let body: ContentsResponse = response.json().await?;
            if body.size as usize > MAX_FILE_BYTES {
                tracing::debug!(%path, size = body.size, "skipping oversized file");
                continue;
            }
            let Some(content) = body.content else { continue };
            match decode_base64_content(&content, body.encoding.as_deref()) {
                Ok(text) => files.push(RepoFile { path, contents: text }),
                Err(_) => continue, // binary or non-utf8 file, not useful for chunking
            }
        }
        Ok(files)
    }
}
