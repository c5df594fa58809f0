//! GitHub-backed source repository.
//!
//! Implements [`SourceRepository`] over the GitHub REST API:
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | `latest_revision` | `GET /repos/{repo}/commits/{ref}` |
//! | `diff` | `GET /repos/{repo}/compare/{from}...{to}` (paginated) |
//! | `tree` | `GET /repos/{repo}/git/trees/{rev}?recursive=1` |
//! | `content` | `GET /repos/{repo}/git/blobs/{sha}` (base64) |
//!
//! Version tokens are blob SHAs, assigned by the source and never
//! interpreted here. HTTP failures are classified into the
//! [`SourceError`] taxonomy — 404 is not-found (a hard failure for the
//! run), 403/429 rate-limited, 5xx and network errors transient — and the
//! retryable classes are retried with exponential backoff (1s, 2s, 4s, …
//! capped at 2^5) before the error is surfaced.
//!
//! The adapter also scopes paths to the configured `root` prefix and
//! include/exclude globs, so the engine only ever sees the policy
//! subtree it is responsible for.
//!
//! Credentials are read from the environment variable named by
//! `source.token_env` (default `GITHUB_TOKEN`); anonymous access works
//! for public repositories at a lower rate limit.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::SourceConfig;
use crate::error::SourceError;
use crate::models::{DiffEntry, DiffStatus, EntryKind, TreeEntry};
use crate::traits::SourceRepository;

/// Compare-endpoint page size.
const COMPARE_PAGE: usize = 100;

pub struct GitHubSource {
    client: reqwest::Client,
    base_url: String,
    repository: String,
    token: Option<String>,
    max_retries: u32,
    root: String,
    include: GlobSet,
    exclude: GlobSet,
}

impl GitHubSource {
    pub fn new(config: &SourceConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("policy-sync")
            .build()?;

        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.is_empty());

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            repository: config.repository.clone(),
            token,
            max_retries: config.max_retries,
            root: config.root.trim_matches('/').to_string(),
            include: build_globset(&config.include_globs)?,
            exclude: build_globset(&config.exclude_globs)?,
        })
    }

    fn repo_url(&self, tail: &str) -> String {
        format!("{}/repos/{}/{}", self.base_url, self.repository, tail)
    }

    /// Whether a repository path falls inside the configured scope.
    fn in_scope(&self, path: &str) -> bool {
        let relative = if self.root.is_empty() {
            path
        } else {
            match path
                .strip_prefix(&self.root)
                .and_then(|rest| rest.strip_prefix('/'))
            {
                Some(rest) => rest,
                None => return false,
            }
        };
        if self.exclude.is_match(relative) {
            return false;
        }
        self.include.is_match(relative)
    }

    /// GET a JSON document with backoff for retryable failure classes.
    async fn get_json(&self, url: &str) -> Result<serde_json::Value, SourceError> {
        let mut last_err = SourceError::Other(format!("no attempt made for {}", url));

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .client
                .get(url)
                .header("Accept", "application/vnd.github+json");
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json().await.map_err(|e| {
                            SourceError::Other(format!("invalid response from {}: {}", url, e))
                        });
                    }
                    let err = classify_status(status.as_u16(), url);
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    last_err = err;
                }
                Err(e) => {
                    last_err = SourceError::Transient(format!("{}: {}", url, e));
                }
            }
        }

        Err(last_err)
    }
}

#[async_trait]
impl SourceRepository for GitHubSource {
    async fn latest_revision(&self, reference: &str) -> Result<String, SourceError> {
        let url = self.repo_url(&format!("commits/{}", reference));
        let json = self.get_json(&url).await?;
        json.get("sha")
            .and_then(|s| s.as_str())
            .map(str::to_string)
            .ok_or_else(|| SourceError::Other(format!("missing sha in response from {}", url)))
    }

    async fn diff(&self, from: &str, to: &str) -> Result<Vec<DiffEntry>, SourceError> {
        let mut entries = Vec::new();
        let mut page = 1;

        loop {
            let url = self.repo_url(&format!(
                "compare/{}...{}?per_page={}&page={}",
                from, to, COMPARE_PAGE, page
            ));
            let json = self.get_json(&url).await?;
            let files = json
                .get("files")
                .and_then(|f| f.as_array())
                .cloned()
                .unwrap_or_default();
            let count = files.len();

            for file in &files {
                let Some(path) = file.get("filename").and_then(|v| v.as_str()) else {
                    continue;
                };
                let Some(status) = file
                    .get("status")
                    .and_then(|v| v.as_str())
                    .and_then(parse_diff_status)
                else {
                    continue;
                };
                if !self.in_scope(path) {
                    continue;
                }
                entries.push(DiffEntry {
                    path: path.to_string(),
                    status,
                    version_token: file
                        .get("sha")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    previous_path: file
                        .get("previous_filename")
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                });
            }

            if count < COMPARE_PAGE {
                break;
            }
            page += 1;
        }

        Ok(entries)
    }

    async fn tree(&self, revision: &str, recursive: bool) -> Result<Vec<TreeEntry>, SourceError> {
        let tail = if recursive {
            format!("git/trees/{}?recursive=1", revision)
        } else {
            format!("git/trees/{}", revision)
        };
        let url = self.repo_url(&tail);
        let json = self.get_json(&url).await?;

        if json.get("truncated").and_then(|t| t.as_bool()) == Some(true) {
            return Err(SourceError::Transient(format!(
                "tree listing truncated for revision {}",
                revision
            )));
        }

        let raw = json
            .get("tree")
            .and_then(|t| t.as_array())
            .cloned()
            .unwrap_or_default();

        let mut entries = Vec::new();
        for item in &raw {
            let Some(path) = item.get("path").and_then(|v| v.as_str()) else {
                continue;
            };
            if item.get("type").and_then(|v| v.as_str()) != Some("blob") {
                continue;
            }
            if !self.in_scope(path) {
                continue;
            }
            entries.push(TreeEntry {
                path: path.to_string(),
                kind: EntryKind::Blob,
                version_token: item
                    .get("sha")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            });
        }

        Ok(entries)
    }

    async fn content(&self, version_token: &str) -> Result<Vec<u8>, SourceError> {
        let url = self.repo_url(&format!("git/blobs/{}", version_token));
        let json = self.get_json(&url).await?;
        parse_blob_content(&json)
            .ok_or_else(|| SourceError::Other(format!("undecodable blob response from {}", url)))
    }
}

fn parse_diff_status(status: &str) -> Option<DiffStatus> {
    match status {
        "added" | "copied" => Some(DiffStatus::Added),
        "modified" | "changed" => Some(DiffStatus::Modified),
        "removed" => Some(DiffStatus::Removed),
        "renamed" => Some(DiffStatus::Renamed),
        // "unchanged" and anything unknown carry no change.
        _ => None,
    }
}

/// Decode a blob response body. GitHub base64-wraps content at 60 columns,
/// so whitespace is stripped before decoding.
fn parse_blob_content(json: &serde_json::Value) -> Option<Vec<u8>> {
    let content = json.get("content")?.as_str()?;
    match json.get("encoding").and_then(|e| e.as_str()) {
        Some("base64") => {
            let cleaned: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            BASE64.decode(cleaned).ok()
        }
        _ => Some(content.as_bytes().to_vec()),
    }
}

fn classify_status(status: u16, url: &str) -> SourceError {
    match status {
        404 => SourceError::NotFound(url.to_string()),
        403 | 429 => SourceError::RateLimited(format!("HTTP {} from {}", status, url)),
        500..=599 => SourceError::Transient(format!("HTTP {} from {}", status, url)),
        other => SourceError::Other(format!("HTTP {} from {}", other, url)),
    }
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_with(root: &str, include: &[&str], exclude: &[&str]) -> GitHubSource {
        let config = SourceConfig {
            repository: "acme/policies".to_string(),
            base_url: "https://api.github.com".to_string(),
            reference: "main".to_string(),
            root: root.to_string(),
            include_globs: include.iter().map(|s| s.to_string()).collect(),
            exclude_globs: exclude.iter().map(|s| s.to_string()).collect(),
            token_env: "POLICY_SYNC_TEST_TOKEN_UNSET".to_string(),
            timeout_secs: 30,
            max_retries: 5,
        };
        GitHubSource::new(&config).unwrap()
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(404, "u"),
            SourceError::NotFound(_)
        ));
        assert!(matches!(
            classify_status(429, "u"),
            SourceError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(403, "u"),
            SourceError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(503, "u"),
            SourceError::Transient(_)
        ));
        assert!(matches!(classify_status(422, "u"), SourceError::Other(_)));
    }

    #[test]
    fn diff_status_mapping() {
        assert_eq!(parse_diff_status("added"), Some(DiffStatus::Added));
        assert_eq!(parse_diff_status("copied"), Some(DiffStatus::Added));
        assert_eq!(parse_diff_status("modified"), Some(DiffStatus::Modified));
        assert_eq!(parse_diff_status("changed"), Some(DiffStatus::Modified));
        assert_eq!(parse_diff_status("removed"), Some(DiffStatus::Removed));
        assert_eq!(parse_diff_status("renamed"), Some(DiffStatus::Renamed));
        assert_eq!(parse_diff_status("unchanged"), None);
    }

    #[test]
    fn scope_applies_root_prefix_and_globs() {
        let source = source_with("policies", &["**/*.md"], &["drafts/**"]);
        assert!(source.in_scope("policies/aml.md"));
        assert!(source.in_scope("policies/eu/gdpr.md"));
        assert!(!source.in_scope("docs/aml.md"));
        assert!(!source.in_scope("policies/drafts/wip.md"));
        assert!(!source.in_scope("policies/build.sh"));
        assert!(!source.in_scope("policies"));
    }

    #[test]
    fn empty_root_scopes_whole_repository() {
        let source = source_with("", &["**/*.md", "**/*.markdown"], &[]);
        assert!(source.in_scope("aml.md"));
        assert!(source.in_scope("deep/nested/kyc.markdown"));
        assert!(!source.in_scope("script.py"));
    }

    #[test]
    fn blob_decoding_handles_wrapped_base64() {
        let json = serde_json::json!({
            "content": "IyBB\nTUwg\nUG9s\naWN5\n",
            "encoding": "base64",
        });
        assert_eq!(parse_blob_content(&json).unwrap(), b"# AML Policy");

        let plain = serde_json::json!({
            "content": "raw text",
            "encoding": "utf-8",
        });
        assert_eq!(parse_blob_content(&plain).unwrap(), b"raw text");
    }
}
