use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub registry: RegistryConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfig {
    /// SQLite database holding records, work items, and the revision pointer.
    pub db_path: PathBuf,
    /// Directory the object-store sink writes document bodies into.
    pub object_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// `owner/name` of the source-of-truth repository.
    pub repository: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_reference")]
    pub reference: String,
    /// Optional path prefix scoping the sync to a subdirectory.
    #[serde(default)]
    pub root: String,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Environment variable holding the API token, if any.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_base_url() -> String {
    "https://api.github.com".to_string()
}
fn default_reference() -> String {
    "main".to_string()
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.markdown".to_string()]
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Concurrent content fetches per batch.
    #[serde(default = "default_fetch_batch_size")]
    pub fetch_batch_size: usize,
    /// Registry writes/deletes per batch.
    #[serde(default = "default_write_batch_size")]
    pub write_batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fetch_batch_size: default_fetch_batch_size(),
            write_batch_size: default_write_batch_size(),
        }
    }
}

fn default_fetch_batch_size() -> usize {
    crate::fetch::DEFAULT_FETCH_BATCH
}
fn default_write_batch_size() -> usize {
    crate::reconcile::DEFAULT_WRITE_BATCH
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if !config.source.repository.contains('/') {
        anyhow::bail!(
            "source.repository must be owner/name, got '{}'",
            config.source.repository
        );
    }

    if config.sync.fetch_batch_size == 0 {
        anyhow::bail!("sync.fetch_batch_size must be > 0");
    }
    if config.sync.write_batch_size == 0 {
        anyhow::bail!("sync.write_batch_size must be > 0");
    }
    if config.source.timeout_secs == 0 {
        anyhow::bail!("source.timeout_secs must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [registry]
            db_path = "data/policy.sqlite"
            object_dir = "data/objects"

            [source]
            repository = "acme/policies"
            "#,
        )
        .unwrap();

        assert_eq!(config.source.base_url, "https://api.github.com");
        assert_eq!(config.source.reference, "main");
        assert_eq!(config.sync.fetch_batch_size, 40);
        assert_eq!(config.sync.write_batch_size, 100);
        assert_eq!(config.source.token_env, "GITHUB_TOKEN");
    }
}
