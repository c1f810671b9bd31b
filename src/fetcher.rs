//! Archive fetching and content hashing
//!
//! The default fetcher shells out to `nix-prefetch-url --unpack`, which
//! downloads the tarball for a tag, unpacks it and prints the hash of the
//! unpacked tree.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

use crate::config::FetchConfig;
use crate::retry::RetryPolicy;

/// Fetches an archive of `owner/repo` at `revision` and returns its content hash
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    async fn fetch(&self, owner: &str, repo: &str, revision: &str) -> Result<String>;
}

/// Runs an external prefetch command for every archive
#[derive(Debug, Clone)]
pub struct PrefetchCommand {
    program: String,
    args: Vec<String>,
    url_template: String,
}

impl PrefetchCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>, url_template: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            url_template: url_template.into(),
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(&config.command, config.args.clone(), &config.url_template)
    }

    /// Tarball URL for one revision
    pub fn archive_url(&self, owner: &str, repo: &str, revision: &str) -> String {
        self.url_template
            .replace("{owner}", owner)
            .replace("{repo}", repo)
            .replace("{rev}", revision)
    }
}

#[async_trait]
impl ArchiveFetcher for PrefetchCommand {
    async fn fetch(&self, owner: &str, repo: &str, revision: &str) -> Result<String> {
        let url = self.archive_url(owner, repo, revision);
        debug!("Running {} {:?} {}", self.program, self.args, url);

        let output = AsyncCommand::new(&self.program)
            .args(&self.args)
            .arg(&url)
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", self.program))?;

        if !output.status.success() {
            return Err(anyhow!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let hash = String::from_utf8(output.stdout)
            .with_context(|| format!("{} printed invalid UTF-8", self.program))?
            .trim()
            .to_string();

        if hash.is_empty() {
            return Err(anyhow!("{} printed no hash for {}", self.program, url));
        }

        Ok(hash)
    }
}

/// Retries every fetch of the wrapped fetcher under a [`RetryPolicy`]
pub struct RetryingFetcher<F> {
    inner: F,
    policy: RetryPolicy,
    label: String,
}

impl<F: ArchiveFetcher> RetryingFetcher<F> {
    pub fn new(inner: F, policy: RetryPolicy, label: impl Into<String>) -> Self {
        Self {
            inner,
            policy,
            label: label.into(),
        }
    }
}

#[async_trait]
impl<F: ArchiveFetcher> ArchiveFetcher for RetryingFetcher<F> {
    async fn fetch(&self, owner: &str, repo: &str, revision: &str) -> Result<String> {
        let inner = &self.inner;
        let hash = self
            .policy
            .run(&self.label, move |_| inner.fetch(owner, repo, revision))
            .await?;
        Ok(hash)
    }
}
