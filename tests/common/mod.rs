//! Common test utilities and fakes for tf-provider-index tests
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use tf_provider_index::tags::OrgProviderTag;
use tf_provider_index::{ArchiveFetcher, TagSource};

/// In-memory tag source
#[derive(Default)]
pub struct FakeTagSource {
    orgs: HashMap<String, Vec<OrgProviderTag>>,
    refs: HashMap<String, Vec<String>>,
}

impl FakeTagSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_org_repo(mut self, org: &str, repo: &str, latest_tag: &str) -> Self {
        self.orgs.entry(org.to_string()).or_default().push(OrgProviderTag {
            name_with_owner: format!("{}/{}", org, repo),
            latest_tag: latest_tag.to_string(),
        });
        self
    }

    pub fn with_tags(mut self, owner: &str, repo: &str, tags: &[&str]) -> Self {
        self.refs.insert(
            format!("{}/{}", owner, repo),
            tags.iter().map(|t| format!("refs/tags/{}", t)).collect(),
        );
        self
    }
}

#[async_trait]
impl TagSource for FakeTagSource {
    async fn list_org_providers(&self, org: &str, prefix: &str) -> Result<Vec<OrgProviderTag>> {
        let rows = self
            .orgs
            .get(org)
            .ok_or_else(|| anyhow!("Organization not found: {}", org))?;

        Ok(rows
            .iter()
            .filter(|row| {
                row.name_with_owner
                    .split_once('/')
                    .is_some_and(|(_, repo)| repo.starts_with(prefix))
            })
            .cloned()
            .collect())
    }

    async fn list_tag_refs(&self, owner: &str, repo: &str) -> Result<Vec<String>> {
        Ok(self
            .refs
            .get(&format!("{}/{}", owner, repo))
            .cloned()
            .unwrap_or_default())
    }
}

/// Fetcher returning a fixed hash per `owner/repo@rev`, counting calls
#[derive(Default)]
pub struct StaticFetcher {
    hashes: HashMap<String, String>,
    default_hash: Option<String>,
    calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn always(hash: &str) -> Self {
        Self {
            default_hash: Some(hash.to_string()),
            ..Self::default()
        }
    }

    pub fn with_hash(mut self, owner: &str, repo: &str, rev: &str, hash: &str) -> Self {
        self.hashes
            .insert(format!("{}/{}@{}", owner, repo, rev), hash.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArchiveFetcher for StaticFetcher {
    async fn fetch(&self, owner: &str, repo: &str, revision: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.hashes
            .get(&format!("{}/{}@{}", owner, repo, revision))
            .or(self.default_hash.as_ref())
            .cloned()
            .ok_or_else(|| anyhow!("no archive for {}/{} at {}", owner, repo, revision))
    }
}

/// Write a config file into `dir` and return its path
pub fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("config.yml");
    std::fs::write(&path, content).expect("Failed to write test config");
    path
}

/// Assertion helpers for test validation
pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}
