//! Provider identifiers shared by the resolver, reconciler and renderer

use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

static SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("static regex"));

/// Malformed `owner/repo` string
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("'{0}' is not of the form owner/repo")]
    MissingSeparator(String),
    #[error("'{0}' has an empty or invalid owner or repository name")]
    InvalidSegment(String),
}

/// An `owner/repo` pair on GitHub
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Slug {
    pub owner: String,
    pub repo: String,
}

impl Slug {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl FromStr for Slug {
    type Err = SlugError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (owner, repo) = s
            .split_once('/')
            .ok_or_else(|| SlugError::MissingSeparator(s.to_string()))?;

        if !SEGMENT.is_match(owner) || !SEGMENT.is_match(repo) {
            return Err(SlugError::InvalidSegment(s.to_string()));
        }

        Ok(Self::new(owner, repo))
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// A provider repository pinned to a release tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRef {
    pub org: String,
    pub repo: String,
    pub revision: String,
}

impl ProviderRef {
    pub fn new(slug: Slug, revision: impl Into<String>) -> Self {
        Self {
            org: slug.owner,
            repo: slug.repo,
            revision: revision.into(),
        }
    }

    /// `org/repo`, the form blacklist entries are written in
    pub fn slug(&self) -> String {
        format!("{}/{}", self.org, self.repo)
    }
}

impl fmt::Display for ProviderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.org, self.repo, self.revision)
    }
}
