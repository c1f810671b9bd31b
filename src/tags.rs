//! Release tag resolution
//!
//! [`TagSource`] abstracts the hosting service queries; the selection rules
//! (prefix stripping, malformed tag exclusion, version ordering) are plain
//! functions so they can be exercised without a network.

use anyhow::Result;
use async_trait::async_trait;
use std::cmp::Ordering;
use tracing::debug;

/// Prefix of every tag ref returned by the refs API
pub const TAG_REF_PREFIX: &str = "refs/tags/";

/// Tags containing this substring are never considered
pub const MALFORMED_TAG_PATTERN: &str = "v.";

/// One repository found by an organization scan, with its newest tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgProviderTag {
    /// `owner/repo` as reported by the API
    pub name_with_owner: String,
    pub latest_tag: String,
}

/// Outcome of looking up the latest tag of one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagLookup {
    Found(String),
    NoTags,
}

/// Source of repository and tag listings
#[async_trait]
pub trait TagSource: Send + Sync {
    /// All repositories of `org` whose name starts with `prefix` and that
    /// have at least one tag, each with its most recent tag by commit date
    async fn list_org_providers(&self, org: &str, prefix: &str) -> Result<Vec<OrgProviderTag>>;

    /// Every tag ref (`refs/tags/...`) of one repository
    async fn list_tag_refs(&self, owner: &str, repo: &str) -> Result<Vec<String>>;
}

/// Strip the leading `refs/tags/` from a ref
pub fn strip_ref_prefix(git_ref: &str) -> &str {
    git_ref.strip_prefix(TAG_REF_PREFIX).unwrap_or(git_ref)
}

/// Pick the version-sort maximum among `refs`, ignoring malformed tags
pub fn pick_latest_tag<I, S>(refs: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    refs.into_iter()
        .map(|r| strip_ref_prefix(r.as_ref()).to_string())
        .filter(|tag| !tag.is_empty() && !tag.contains(MALFORMED_TAG_PATTERN))
        .max_by(|a, b| version_cmp(a, b))
}

/// Latest qualifying tag of `owner/repo`
pub async fn latest_tag_of<S>(source: &S, owner: &str, repo: &str) -> Result<TagLookup>
where
    S: TagSource + ?Sized,
{
    let refs = source.list_tag_refs(owner, repo).await?;
    debug!("{}/{} has {} tag refs", owner, repo, refs.len());

    Ok(match pick_latest_tag(&refs) {
        Some(tag) => TagLookup::Found(tag),
        None => TagLookup::NoTags,
    })
}

/// Version-sort ordering.
///
/// Digit runs compare numerically, everything else byte-wise. Strings that
/// compare equal that way (e.g. `v01` and `v1`) fall back to byte order so
/// the ordering stays total.
pub fn version_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Chunks::new(a);
    let mut right = Chunks::new(b);

    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ord = match (l, r) {
                    (Chunk::Digits(x), Chunk::Digits(y)) => cmp_numeric(x, y),
                    (Chunk::Text(x), Chunk::Text(y)) => x.cmp(y),
                    (Chunk::Digits(_), Chunk::Text(_)) => Ordering::Less,
                    (Chunk::Text(_), Chunk::Digits(_)) => Ordering::Greater,
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn cmp_numeric(x: &str, y: &str) -> Ordering {
    let x = x.trim_start_matches('0');
    let y = y.trim_start_matches('0');
    x.len().cmp(&y.len()).then_with(|| x.cmp(y))
}

#[derive(Debug, Clone, Copy)]
enum Chunk<'a> {
    Digits(&'a str),
    Text(&'a str),
}

/// Splits a string into alternating digit and non-digit runs
struct Chunks<'a> {
    rest: &'a str,
}

impl<'a> Chunks<'a> {
    fn new(s: &'a str) -> Self {
        Self { rest: s }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .rest
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(self.rest.len());

        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;

        Some(if digits {
            Chunk::Digits(chunk)
        } else {
            Chunk::Text(chunk)
        })
    }
}
