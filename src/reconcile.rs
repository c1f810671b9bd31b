//! Provider list reconciliation
//!
//! Gathers candidates from organization scans and explicit repositories,
//! drops blacklisted entries and orders the rest by repository name.

use anyhow::{Context, Result};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::provider::{ProviderRef, Slug};
use crate::tags::{latest_tag_of, TagLookup, TagSource};

/// `owner/repo` entries that never reach the manifest
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    entries: HashSet<String>,
}

impl Blacklist {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    /// Exact, case-sensitive `org/repo` match
    pub fn contains(&self, provider: &ProviderRef) -> bool {
        self.entries.contains(&provider.slug())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of a reconciliation run
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Providers to render, ordered by repository name
    pub providers: Vec<ProviderRef>,
    /// Explicit repositories without a qualifying tag
    pub untagged: Vec<Slug>,
    /// Providers removed by the blacklist
    pub excluded: Vec<ProviderRef>,
}

/// Drop blacklisted providers and stable-sort the rest by repository name.
///
/// Returns `(kept, excluded)`.
pub fn reconcile(
    candidates: Vec<ProviderRef>,
    blacklist: &Blacklist,
) -> (Vec<ProviderRef>, Vec<ProviderRef>) {
    let (excluded, mut kept): (Vec<_>, Vec<_>) =
        candidates.into_iter().partition(|p| blacklist.contains(p));

    kept.sort_by(|a, b| a.repo.cmp(&b.repo));
    (kept, excluded)
}

/// Resolves the full provider list against a [`TagSource`]
pub struct Reconciler<'a, S: TagSource + ?Sized> {
    source: &'a S,
    prefix: &'a str,
}

impl<'a, S: TagSource + ?Sized> Reconciler<'a, S> {
    pub fn new(source: &'a S, prefix: &'a str) -> Self {
        Self { source, prefix }
    }

    /// Scan `orgs`, look up each explicit slug, then filter and sort.
    ///
    /// A repository listed both in a scanned organization and in `slugs`
    /// appears twice.
    pub async fn resolve_all(
        &self,
        orgs: &[String],
        slugs: &[Slug],
        blacklist: &Blacklist,
    ) -> Result<Resolution> {
        let mut candidates = Vec::new();

        for org in orgs {
            let found = self.source.list_org_providers(org, self.prefix).await?;
            for row in found {
                let slug: Slug = row
                    .name_with_owner
                    .parse()
                    .with_context(|| format!("Unexpected repository name from organization {}", org))?;
                candidates.push(ProviderRef::new(slug, row.latest_tag));
            }
        }

        let mut untagged = Vec::new();
        for slug in slugs {
            match latest_tag_of(self.source, &slug.owner, &slug.repo).await? {
                TagLookup::Found(tag) => {
                    debug!("Latest tag of {} is {}", slug, tag);
                    candidates.push(ProviderRef::new(slug.clone(), tag));
                }
                TagLookup::NoTags => {
                    warn!("Skipping {}: no release tags found", slug);
                    untagged.push(slug.clone());
                }
            }
        }

        let total = candidates.len();
        let (providers, excluded) = reconcile(candidates, blacklist);

        info!(
            "Resolved {} providers ({} candidates, {} blacklisted, {} without tags)",
            providers.len(),
            total,
            excluded.len(),
            untagged.len()
        );

        Ok(Resolution {
            providers,
            untagged,
            excluded,
        })
    }
}
