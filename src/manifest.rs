//! Manifest rendering
//!
//! The manifest is a Nix attribute set keyed by provider short name. It is
//! streamed entry by entry, so an aborted run leaves a truncated file behind
//! which callers must discard.

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashSet;
use std::io::Write;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::fetcher::ArchiveFetcher;
use crate::provider::ProviderRef;

/// First line of every generated manifest
pub const MANIFEST_HEADER: &str = "# Generated by tf-provider-index";

static NIX_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_'-]*$").expect("static regex"));

/// Reserved words that cannot appear as bare attribute names
const NIX_KEYWORDS: &[&str] = &[
    "assert", "else", "if", "in", "inherit", "let", "or", "rec", "then", "with",
];

/// One rendered provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub name: String,
    pub owner: String,
    pub repo: String,
    pub rev: String,
    pub version: String,
    pub sha256: String,
}

impl ManifestEntry {
    pub fn new(provider: &ProviderRef, prefix: &str, sha256: impl Into<String>) -> Self {
        Self {
            name: provider_name(&provider.repo, prefix).to_string(),
            owner: provider.org.clone(),
            repo: provider.repo.clone(),
            rev: provider.revision.clone(),
            version: version_from_rev(&provider.revision).to_string(),
            sha256: sha256.into(),
        }
    }
}

/// Repository name without the provider prefix
pub fn provider_name<'a>(repo: &'a str, prefix: &str) -> &'a str {
    repo.strip_prefix(prefix).unwrap_or(repo)
}

/// Tag with at most one leading `v` removed
pub fn version_from_rev(rev: &str) -> &str {
    rev.strip_prefix('v').unwrap_or(rev)
}

/// Quote a string as a Nix string literal
fn nix_string(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace("${", "\\${");
    format!("\"{}\"", escaped)
}

/// Attribute name, quoted unless it is a plain non-keyword identifier
fn nix_attr_name(name: &str) -> String {
    if NIX_IDENTIFIER.is_match(name) && !NIX_KEYWORDS.contains(&name) {
        name.to_string()
    } else {
        nix_string(name)
    }
}

/// Streams manifest entries into a writer
pub struct ManifestWriter<W: Write> {
    out: W,
    seen: HashSet<String>,
}

impl<W: Write> ManifestWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            seen: HashSet::new(),
        }
    }

    /// Header comment and opening brace
    pub fn begin(&mut self) -> std::io::Result<()> {
        writeln!(self.out, "{}", MANIFEST_HEADER)?;
        writeln!(self.out, "{{")?;
        self.out.flush()
    }

    pub fn write_entry(&mut self, entry: &ManifestEntry) -> std::io::Result<()> {
        if !self.seen.insert(entry.name.clone()) {
            warn!(
                "Provider name '{}' appears more than once ({}/{})",
                entry.name, entry.owner, entry.repo
            );
        }

        writeln!(self.out, "  {} =", nix_attr_name(&entry.name))?;
        writeln!(self.out, "    {{")?;
        writeln!(self.out, "      owner   = {};", nix_string(&entry.owner))?;
        writeln!(self.out, "      repo    = {};", nix_string(&entry.repo))?;
        writeln!(self.out, "      rev     = {};", nix_string(&entry.rev))?;
        writeln!(self.out, "      version = {};", nix_string(&entry.version))?;
        writeln!(self.out, "      sha256  = {};", nix_string(&entry.sha256))?;
        writeln!(self.out, "    }};")?;
        self.out.flush()
    }

    /// Closing brace; hands the writer back
    pub fn finish(mut self) -> std::io::Result<W> {
        writeln!(self.out, "}}")?;
        self.out.flush()?;
        Ok(self.out)
    }
}

/// What a completed render produced
#[derive(Debug)]
pub struct RenderSummary<W> {
    pub entries: Vec<ManifestEntry>,
    pub output: W,
}

/// Fetch every provider in order and write the complete manifest.
///
/// The first fetch failure aborts the render; whatever was already written
/// stays in `out`.
pub async fn render_all<F, W>(
    providers: &[ProviderRef],
    fetcher: &F,
    prefix: &str,
    out: W,
) -> Result<RenderSummary<W>>
where
    F: ArchiveFetcher + ?Sized,
    W: Write,
{
    let mut writer = ManifestWriter::new(out);
    writer.begin().context("Failed to write manifest header")?;

    let mut entries = Vec::with_capacity(providers.len());
    for provider in providers {
        eprintln!("*** {}/{} {} ***", provider.org, provider.repo, provider.revision);

        let sha256 = fetcher
            .fetch(&provider.org, &provider.repo, &provider.revision)
            .await
            .with_context(|| format!("Failed to fetch archive for {}", provider))?;
        debug!("{} -> {}", provider, sha256);

        let entry = ManifestEntry::new(provider, prefix, sha256);
        writer
            .write_entry(&entry)
            .with_context(|| format!("Failed to write manifest entry for {}", entry.name))?;
        entries.push(entry);
    }

    let output = writer.finish().context("Failed to finish manifest")?;
    Ok(RenderSummary { entries, output })
}
