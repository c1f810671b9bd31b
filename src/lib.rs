//! tf-provider-index - Terraform provider manifest generator
//!
//! Scans GitHub organizations and an explicit repository list for the latest
//! release tag of every `terraform-provider-*` repository, prefetches each
//! tagged tarball and writes a Nix manifest of owner, repo, rev, version and
//! content hash per provider.
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`github`]: GitHub API integration and authentication
//! - [`tags`]: Tag selection rules and the [`TagSource`] seam
//! - [`fetcher`]: Archive prefetching with retries
//! - [`reconcile`]: Merging, blacklisting and ordering of providers
//! - [`manifest`]: Manifest rendering

pub mod config;
pub mod fetcher;
pub mod github;
pub mod health;
pub mod manifest;
pub mod provider;
pub mod reconcile;
pub mod retry;
pub mod tags;

pub use config::Config;
pub use fetcher::{ArchiveFetcher, PrefetchCommand, RetryingFetcher};
pub use github::GitHubClient;
pub use health::HealthCheck;
pub use manifest::{render_all, ManifestEntry, ManifestWriter, RenderSummary};
pub use provider::{ProviderRef, Slug};
pub use reconcile::{Blacklist, Reconciler, Resolution};
pub use retry::{RetryError, RetryPolicy};
pub use tags::{TagLookup, TagSource};
