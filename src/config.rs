use anyhow::{bail, Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::provider::Slug;
use crate::reconcile::Blacklist;
use crate::retry::{BackoffKind, RetryPolicy};

/// Main configuration structure for tf-provider-index
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Manifest file to (re)generate
    #[serde(default = "default_output")]
    pub output: String,

    /// Repository name prefix identifying providers
    #[serde(default = "default_provider_prefix")]
    pub provider_prefix: String,

    /// Where providers are discovered
    #[serde(default)]
    pub sources: SourcesConfig,

    /// GitHub authentication and query settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Archive fetching and retry behavior
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Provider discovery sources
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourcesConfig {
    /// Organizations scanned in bulk
    #[serde(default)]
    pub organizations: Vec<String>,

    /// Extra `owner/repo` providers resolved one by one
    #[serde(default)]
    pub repositories: Vec<String>,

    /// `owner/repo` providers never written to the manifest
    #[serde(default)]
    pub blacklist: Vec<String>,
}

/// GitHub configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitHubConfig {
    /// Authentication method
    #[serde(default = "default_auth_method")]
    pub auth_method: String, // "auto", "gh_cli", "token", "none"

    /// API base URL override (GitHub Enterprise)
    #[serde(default)]
    pub api_base: Option<String>,

    /// Attempts per API request
    #[serde(default = "default_query_attempts")]
    pub max_attempts: u32,
}

/// Archive fetch configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FetchConfig {
    /// Prefetch program
    #[serde(default = "default_fetch_command")]
    pub command: String,

    /// Arguments placed before the archive URL
    #[serde(default = "default_fetch_args")]
    pub args: Vec<String>,

    /// Archive URL with `{owner}`, `{repo}` and `{rev}` placeholders
    #[serde(default = "default_url_template")]
    pub url_template: String,

    /// Attempts per archive before the run is aborted
    #[serde(default = "default_fetch_attempts")]
    pub max_attempts: u32,

    /// Seconds between attempts
    #[serde(default = "default_fetch_delay")]
    pub delay_secs: u64,

    /// Delay strategy
    #[serde(default)]
    pub backoff: BackoffKind,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"
}

// Default value functions
fn default_output() -> String {
    "./providers.nix".to_string()
}
fn default_provider_prefix() -> String {
    "terraform-provider-".to_string()
}
fn default_auth_method() -> String {
    "auto".to_string()
}
fn default_query_attempts() -> u32 {
    1
}
fn default_fetch_command() -> String {
    "nix-prefetch-url".to_string()
}
fn default_fetch_args() -> Vec<String> {
    vec!["--unpack".to_string()]
}
fn default_url_template() -> String {
    "https://github.com/{owner}/{repo}/archive/{rev}.tar.gz".to_string()
}
fn default_fetch_attempts() -> u32 {
    30
}
fn default_fetch_delay() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// Default implementations
impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            organizations: strings(&["terraform-providers", "hashicorp"]),
            repositories: strings(&[
                "IBM-Cloud/terraform-provider-ibm",
                "ajbosco/terraform-provider-segment",
                "camptocamp/terraform-provider-pass",
                "carlpett/terraform-provider-sops",
                "poseidon/terraform-provider-ct",
                "poseidon/terraform-provider-matchbox",
                "tweag/terraform-provider-nixos",
                "tweag/terraform-provider-secret",
            ]),
            blacklist: strings(&[
                "terraform-providers/terraform-provider-azure-classic",
                "terraform-providers/terraform-provider-scaffolding",
                "terraform-providers/terraform-provider-google-beta",
                "terraform-providers/terraform-provider-skytap",
            ]),
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            auth_method: default_auth_method(),
            api_base: None,
            max_attempts: default_query_attempts(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            command: default_fetch_command(),
            args: default_fetch_args(),
            url_template: default_url_template(),
            max_attempts: default_fetch_attempts(),
            delay_secs: default_fetch_delay(),
            backoff: BackoffKind::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl GitHubConfig {
    /// Retry policy for API requests, one second apart
    pub fn query_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_attempts, Duration::from_secs(1))
    }
}

impl FetchConfig {
    /// Retry policy for archive fetches
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_settings(
            self.max_attempts,
            Duration::from_secs(self.delay_secs),
            self.backoff,
        )
    }
}

impl Config {
    /// Load configuration from the default location or create a default config
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            let mut config = Self::default();

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }

            config.save(&config_path)?;
            tracing::info!("Created default configuration at: {:?}", config_path);

            config.expand_paths()?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        // Expand environment variables in paths
        config.expand_paths()?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", path))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("tf-provider-index").join("config.yml"))
    }

    /// Expand environment variables in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.output = shellexpand::full(&self.output)
            .context("Failed to expand output path")?
            .into_owned();

        Ok(())
    }

    /// Reject settings that would only fail halfway through a run
    pub fn validate(&self) -> Result<()> {
        if self.provider_prefix.is_empty() {
            bail!("provider_prefix must not be empty");
        }

        self.slugs()?;
        self.blacklist()?;

        if self.fetch.max_attempts == 0 {
            bail!("fetch.max_attempts must be at least 1");
        }
        if self.github.max_attempts == 0 {
            bail!("github.max_attempts must be at least 1");
        }

        for placeholder in ["{owner}", "{repo}", "{rev}"] {
            if !self.fetch.url_template.contains(placeholder) {
                bail!("fetch.url_template is missing {}", placeholder);
            }
        }

        Ok(())
    }

    /// Explicit providers as parsed slugs
    pub fn slugs(&self) -> Result<Vec<Slug>> {
        self.sources
            .repositories
            .iter()
            .map(|s| s.parse::<Slug>().context("Invalid entry in sources.repositories"))
            .collect()
    }

    /// Blacklist entries, each checked to be an `owner/repo` pair
    pub fn blacklist(&self) -> Result<Blacklist> {
        for entry in &self.sources.blacklist {
            entry
                .parse::<Slug>()
                .context("Invalid entry in sources.blacklist")?;
        }
        Ok(Blacklist::new(self.sources.blacklist.iter().cloned()))
    }

    /// Output path as a `PathBuf`
    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(&self.output)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output: default_output(),
            provider_prefix: default_provider_prefix(),
            sources: SourcesConfig::default(),
            github: GitHubConfig::default(),
            fetch: FetchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
