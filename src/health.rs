//! Preflight checks for tf-provider-index
//!
//! Verifies the prefetch tool, GitHub credentials and output location before
//! a long regeneration run starts.

use std::path::Path;
use std::process::Command;

use crate::github::{AuthStrategy, GitHubClient};
use crate::Config;

/// Result of system health checks
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Prefetch command availability
    pub fetcher: CheckResult,
    /// GitHub token discovery
    pub github_auth: CheckResult,
    /// Output directory status
    pub output: CheckResult,
    /// Configured provider sources
    pub sources: CheckResult,
}

/// Result of an individual health check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
    pub is_warning: bool,
}

impl CheckResult {
    fn ok_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn error_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn warning_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: true,
        }
    }
}

impl HealthCheck {
    /// Run all health checks
    pub fn run(config: &Config) -> Self {
        Self {
            fetcher: Self::check_fetcher(&config.fetch.command),
            github_auth: Self::check_github_auth(config),
            output: Self::check_output(config),
            sources: Self::check_sources(config),
        }
    }

    /// Check if all required checks passed (excludes warnings)
    pub fn all_passed(&self) -> bool {
        self.all_checks().iter().all(|(_, result)| result.passed)
    }

    /// Get list of warnings
    pub fn warnings(&self) -> Vec<&CheckResult> {
        [&self.fetcher, &self.github_auth, &self.output, &self.sources]
            .into_iter()
            .filter(|r| r.is_warning)
            .collect()
    }

    /// Check that the prefetch program is on PATH
    fn check_fetcher(command: &str) -> CheckResult {
        match Command::new("which").arg(command).output() {
            Ok(output) if output.status.success() => CheckResult::ok_with_details(
                format!("{} found", command),
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            ),
            _ => CheckResult::error_with_details(
                format!("{} not found in PATH", command),
                "Install Nix (https://nixos.org/download) or set fetch.command",
            ),
        }
    }

    /// Check GitHub credentials can be found
    fn check_github_auth(config: &Config) -> CheckResult {
        match GitHubClient::detect_authentication(&config.github.auth_method) {
            Ok((AuthStrategy::Anonymous, _)) => CheckResult::warning_with_details(
                "GitHub requests are unauthenticated",
                "The GraphQL organization scan requires a token",
            ),
            Ok((strategy, _)) => {
                CheckResult::ok_with_details("GitHub token found", format!("Source: {:?}", strategy))
            }
            Err(e) => CheckResult::error_with_details(
                "GitHub authentication not available",
                format!("{}", e),
            ),
        }
    }

    /// Check the output file's directory exists
    fn check_output(config: &Config) -> CheckResult {
        let output = config.output_path();
        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        if dir.is_dir() {
            CheckResult::ok_with_details("Output directory exists", output.display().to_string())
        } else {
            CheckResult::error_with_details(
                "Output directory does not exist",
                format!("Run: mkdir -p {}", dir.display()),
            )
        }
    }

    /// Summarize the configured sources
    fn check_sources(config: &Config) -> CheckResult {
        let sources = &config.sources;
        let details = format!(
            "{} organizations, {} repositories, {} blacklisted",
            sources.organizations.len(),
            sources.repositories.len(),
            sources.blacklist.len()
        );

        if sources.organizations.is_empty() && sources.repositories.is_empty() {
            CheckResult::warning_with_details("No provider sources configured", details)
        } else {
            CheckResult::ok_with_details("Provider sources configured", details)
        }
    }

    /// Get all checks as a slice for iteration
    pub fn all_checks(&self) -> [(&'static str, &CheckResult); 4] {
        [
            ("Fetcher", &self.fetcher),
            ("GitHub Authentication", &self.github_auth),
            ("Output", &self.output),
            ("Sources", &self.sources),
        ]
    }
}
