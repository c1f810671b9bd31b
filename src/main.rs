use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tf_provider_index::health::CheckResult;
use tf_provider_index::{
    render_all, Config, GitHubClient, HealthCheck, PrefetchCommand, Reconciler, Resolution,
    RetryingFetcher,
};

#[derive(Parser)]
#[command(name = "tf-provider-index")]
#[command(about = "Regenerate the Terraform provider manifest from upstream release tags")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve latest tags, prefetch archives and rewrite the manifest (default)
    Update {
        /// Manifest path (overrides the configured output)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the providers that would be written, without fetching archives
    List,

    /// Write the default configuration file
    Init {
        /// Where to write the configuration (defaults to XDG config location)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// System health check and diagnostics
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Update { output: None });

    if let Commands::Init { path, force } = command {
        init_logging(cli.verbose, "info")?;
        return cmd_init(path, force);
    }

    let config = load_config(cli.config)?;
    init_logging(cli.verbose, &config.logging.level)?;
    info!("Starting tf-provider-index v{}", env!("CARGO_PKG_VERSION"));

    match command {
        Commands::Update { output } => cmd_update(output, &config).await,
        Commands::List => cmd_list(&config).await,
        Commands::Doctor => cmd_doctor(&config),
        Commands::Init { .. } => unreachable!("init is handled before loading configuration"),
    }
}

/// Initialize logging based on verbosity level; logs go to stderr
fn init_logging(verbose: bool, level: &str) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(&path),
        None => {
            let config = Config::load_or_default()?;
            config.validate().context("Invalid default configuration")?;
            Ok(config)
        }
    }
}

/// Resolve every configured provider to its latest tag
async fn resolve(config: &Config) -> Result<Resolution> {
    let slugs = config.slugs()?;
    let blacklist = config.blacklist()?;
    let client = GitHubClient::new(config)?;

    Reconciler::new(&client, &config.provider_prefix)
        .resolve_all(&config.sources.organizations, &slugs, &blacklist)
        .await
        .context("Failed to resolve provider tags")
}

/// Regenerate the manifest
async fn cmd_update(output: Option<PathBuf>, config: &Config) -> Result<()> {
    let start_time = Instant::now();

    println!("🔍 Resolving provider tags...");
    let resolution = resolve(config).await?;
    println!("   Found {} providers", resolution.providers.len());

    for slug in &resolution.untagged {
        println!("   ⚠️  Skipped {} (no release tags)", slug);
    }

    let path = output.unwrap_or_else(|| config.output_path());
    let file = File::create(&path)
        .with_context(|| format!("Failed to create manifest file: {}", path.display()))?;

    let fetcher = RetryingFetcher::new(
        PrefetchCommand::from_config(&config.fetch),
        config.fetch.retry_policy(),
        &config.fetch.command,
    );

    let summary = render_all(
        &resolution.providers,
        &fetcher,
        &config.provider_prefix,
        file,
    )
    .await
    .with_context(|| format!("Manifest {} is incomplete and must be discarded", path.display()))?;

    println!(
        "✅ Wrote {} providers to {} in {:.1}s",
        summary.entries.len(),
        path.display(),
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}

/// List resolved providers without prefetching
async fn cmd_list(config: &Config) -> Result<()> {
    let resolution = resolve(config).await?;

    println!("Providers ({}): ", resolution.providers.len());
    for provider in &resolution.providers {
        println!("  📦 {}/{} {}", provider.org, provider.repo, provider.revision);
    }

    if !resolution.untagged.is_empty() {
        println!("\nWithout release tags ({}):", resolution.untagged.len());
        for slug in &resolution.untagged {
            println!("  ⚠️  {}", slug);
        }
    }

    if !resolution.excluded.is_empty() {
        println!("\nBlacklisted ({}):", resolution.excluded.len());
        for provider in &resolution.excluded {
            println!("  🚫 {}", provider.slug());
        }
    }

    Ok(())
}

/// Write the default configuration
fn cmd_init(path: Option<PathBuf>, force: bool) -> Result<()> {
    let config_path = match path {
        Some(path) => path,
        None => Config::default_config_path()?,
    };

    if config_path.exists() && !force {
        bail!(
            "Configuration already exists at {} (use --force to overwrite)",
            config_path.display()
        );
    }

    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }

    Config::default().save(&config_path)?;

    println!("✅ Configuration written to {}", config_path.display());
    println!("   Next: run 'tf-provider-index doctor', then 'tf-provider-index update'");

    Ok(())
}

/// System health check and diagnostics
fn cmd_doctor(config: &Config) -> Result<()> {
    let health = HealthCheck::run(config);
    print_health_report(&health);
    Ok(())
}

/// Print health check report to stdout
fn print_health_report(health: &HealthCheck) {
    fn print_check(name: &str, result: &CheckResult) {
        println!("{}:", name);
        let icon = if result.passed {
            if result.is_warning { "⚠️ " } else { "✅" }
        } else {
            "❌"
        };
        println!("  {} {}", icon, result.message);
        if let Some(details) = &result.details {
            for line in details.lines() {
                println!("     {}", line);
            }
        }
    }

    println!("🔍 tf-provider-index System Diagnostics");
    println!();

    for (name, result) in health.all_checks() {
        print_check(name, result);
        println!();
    }

    let warnings = health.warnings();
    if health.all_passed() && warnings.is_empty() {
        println!("✅ All checks passed");
    } else if health.all_passed() {
        println!("✅ All checks passed with {} warning(s)", warnings.len());
    } else {
        println!("❌ Some checks failed");
    }
}
