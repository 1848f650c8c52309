// src/main.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use warsito::{
    build_all, repository, BuildConfig, BuildContext, HttpFetcher, PackagesFileCache, Seed,
};

#[derive(Parser)]
#[command(name = "warsito")]
#[command(author, version, about = "Bundle Debian packages for a derivative distribution", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build bundles for one or more packages
    Build {
        /// Configuration file
        #[arg(short, long)]
        config: PathBuf,
        /// Seed file listing the base image packages
        #[arg(short, long)]
        seed: PathBuf,
        /// Debian `Packages` file describing the available packages
        #[arg(short, long)]
        packages: PathBuf,
        /// Mirror base URL the `Filename` fields are relative to
        #[arg(short, long)]
        mirror: String,
        /// Fail when a dependency group has no available alternative
        #[arg(long)]
        strict: bool,
        /// Packages to bundle
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Copy built bundles from the result directory into the publish tree
    Publish {
        /// Configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Append published bundles to the Packages.info index
    Index {
        /// Configuration file
        #[arg(short, long)]
        config: PathBuf,
        /// Architecture to index (default: every configured architecture)
        #[arg(short, long)]
        arch: Option<String>,
        /// Packages to index
        #[arg(required = true)]
        names: Vec<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            config,
            seed,
            packages,
            mirror,
            strict,
            names,
        } => cmd_build(&config, &seed, &packages, &mirror, strict, &names),
        Commands::Publish { config } => cmd_publish(&config),
        Commands::Index { config, arch, names } => cmd_index(&config, arch.as_deref(), &names),
    }
}

fn cmd_build(
    config_path: &Path,
    seed_path: &Path,
    packages_path: &Path,
    mirror: &str,
    strict: bool,
    names: &[String],
) -> Result<()> {
    let mut config = BuildConfig::load(config_path)?;
    if strict {
        config.strict_dependencies = true;
    }

    let seed = Seed::load(seed_path)?;
    let cache = PackagesFileCache::load(packages_path, mirror)?;
    let fetcher = HttpFetcher::new(config.timeout)?;

    info!(
        "Building {} bundles for {} ({} packages known, {} in base image)",
        names.len(),
        config.distribution_key(),
        cache.len(),
        seed.len()
    );

    let ctx = BuildContext::new(&config, &cache, &seed, &fetcher);
    let results = build_all(&ctx, names);

    let mut failed = 0;
    for (name, result) in &results {
        match result {
            Ok(artifact) => println!(
                "{}: {} ({} packages, {})",
                name,
                artifact.path.display(),
                artifact.packages,
                artifact.compression
            ),
            Err(e) => {
                error!("{}: {}", name, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} builds failed", failed, results.len());
    }
    Ok(())
}

fn cmd_publish(config_path: &Path) -> Result<()> {
    let config = BuildConfig::load(config_path)?;
    let publish_dir = config.require_publish_dir()?;

    let published = repository::publish(&config.result_dir, publish_dir, &config.distribution)?;
    for path in &published {
        println!("{}", path.display());
    }
    Ok(())
}

fn cmd_index(config_path: &Path, arch: Option<&str>, names: &[String]) -> Result<()> {
    let config = BuildConfig::load(config_path)?;
    let publish_dir = config.require_publish_dir()?;

    let architectures: Vec<&str> = match arch {
        Some(arch) => vec![arch],
        None => config.architectures.iter().map(String::as_str).collect(),
    };

    for arch in architectures {
        let records = repository::index(publish_dir, &config.distribution, arch, names, config.checksum)
            .with_context(|| format!("Failed to index {}/{}", config.distribution, arch))?;
        for record in &records {
            println!("{} {} {}", arch, record.control.package, record.control.version);
        }
    }
    Ok(())
}
