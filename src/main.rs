use clap::Parser;
use gemset::cache::DownloadCache;
use gemset::cli::Cli;
use gemset::config::Config;
use gemset::convert::{self, Conversion};
use gemset::credentials::Credentials;
use gemset::download::HttpDownloader;
use gemset::fetcher::NixFetcher;
use gemset::gemset::{GemsetCache, existing, nix};
use gemset::process::SystemRunner;
use gemset::ruby::{RubyGemsIndex, gemfile, lockfile};
use std::path::Path;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(cli.log_filter()))
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let cwd = std::env::current_dir()?;
    let config = Config::load()?;

    let gemfile_path = cli.gemfile_path(&cwd);
    let lockfile_path = cli.lockfile_path(&gemfile_path);
    let project_root = gemfile_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cwd.clone());

    let lock = lockfile::read(&lockfile_path)?;
    let declared = gemfile::read(&gemfile_path)?;

    let credentials = Credentials::load(&project_root)?;
    let cache = DownloadCache::from_override(config.download_cache.as_deref())?;
    debug!("download cache at {}", cache.dir().display());
    let fetcher = NixFetcher::new(
        Box::new(SystemRunner),
        Box::new(HttpDownloader::new(credentials.clone())),
        Box::new(RubyGemsIndex::new(credentials)),
        cache,
    )
    .with_local_caches(config.local_gem_caches(&project_root))
    .with_tools(config.tools.clone());

    let gemset_path = cli.gemset_path();
    let previous = existing::read(&gemset_path, &SystemRunner, &config.tools.nix_instantiate)
        .unwrap_or_else(|e| {
            warn!("ignoring previous gemset: {}", e);
            GemsetCache::empty()
        });

    let conversion = convert::convert(&lock, &declared, &previous, &fetcher)?;
    if let Some(version) = &conversion.bundler_version {
        info!("Lockfile bundled with bundler {}", version);
    }

    let rendered = if cli.json {
        nix::render_json(&conversion.gemset)?
    } else {
        nix::render_nix(&conversion.gemset)?
    };

    if cli.dry_run {
        print!("{}", rendered);
    } else {
        nix::write_atomic(&gemset_path, &rendered)?;
    }

    if !cli.quiet {
        let target = if cli.dry_run {
            None
        } else {
            Some(gemset_path.as_path())
        };
        eprintln!("{}", summary(&conversion, target));
    }

    Ok(())
}

fn summary(conversion: &Conversion, written: Option<&Path>) -> String {
    let mut line = match written {
        Some(path) => format!("Wrote {}: ", path.display()),
        None => String::new(),
    };
    line.push_str(&format!(
        "{} reused, {} resolved, {} failed",
        conversion.reused.len(),
        conversion.resolved.len(),
        conversion.failed.len()
    ));

    if !conversion.failed.is_empty() {
        let names: Vec<&str> = conversion
            .failed
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        line.push_str(&format!(" ({})", names.join(", ")));
    }
    line
}
