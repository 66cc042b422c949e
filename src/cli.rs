use clap::{ArgAction, Parser};
use std::path::{Path, PathBuf};

/// Convert a Bundler Gemfile.lock into a content-addressed gemset for Nix
#[derive(Parser, Debug)]
#[command(name = "gemset")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Gemfile to read (default: nearest Gemfile or gems.rb)
    #[arg(long, value_name = "PATH")]
    pub gemfile: Option<PathBuf>,

    /// Lockfile to convert (default: the Gemfile's lockfile)
    #[arg(long, value_name = "PATH")]
    pub lockfile: Option<PathBuf>,

    /// Output file, also read to reuse previous hashes
    /// (default: gemset.nix, or gemset.json with --json)
    #[arg(long, value_name = "PATH")]
    pub gemset: Option<PathBuf>,

    /// Write JSON instead of a Nix expression
    #[arg(long)]
    pub json: bool,

    /// Print the result instead of writing it
    #[arg(long)]
    pub dry_run: bool,

    /// Only report errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Filter directive for the log subscriber.
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "gemset=error";
        }
        match self.verbose {
            0 => "gemset=warn",
            1 => "gemset=info",
            _ => "gemset=debug",
        }
    }

    pub fn gemset_path(&self) -> PathBuf {
        match &self.gemset {
            Some(path) => path.clone(),
            None if self.json => PathBuf::from("gemset.json"),
            None => PathBuf::from("gemset.nix"),
        }
    }

    /// The Gemfile to read, searching upwards from `cwd` when not given.
    pub fn gemfile_path(&self, cwd: &Path) -> PathBuf {
        self.gemfile
            .clone()
            .or_else(|| crate::ruby::find_gemfile(cwd))
            .unwrap_or_else(|| cwd.join("Gemfile"))
    }

    pub fn lockfile_path(&self, gemfile: &Path) -> PathBuf {
        self.lockfile
            .clone()
            .unwrap_or_else(|| crate::ruby::lockfile_for(gemfile))
    }
}
