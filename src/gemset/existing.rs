//! Reading the gemset a previous run wrote
//!
//! A `.json` gemset is parsed directly. Anything else is taken to be a Nix
//! file and evaluated to JSON with `nix-instantiate`.

use super::GemsetCache;
use super::nix::string_literal;
use crate::process::{CommandRunner, ProcessError, ToolCommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ExistingError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to evaluate {path}: {source}")]
    Evaluate {
        path: PathBuf,
        source: ProcessError,
    },

    #[error("Failed to parse {path} as a gemset: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Load the previous gemset at `path`. A missing file is an empty cache.
pub fn read(
    path: &Path,
    runner: &dyn CommandRunner,
    nix_instantiate: &str,
) -> Result<GemsetCache, ExistingError> {
    if !path.is_file() {
        debug!("no previous gemset at {}", path.display());
        return Ok(GemsetCache::empty());
    }

    let json = if path.extension().is_some_and(|ext| ext == "json") {
        std::fs::read_to_string(path).map_err(|source| ExistingError::Read {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        let command = evaluate_command(path, nix_instantiate).map_err(|source| {
            ExistingError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        runner
            .run(&command)
            .map_err(|source| ExistingError::Evaluate {
                path: path.to_path_buf(),
                source,
            })?
    };

    let entries: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(&json).map_err(|source| ExistingError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    debug!("loaded {} entries from {}", entries.len(), path.display());
    Ok(GemsetCache::new(entries))
}

fn evaluate_command(path: &Path, nix_instantiate: &str) -> std::io::Result<ToolCommand> {
    let absolute = std::path::absolute(path)?;
    let expr = format!("import {}", string_literal(&absolute.to_string_lossy()));
    Ok(ToolCommand::new(nix_instantiate).args(["--eval", "--strict", "--json", "-E", &expr]))
}
