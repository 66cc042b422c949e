//! Lockfile parsing for Ruby ecosystem
//!
//! Reads every locked gem from Gemfile.lock together with its source.
//!
//! Gemfile.lock uses a custom format (not YAML or TOML):
//! ```text
//! GIT
//!   remote: https://github.com/twalpole/apparition.git
//!   revision: ca86be4d54af835d531dbcd2b86e7b2c77f85f34
//!   specs:
//!     apparition (0.6.0)
//!       capybara (~> 3.13, < 4)
//!
//! GEM
//!   remote: https://rubygems.org/
//!   specs:
//!     nokogiri (1.14.0-x86_64-linux)
//!       racc (~> 1.4)
//!
//! PLATFORMS
//!   x86_64-linux
//!
//! DEPENDENCIES
//!   apparition!
//!   nokogiri
//!
//! BUNDLED WITH
//!    2.4.6
//! ```

use crate::model::{LockedPackage, Origin, PURE_PLATFORM};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LockfileError {
    #[error("No lockfile found at {path}. Run `bundle lock` first.")]
    NotFound { path: PathBuf },

    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{section} section starting at line {line} is missing '{field}'")]
    MissingField {
        section: String,
        field: &'static str,
        line: usize,
    },

    #[error("Malformed spec at line {line}: '{text}'")]
    MalformedSpec { line: usize, text: String },
}

/// Everything gemset needs from a lockfile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lockfile {
    /// Locked variants in file order
    pub packages: Vec<LockedPackage>,
    pub platforms: Vec<String>,
    /// Top-level dependency names from `DEPENDENCIES`
    pub dependencies: Vec<String>,
    /// Version under `BUNDLED WITH`
    pub bundler_version: Option<String>,
}

pub fn read(path: &Path) -> Result<Lockfile, LockfileError> {
    if !path.is_file() {
        return Err(LockfileError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let content = fs::read_to_string(path).map_err(|source| LockfileError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&content)
}

#[derive(Debug, Default)]
struct SourceBlock {
    kind: String,
    line: usize,
    remotes: Vec<String>,
    options: BTreeMap<String, String>,
    in_specs: bool,
    specs: Vec<SpecLine>,
}

#[derive(Debug)]
struct SpecLine {
    name: String,
    version: String,
    platform: Option<String>,
    dependencies: Vec<String>,
}

enum Section {
    Source(SourceBlock),
    Platforms,
    Dependencies,
    BundledWith,
    Other,
}

pub fn parse(content: &str) -> Result<Lockfile, LockfileError> {
    let mut lock = Lockfile::default();
    let mut section = Section::Other;

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim_end();
        if line.trim().is_empty() {
            continue;
        }

        // Top-level header starts a new section
        if !line.starts_with(' ') {
            flush(std::mem::replace(&mut section, Section::Other), &mut lock)?;
            section = match line {
                "GEM" | "GIT" | "PATH" | "PLUGIN SOURCE" => Section::Source(SourceBlock {
                    kind: line.to_string(),
                    line: line_no,
                    ..SourceBlock::default()
                }),
                "PLATFORMS" => Section::Platforms,
                "DEPENDENCIES" => Section::Dependencies,
                "BUNDLED WITH" => Section::BundledWith,
                _ => Section::Other,
            };
            continue;
        }

        let indent = line.len() - line.trim_start().len();
        let text = line.trim();

        match &mut section {
            Section::Source(block) => parse_source_line(block, indent, text, line_no)?,
            Section::Platforms => lock.platforms.push(text.to_string()),
            Section::Dependencies => {
                let name = text.split_whitespace().next().unwrap_or(text);
                lock.dependencies.push(name.trim_end_matches('!').to_string());
            }
            Section::BundledWith => lock.bundler_version = Some(text.to_string()),
            Section::Other => {}
        }
    }

    flush(section, &mut lock)?;
    Ok(lock)
}

fn parse_source_line(
    block: &mut SourceBlock,
    indent: usize,
    text: &str,
    line_no: usize,
) -> Result<(), LockfileError> {
    match indent {
        2 if text == "specs:" => block.in_specs = true,
        2 => {
            if let Some((key, value)) = text.split_once(':') {
                let value = value.trim().to_string();
                if key == "remote" {
                    block.remotes.push(value);
                } else {
                    block.options.insert(key.to_string(), value);
                }
            }
        }
        4 if block.in_specs => {
            let spec = parse_spec_line(text).ok_or_else(|| LockfileError::MalformedSpec {
                line: line_no,
                text: text.to_string(),
            })?;
            block.specs.push(spec);
        }
        6 if block.in_specs => {
            if let Some(spec) = block.specs.last_mut() {
                let name = text.split_whitespace().next().unwrap_or(text);
                spec.dependencies.push(name.to_string());
            }
        }
        _ => {}
    }
    Ok(())
}

/// Parse a gem line from a specs section
///
/// Format: "gem_name (version[-platform])"
/// Examples:
///   - "rails (7.1.0)"
///   - "nokogiri (1.16.0-x86_64-linux)"
///   - "bigdecimal (3.1.9-java)"
fn parse_spec_line(text: &str) -> Option<SpecLine> {
    let open_paren = text.find(" (")?;
    let close_paren = text.rfind(')')?;
    if open_paren + 2 > close_paren {
        return None;
    }

    let name = text[..open_paren].trim();
    let version_str = &text[open_paren + 2..close_paren];
    if name.is_empty() || version_str.is_empty() {
        return None;
    }

    // Versions never contain '-', so the first one starts the platform
    let (version, platform) = match version_str.split_once('-') {
        Some((version, platform)) if platform != PURE_PLATFORM => {
            (version, Some(platform.to_string()))
        }
        Some((version, _)) => (version, None),
        None => (version_str, None),
    };

    Some(SpecLine {
        name: name.to_string(),
        version: version.to_string(),
        platform,
        dependencies: Vec::new(),
    })
}

fn flush(section: Section, lock: &mut Lockfile) -> Result<(), LockfileError> {
    let Section::Source(block) = section else {
        return Ok(());
    };

    let missing = |field| LockfileError::MissingField {
        section: block.kind.clone(),
        field,
        line: block.line,
    };

    let origin = match block.kind.as_str() {
        "GEM" => Origin::Registry {
            remotes: block
                .remotes
                .iter()
                .map(|r| r.trim_end_matches('/').to_string())
                .collect(),
        },
        "GIT" => Origin::Git {
            url: block.remotes.first().cloned().ok_or_else(|| missing("remote"))?,
            revision: block
                .options
                .get("revision")
                .cloned()
                .ok_or_else(|| missing("revision"))?,
            submodules: block.options.get("submodules").is_some_and(|v| v == "true"),
        },
        "PATH" => Origin::Path {
            path: block.remotes.first().cloned().ok_or_else(|| missing("remote"))?,
        },
        other => Origin::Unknown {
            kind: other.to_string(),
        },
    };

    lock.packages.extend(block.specs.into_iter().map(|spec| LockedPackage {
        name: spec.name,
        version: spec.version,
        platform: spec.platform,
        origin: origin.clone(),
        dependencies: spec.dependencies,
    }));
    Ok(())
}
