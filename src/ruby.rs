//! Ruby ecosystem inputs
//!
//! Handles:
//! - Lockfile parsing: Gemfile.lock / gems.locked
//! - Manifest parsing: the declarative subset of Gemfile / gems.rb
//! - Remote spec lookup via the RubyGems versions API

pub mod gemfile;
pub mod lockfile;
pub mod rubygems;

pub use gemfile::GemfileError;
pub use lockfile::{Lockfile, LockfileError};
pub use rubygems::{RubyGemsError, RubyGemsIndex, SpecIndex};

use std::path::{Path, PathBuf};

/// Manifest names Bundler recognizes, in lookup order.
const MANIFEST_NAMES: &[&str] = &["Gemfile", "gems.rb"];

/// Find the nearest manifest by walking up from `start`.
pub fn find_gemfile(start: &Path) -> Option<PathBuf> {
    let mut dir = start;
    loop {
        for name in MANIFEST_NAMES {
            let path = dir.join(name);
            if path.is_file() {
                return Some(path);
            }
        }

        match dir.parent() {
            Some(parent) => dir = parent,
            None => return None,
        }
    }
}

/// The lockfile Bundler pairs with a manifest: `gems.rb` -> `gems.locked`,
/// anything else -> `<manifest>.lock`.
pub fn lockfile_for(gemfile: &Path) -> PathBuf {
    if gemfile.file_name().is_some_and(|n| n == "gems.rb") {
        return gemfile.with_file_name("gems.locked");
    }
    let mut lock = gemfile.as_os_str().to_owned();
    lock.push(".lock");
    PathBuf::from(lock)
}
