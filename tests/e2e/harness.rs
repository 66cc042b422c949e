//! Throwaway Bundler projects and a sandboxed way to run `gemset` in them.
//!
//! Every project gets its own HOME and XDG directories, and inherited
//! `BUNDLE_*` / `GEM_*` variables are removed so the host's Bundler setup
//! cannot leak credentials or gem caches into a run.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_PROJECT: AtomicUsize = AtomicUsize::new(0);

/// Root under the system temp dir holding one directory per project.
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new() -> Result<Self, String> {
        let root = std::env::temp_dir().join(format!("gemset-e2e-{}", std::process::id()));
        if root.exists() {
            fs::remove_dir_all(&root).map_err(|e| format!("Failed to clear {}: {}", root.display(), e))?;
        }
        fs::create_dir_all(&root).map_err(|e| format!("Failed to create {}: {}", root.display(), e))?;
        Ok(Self { root })
    }

    /// An empty project directory with a private home.
    pub fn project(&self, name: &str) -> Result<Project, String> {
        let n = NEXT_PROJECT.fetch_add(1, Ordering::SeqCst);
        let base = self.root.join(format!("{:02}-{}", n, name));
        let project = Project {
            dir: base.join("app"),
            home: base.join("home"),
        };
        let dirs = [
            project.dir.clone(),
            project.home.join(".cache"),
            project.home.join(".config"),
        ];
        for dir in &dirs {
            fs::create_dir_all(dir).map_err(|e| format!("Failed to create {}: {}", dir.display(), e))?;
        }
        Ok(project)
    }
}

pub struct Project {
    pub dir: PathBuf,
    home: PathBuf,
}

impl Project {
    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.join(relative)
    }

    pub fn write(&self, relative: &str, content: &str) -> Result<&Self, String> {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
        }
        fs::write(&path, content).map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
        Ok(self)
    }

    /// Gemfile plus lockfile, with a directory for every PATH gem the lock
    /// names.
    pub fn bundle(&self, gemfile: &str, lockfile: &str) -> Result<&Self, String> {
        self.write("Gemfile", gemfile)?;
        self.write("Gemfile.lock", lockfile)?;
        for engine in path_remotes(lockfile) {
            let dir = self.path(&engine);
            fs::create_dir_all(&dir).map_err(|e| format!("Failed to create {}: {}", dir.display(), e))?;
        }
        Ok(self)
    }

    pub fn read(&self, relative: &str) -> Result<String, String> {
        let path = self.path(relative);
        fs::read_to_string(&path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }

    pub fn gemset_json(&self, relative: &str) -> Result<serde_json::Value, String> {
        parse_gemset(&self.read(relative)?)
    }

    /// Run `gemset` from the project directory.
    pub fn gemset(&self, args: &[&str]) -> Result<Run, String> {
        self.gemset_in(&self.dir, args)
    }

    pub fn gemset_in(&self, cwd: &Path, args: &[&str]) -> Result<Run, String> {
        let mut command = Command::new(env!("CARGO_BIN_EXE_gemset"));
        command
            .args(args)
            .current_dir(cwd)
            .env("HOME", &self.home)
            .env("XDG_CACHE_HOME", self.home.join(".cache"))
            .env("XDG_CONFIG_HOME", self.home.join(".config"));
        for (key, _) in std::env::vars_os() {
            let name = key.to_string_lossy();
            if name.starts_with("BUNDLE_") || name.starts_with("GEM_") {
                command.env_remove(&key);
            }
        }

        let output = command
            .output()
            .map_err(|e| format!("Failed to run gemset: {}", e))?;
        Ok(Run {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Directories named by `remote:` lines of PATH sections.
fn path_remotes(lockfile: &str) -> Vec<String> {
    let mut remotes = Vec::new();
    let mut in_path = false;
    for line in lockfile.lines() {
        if !line.starts_with(' ') {
            in_path = line == "PATH";
        } else if in_path {
            if let Some(remote) = line.trim().strip_prefix("remote: ") {
                remotes.push(remote.to_string());
            }
        }
    }
    remotes
}

pub fn parse_gemset(text: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(text).map_err(|e| format!("Not a JSON gemset: {}\n{}", e, text))
}

/// Exit status and captured output of one run.
pub struct Run {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Run {
    pub fn succeeded(&self) -> Result<&Self, String> {
        match self.code {
            Some(0) => Ok(self),
            code => Err(format!("exit {:?}, stderr:\n{}", code, self.stderr)),
        }
    }

    /// Exit code 1 with `Error: <needle>...` on stderr.
    pub fn failed_with(&self, needle: &str) -> Result<&Self, String> {
        if self.code != Some(1) {
            return Err(format!("expected exit 1, got {:?}:\n{}", self.code, self.stderr));
        }
        if !self.stderr.contains("Error: ") || !self.stderr.contains(needle) {
            return Err(format!("expected an error mentioning '{}':\n{}", needle, self.stderr));
        }
        Ok(self)
    }

    pub fn reported(&self, needle: &str) -> Result<&Self, String> {
        if self.stderr.contains(needle) {
            Ok(self)
        } else {
            Err(format!("expected '{}' on stderr:\n{}", needle, self.stderr))
        }
    }

    pub fn printed(&self, needle: &str) -> Result<&Self, String> {
        if self.stdout.contains(needle) {
            Ok(self)
        } else {
            Err(format!("expected '{}' on stdout:\n{}", needle, self.stdout))
        }
    }
}
