//! Host credentials from Bundler settings
//!
//! Private gem servers are configured with `bundle config <host> user:pass`,
//! which Bundler stores as `BUNDLE_<HOST>` in `.bundle/config` (YAML) or reads
//! from the environment. Lookup order matches Bundler: environment, then the
//! project's `.bundle/config`, then `~/.bundle/config`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("Failed to read Bundler settings {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse Bundler settings {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yml::Error,
    },
}

/// Username and password for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCredential {
    pub username: String,
    pub password: String,
}

impl HostCredential {
    /// Split a `user:password` setting value. A value without `:` is a
    /// username with an empty password.
    pub fn parse(value: &str) -> Self {
        match value.split_once(':') {
            Some((username, password)) => Self {
                username: username.to_string(),
                password: password.to_string(),
            },
            None => Self {
                username: value.to_string(),
                password: String::new(),
            },
        }
    }
}

/// Bundler settings key for a host: `BUNDLE_PACKAGES__EXAMPLE__IO`.
pub fn settings_key(host: &str) -> String {
    let key = host.replace('-', "___").replace('.', "__").to_uppercase();
    format!("BUNDLE_{}", key)
}

/// Layered Bundler settings, highest precedence first.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    layers: Vec<BTreeMap<String, String>>,
}

impl Credentials {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load from the environment, `<project>/.bundle/config` and
    /// `~/.bundle/config`.
    pub fn load(project_root: &Path) -> Result<Self, CredentialsError> {
        let env: BTreeMap<String, String> = std::env::vars()
            .filter(|(k, _)| k.starts_with("BUNDLE_"))
            .collect();

        let mut layers = vec![env];
        layers.push(read_settings(&project_root.join(".bundle").join("config"))?);
        if let Some(home) = dirs::home_dir() {
            layers.push(read_settings(&home.join(".bundle").join("config"))?);
        }

        Ok(Self { layers })
    }

    pub fn from_layers(layers: Vec<BTreeMap<String, String>>) -> Self {
        Self { layers }
    }

    pub fn for_host(&self, host: &str) -> Option<HostCredential> {
        let key = settings_key(host);
        self.layers
            .iter()
            .find_map(|layer| layer.get(&key))
            .map(|value| HostCredential::parse(value))
    }
}

/// Read one Bundler settings file. A missing file is an empty layer; values
/// that are not scalars are ignored.
pub fn read_settings(path: &Path) -> Result<BTreeMap<String, String>, CredentialsError> {
    if !path.is_file() {
        return Ok(BTreeMap::new());
    }

    let content = std::fs::read_to_string(path).map_err(|source| CredentialsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_settings(&content).map_err(|source| CredentialsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_settings(content: &str) -> Result<BTreeMap<String, String>, serde_yml::Error> {
    if content.trim().is_empty() || content.trim() == "---" {
        return Ok(BTreeMap::new());
    }

    let raw: BTreeMap<String, serde_yml::Value> = serde_yml::from_str(content)?;
    let settings = raw
        .into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                serde_yml::Value::String(s) => s,
                serde_yml::Value::Number(n) => n.to_string(),
                serde_yml::Value::Bool(b) => b.to_string(),
                _ => {
                    debug!("ignoring non-scalar Bundler setting {}", key);
                    return None;
                }
            };
            Some((key, value))
        })
        .collect();
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_key() {
        assert_eq!(
            settings_key("packages.shopify.io"),
            "BUNDLE_PACKAGES__SHOPIFY__IO"
        );
        assert_eq!(settings_key("gems.my-corp.com"), "BUNDLE_GEMS__MY___CORP__COM");
    }

    #[test]
    fn test_host_credential_parse() {
        assert_eq!(
            HostCredential::parse("alice:s3:cret"),
            HostCredential {
                username: "alice".to_string(),
                password: "s3:cret".to_string()
            }
        );
        assert_eq!(HostCredential::parse("token").password, "");
    }

    #[test]
    fn test_parse_settings_yaml() {
        let yaml = r#"---
BUNDLE_PATH: "vendor/bundle"
BUNDLE_GEMS__EXAMPLE__COM: "bob:hunter2"
BUNDLE_JOBS: 4
BUNDLE_WITHOUT:
  - development
"#;
        let settings = parse_settings(yaml).unwrap();
        assert_eq!(settings.get("BUNDLE_GEMS__EXAMPLE__COM").unwrap(), "bob:hunter2");
        assert_eq!(settings.get("BUNDLE_JOBS").unwrap(), "4");
        assert!(!settings.contains_key("BUNDLE_WITHOUT"));
    }

    #[test]
    fn test_layer_precedence() {
        let env = BTreeMap::from([(
            "BUNDLE_GEMS__EXAMPLE__COM".to_string(),
            "env:first".to_string(),
        )]);
        let local = BTreeMap::from([
            (
                "BUNDLE_GEMS__EXAMPLE__COM".to_string(),
                "local:second".to_string(),
            ),
            (
                "BUNDLE_OTHER__EXAMPLE__COM".to_string(),
                "local:only".to_string(),
            ),
        ]);
        let credentials = Credentials::from_layers(vec![env, local]);

        assert_eq!(credentials.for_host("gems.example.com").unwrap().username, "env");
        assert_eq!(credentials.for_host("other.example.com").unwrap().username, "local");
        assert!(credentials.for_host("rubygems.org").is_none());
    }

    #[test]
    fn test_read_settings_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = read_settings(&dir.path().join("config")).unwrap();
        assert!(settings.is_empty());
    }

    #[test]
    fn test_read_settings_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, "---\nBUNDLE_GEMS__EXAMPLE__COM: \"carol:pw\"\n").unwrap();

        let credentials = Credentials::from_layers(vec![read_settings(&path).unwrap()]);
        assert_eq!(
            credentials.for_host("gems.example.com"),
            Some(HostCredential {
                username: "carol".to_string(),
                password: "pw".to_string()
            })
        );
    }
}
