//! Rendering a gemset as a Nix attribute set or as JSON
//!
//! Output is stable: attribute names are sorted, scalar lists stay on one
//! line, nested sets are indented two spaces per level.

use super::Gemset;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

const NIX_KEYWORDS: &[&str] = &[
    "assert", "else", "if", "in", "inherit", "let", "or", "rec", "then", "with",
];

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to serialize gemset: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub fn render_nix(gemset: &Gemset) -> Result<String, RenderError> {
    let value = serde_json::to_value(gemset)?;
    let mut out = String::new();
    render_value(&value, 0, &mut out);
    out.push('\n');
    Ok(out)
}

pub fn render_json(gemset: &Gemset) -> Result<String, RenderError> {
    let mut out = serde_json::to_string_pretty(gemset)?;
    out.push('\n');
    Ok(out)
}

/// A double-quoted Nix string.
pub fn string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn attribute_name(key: &str) -> String {
    let mut chars = key.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '\''));

    if starts_ok && rest_ok && !NIX_KEYWORDS.contains(&key) {
        key.to_string()
    } else {
        string_literal(key)
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn render_value(value: &Value, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(&string_literal(s)),
        Value::Array(items) if items.is_empty() => out.push_str("[]"),
        Value::Array(items) if items.iter().all(is_scalar) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                render_value(item, depth, out);
            }
            out.push(']');
        }
        Value::Array(items) => {
            out.push_str("[\n");
            for item in items {
                out.push_str(&indent);
                out.push_str("  ");
                render_value(item, depth + 1, out);
                out.push('\n');
            }
            out.push_str(&indent);
            out.push(']');
        }
        Value::Object(map) if map.is_empty() => out.push_str("{ }"),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push_str("{\n");
            for key in keys {
                out.push_str(&indent);
                out.push_str("  ");
                out.push_str(&attribute_name(key));
                out.push_str(" = ");
                render_value(&map[key.as_str()], depth + 1, out);
                out.push_str(";\n");
            }
            out.push_str(&indent);
            out.push('}');
        }
    }
}

/// Replace `path` with `content` in one rename, so readers never see a
/// partial file.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), RenderError> {
    let write_error = |source| RenderError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".gemset.")
        .tempfile_in(&dir)
        .map_err(write_error)?;
    tmp.write_all(content.as_bytes()).map_err(write_error)?;
    tmp.flush().map_err(write_error)?;
    tmp.persist(path).map_err(|e| write_error(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemset::{GemsetEntry, SourceDescriptor};
    use crate::platform::EnginePlatform;

    fn sample() -> Gemset {
        Gemset::from([
            (
                "rack".to_string(),
                GemsetEntry {
                    version: "3.0.8".to_string(),
                    source: Some(SourceDescriptor::Gem {
                        remotes: vec!["https://rubygems.org".to_string()],
                        sha256: "abc".to_string(),
                        target: None,
                        target_cpu: None,
                        target_os: None,
                    }),
                    groups: vec!["default".to_string()],
                    platforms: Vec::new(),
                    dependencies: Vec::new(),
                    targets: Vec::new(),
                },
            ),
            (
                "local-engine".to_string(),
                GemsetEntry {
                    version: "0.1.0".to_string(),
                    source: Some(SourceDescriptor::Path {
                        path: "engines/local".to_string(),
                    }),
                    groups: vec!["default".to_string()],
                    platforms: vec![EnginePlatform {
                        engine: "jruby".to_string(),
                        version: None,
                    }],
                    dependencies: vec!["rack".to_string()],
                    targets: Vec::new(),
                },
            ),
        ])
    }

    #[test]
    fn test_render_nix() {
        let expected = r#"{
  local-engine = {
    dependencies = ["rack"];
    groups = ["default"];
    platforms = [
      {
        engine = "jruby";
      }
    ];
    source = {
      path = "engines/local";
      type = "path";
    };
    targets = [];
    version = "0.1.0";
  };
  rack = {
    groups = ["default"];
    platforms = [];
    source = {
      remotes = ["https://rubygems.org"];
      sha256 = "abc";
      type = "gem";
    };
    targets = [];
    version = "3.0.8";
  };
}
"#;
        assert_eq!(render_nix(&sample()).unwrap(), expected);
    }

    #[test]
    fn test_render_json_reads_back() {
        let json = render_json(&sample()).unwrap();
        let parsed: Gemset = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn test_string_literal_escapes() {
        assert_eq!(string_literal("plain"), "\"plain\"");
        assert_eq!(string_literal("a\"b\\c"), "\"a\\\"b\\\\c\"");
        assert_eq!(string_literal("${x} $y"), "\"\\${x} $y\"");
        assert_eq!(string_literal("two\nlines"), "\"two\\nlines\"");
    }

    #[test]
    fn test_attribute_names() {
        assert_eq!(attribute_name("rack"), "rack");
        assert_eq!(attribute_name("net-http"), "net-http");
        assert_eq!(attribute_name("3scale-api"), "\"3scale-api\"");
        assert_eq!(attribute_name("with"), "\"with\"");
        assert_eq!(attribute_name("rails.rb"), "\"rails.rb\"");
    }

    #[test]
    fn test_write_atomic_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gemset.nix");
        std::fs::write(&path, "old").unwrap();

        write_atomic(&path, "{ }\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ }\n");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".gemset."))
            .collect();
        assert!(leftovers.is_empty());
    }
}
