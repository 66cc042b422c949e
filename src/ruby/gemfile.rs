//! Gemfile parsing for group and platform declarations
//!
//! A Gemfile is Ruby code, but the parts gemset cares about are declarative:
//! ```ruby
//! gem "rails", "~> 7.1"
//! gem "pg", platforms: :mri
//!
//! group :development, :test do
//!   gem "rspec-rails"
//!   platforms :jruby do
//!     gem "activerecord-jdbc-adapter"
//!   end
//! end
//! ```
//!
//! Only `gem`, `group` and `platforms`/`platform` are interpreted. Every other
//! block opener is tracked so its `end` closes the right scope.

use crate::model::{DEFAULT_GROUP, DependencyConstraint};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum GemfileError {
    #[error("No Gemfile found at {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Keywords that open a scope closed by `end` when they start a statement.
const BLOCK_KEYWORDS: &[&str] = &[
    "if", "unless", "case", "begin", "while", "until", "def", "class", "module", "for",
];

enum Scope {
    Group(Vec<String>),
    Platforms(Vec<String>),
    Other,
}

pub fn read(path: &Path) -> Result<Vec<DependencyConstraint>, GemfileError> {
    if !path.is_file() {
        return Err(GemfileError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let content = fs::read_to_string(path).map_err(|source| GemfileError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse(&content))
}

/// Collect one constraint per declared gem, merging repeated declarations.
pub fn parse(content: &str) -> Vec<DependencyConstraint> {
    let mut scopes: Vec<Scope> = Vec::new();
    let mut order: Vec<String> = Vec::new();
    let mut declared: BTreeMap<String, DependencyConstraint> = BTreeMap::new();

    for statement in statements(content) {
        let (keyword, rest) = match statement.split_once(|c: char| c.is_whitespace() || c == '(') {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (statement.as_str(), ""),
        };

        if keyword == "end" || keyword.starts_with("end.") || keyword.starts_with("end)") {
            scopes.pop();
            continue;
        }

        match keyword {
            "gem" => {
                let Some(mut constraint) = parse_gem(rest, &scopes) else {
                    debug!("skipping gem declaration: {}", statement);
                    continue;
                };
                match declared.get_mut(&constraint.name) {
                    Some(existing) => {
                        existing.groups.append(&mut constraint.groups);
                        existing.platforms.append(&mut constraint.platforms);
                    }
                    None => {
                        order.push(constraint.name.clone());
                        declared.insert(constraint.name.clone(), constraint);
                    }
                }
            }
            "group" | "platforms" | "platform" if opens_block(&statement) => {
                let names = block_names(strip_do(rest));
                scopes.push(if keyword == "group" {
                    Scope::Group(names)
                } else {
                    Scope::Platforms(names)
                });
            }
            _ if BLOCK_KEYWORDS.contains(&keyword) && !statement.ends_with(" end") => {
                scopes.push(Scope::Other)
            }
            _ if opens_block(&statement) => scopes.push(Scope::Other),
            _ => {}
        }
    }

    order
        .into_iter()
        .filter_map(|name| declared.remove(&name))
        .collect()
}

/// Logical statements: comments stripped, continuation lines joined.
fn statements(content: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut pending = String::new();

    for raw in content.lines() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }
        if !pending.is_empty() {
            pending.push(' ');
        }
        pending.push_str(line.trim_end_matches('\\').trim_end());

        let continues = line.ends_with(',')
            || line.ends_with('\\')
            || depth(&pending) > 0
            || block_params(&pending).is_some_and(|params| !params.contains('|'));
        if !continues {
            out.push(std::mem::take(&mut pending));
        }
    }
    if !pending.is_empty() {
        out.push(pending);
    }
    out
}

fn strip_comment(line: &str) -> &str {
    let mut quote = None;
    for (i, c) in line.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '#') => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Open bracket nesting outside string literals.
fn depth(text: &str) -> i32 {
    let mut quote = None;
    let mut depth = 0;
    for c in text.chars() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '[' | '(' | '{') => depth += 1,
            (None, ']' | ')' | '}') => depth -= 1,
            _ => {}
        }
    }
    depth
}

fn opens_block(statement: &str) -> bool {
    if statement.ends_with(" do") || statement == "do" {
        return true;
    }
    // `do |args|`
    block_params(statement)
        .and_then(|params| params.strip_suffix('|'))
        .is_some_and(|inner| !inner.contains('|'))
}

/// Text after the last ` do |`, up to the end of the statement.
fn block_params(statement: &str) -> Option<&str> {
    statement
        .rfind(" do |")
        .map(|idx| &statement[idx + " do |".len()..])
}

fn strip_do(rest: &str) -> &str {
    let rest = match rest.find(" do |") {
        Some(idx) => &rest[..idx],
        None => {
            let rest = rest.trim_end();
            rest.strip_suffix("do").unwrap_or(rest)
        }
    };
    rest.trim().trim_start_matches('(').trim_end_matches(')')
}

/// Split arguments on top-level commas, dropping a trailing `if`/`unless`
/// modifier.
fn split_args(args: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote = None;
    let mut depth = 0;

    for c in args.chars() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '[' | '(' | '{') => depth += 1,
            (None, ']' | ')' | '}') => depth -= 1,
            (None, ',') if depth == 0 => {
                parts.push(std::mem::take(&mut current).trim().to_string());
                continue;
            }
            _ => {}
        }
        current.push(c);

        if quote.is_none() && depth == 0 {
            for modifier in [" if ", " unless "] {
                if current.ends_with(modifier) {
                    let keep = current.len() - modifier.len();
                    current.truncate(keep);
                    parts.push(std::mem::take(&mut current).trim().to_string());
                    return parts.into_iter().filter(|p| !p.is_empty()).collect();
                }
            }
        }
    }
    parts.push(current.trim().to_string());
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

/// `group: :test`, `:group => :test` and `"group" => :test` all give
/// `("group", ":test")`.
fn split_option(arg: &str) -> Option<(String, &str)> {
    if let Some((key, value)) = arg.split_once("=>") {
        let key = key.trim().trim_start_matches(':').trim_matches(|c| c == '"' || c == '\'');
        return Some((key.to_string(), value.trim()));
    }
    let (key, value) = arg.split_once(':')?;
    let is_ident = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    // `Foo::Bar` is a constant path, not a keyword argument
    if !is_ident || value.starts_with(':') {
        return None;
    }
    Some((key.to_string(), value.trim()))
}

/// `:test`, `"test"` or `'test'`.
fn scalar(value: &str) -> Option<String> {
    let value = value.trim();
    let value = value
        .strip_prefix(':')
        .unwrap_or(value)
        .trim_matches(|c| c == '"' || c == '\'');
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    valid.then(|| value.to_string())
}

/// A scalar, `[:a, :b]`, `%i[a b]` or `%w[a b]`.
fn list(value: &str) -> Vec<String> {
    let value = value.trim();
    if let Some(inner) = value
        .strip_prefix("%i")
        .or_else(|| value.strip_prefix("%w"))
        .map(|rest| rest.trim_start_matches(['[', '(']).trim_end_matches([']', ')']))
    {
        return inner.split_whitespace().filter_map(scalar).collect();
    }
    if let Some(inner) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        return inner.split(',').filter_map(scalar).collect();
    }
    scalar(value).into_iter().collect()
}

fn block_names(args: &str) -> Vec<String> {
    split_args(args)
        .iter()
        .filter(|arg| split_option(arg).is_none())
        .flat_map(|arg| list(arg))
        .collect()
}

fn parse_gem(rest: &str, scopes: &[Scope]) -> Option<DependencyConstraint> {
    // `gem("rails")` leaves the closing paren behind once the keyword is split off
    let rest = rest.trim().trim_start_matches('(');
    let rest = if depth(rest) < 0 {
        rest.strip_suffix(')').unwrap_or(rest)
    } else {
        rest
    };
    let args = split_args(rest);
    let first = args.first()?;
    if !(first.starts_with('"') || first.starts_with('\'')) {
        return None;
    }
    let name = scalar(first)?;

    let mut groups: BTreeSet<String> = BTreeSet::new();
    let mut platforms: BTreeSet<String> = BTreeSet::new();
    for scope in scopes {
        match scope {
            Scope::Group(names) => groups.extend(names.iter().cloned()),
            Scope::Platforms(names) => platforms.extend(names.iter().cloned()),
            Scope::Other => {}
        }
    }

    for arg in &args[1..] {
        let Some((key, value)) = split_option(arg) else {
            continue;
        };
        match key.as_str() {
            "group" | "groups" => groups.extend(list(value)),
            "platform" | "platforms" => platforms.extend(list(value)),
            _ => {}
        }
    }

    if groups.is_empty() {
        groups.insert(DEFAULT_GROUP.to_string());
    }

    Some(DependencyConstraint {
        name,
        groups,
        platforms,
    })
}
