//! Locators for source repositories and static files.
//!
//! A locator is either a path on the local machine (no scheme, or `file://`)
//! or anything else addressable by URL. Local paths are resolved against an
//! explicit base directory, never against the process working directory.

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// Where a repo or file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Path on the local filesystem, possibly relative.
    Local(PathBuf),
    /// Remote URL, kept verbatim.
    Remote(String),
}

impl Locator {
    /// Parse a raw locator string.
    ///
    /// - `"./contracts"`, `"/abs/path"` -> `Local`
    /// - `"file:///abs/path"` -> `Local("/abs/path")`
    /// - `"https://github.com/org/repo"` -> `Remote`
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(ConfigError::InvalidLocator {
                locator: raw.to_string(),
                reason: "locator is empty".to_string(),
            });
        }

        if let Some((scheme, rest)) = raw.split_once("://") {
            if !is_valid_scheme(scheme) {
                return Err(ConfigError::InvalidLocator {
                    locator: raw.to_string(),
                    reason: format!("invalid scheme '{scheme}'"),
                });
            }
            if scheme.eq_ignore_ascii_case("file") {
                return Ok(Locator::Local(PathBuf::from(rest)));
            }
            return Ok(Locator::Remote(raw.to_string()));
        }

        // `host:path` has no scheme but is not a local path either
        let first_segment = raw.split('/').next().unwrap_or_default();
        if first_segment.contains(':') {
            return Err(ConfigError::InvalidLocator {
                locator: raw.to_string(),
                reason: "scp-style locators are not supported".to_string(),
            });
        }

        Ok(Locator::Local(PathBuf::from(raw)))
    }

    /// Whether this locator points at the local filesystem.
    pub fn is_local(&self) -> bool {
        matches!(self, Locator::Local(_))
    }

    /// Resolve a local locator against `base_dir`.
    ///
    /// Returns `None` for remote locators.
    pub fn resolve(&self, base_dir: &Path) -> Option<PathBuf> {
        match self {
            Locator::Local(path) => Some(ensure_abs(base_dir, path)),
            Locator::Remote(_) => None,
        }
    }
}

/// Join `path` onto `base_dir` unless it is already absolute.
pub fn ensure_abs(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
