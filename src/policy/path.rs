//! Lexical path containment for the remote workspace
//!
//! Paths are resolved purely lexically against the configured root; nothing
//! here touches the local or remote filesystem.

use crate::error::{OpsError, Result};

/// Why a caller-supplied path was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRejection {
    Empty,
    ControlCharacter,
    Absolute,
    Escapes,
}

/// A normalized absolute workspace root (no trailing slash)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRoot {
    root: String,
}

/// A path resolved under the workspace root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub absolute: String,
    /// Segments relative to the root
    pub segments: Vec<String>,
}

impl WorkspaceRoot {
    pub fn new(raw: &str) -> Result<Self> {
        if !raw.starts_with('/') {
            return Err(OpsError::Config(format!("workspace root must be absolute: {}", raw)));
        }
        let segments: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return Err(OpsError::Config("workspace root cannot be /".to_string()));
        }
        if segments.iter().any(|s| *s == "." || *s == "..") {
            return Err(OpsError::Config(format!("workspace root must be normalized: {}", raw)));
        }
        Ok(Self {
            root: format!("/{}", segments.join("/")),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.root
    }

    /// Resolve a relative path; the result is always a strict descendant of the root
    pub fn resolve(&self, raw: &str) -> std::result::Result<ResolvedPath, PathRejection> {
        if raw.trim().is_empty() {
            return Err(PathRejection::Empty);
        }
        if raw.chars().any(|c| c.is_control()) {
            return Err(PathRejection::ControlCharacter);
        }
        if raw.starts_with('/') || raw.starts_with('~') {
            return Err(PathRejection::Absolute);
        }

        let mut segments: Vec<String> = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(PathRejection::Escapes);
                    }
                }
                other => segments.push(other.to_string()),
            }
        }

        // The root itself is not a strict descendant
        if segments.is_empty() {
            return Err(PathRejection::Escapes);
        }

        let absolute = format!("{}/{}", self.root, segments.join("/"));
        Ok(ResolvedPath { absolute, segments })
    }
}

/// Forbidden-path pattern, matched against contiguous path segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForbiddenPattern {
    segments: Vec<String>,
}

impl ForbiddenPattern {
    /// Parse a pattern like `.ssh`, `~/.ssh`, or `/etc/shadow`
    pub fn parse(raw: &str) -> Option<Self> {
        let segments: Vec<String> = raw
            .split('/')
            .filter(|s| !s.is_empty() && *s != "~" && *s != ".")
            .map(|s| s.to_ascii_lowercase())
            .collect();
        if segments.is_empty() { None } else { Some(Self { segments }) }
    }

    /// Matches when the pattern's segments appear contiguously in `path`.
    /// The final pattern segment also matches dotted extensions
    /// (`.env` matches `.env.local`, `id_rsa` matches `id_rsa.pub`).
    pub fn matches(&self, path: &[String]) -> bool {
        let n = self.segments.len();
        if path.len() < n {
            return false;
        }
        path.windows(n).any(|window| {
            window.iter().zip(&self.segments).enumerate().all(|(i, (seg, pat))| {
                let seg = seg.to_ascii_lowercase();
                if i + 1 == n {
                    seg == *pat || seg.strip_prefix(pat.as_str()).is_some_and(|rest| rest.starts_with('.'))
                } else {
                    seg == *pat
                }
            })
        })
    }
}
