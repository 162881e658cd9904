//! Include/exclude glob matching for search results.

use std::path::Path;

use globset::{Glob, GlobBuilder, GlobMatcher};

use crate::error::{ScanError, ScanResult};

/// Compiled include and exclude globs, matched against paths relative to
/// the scan root.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: GlobMatcher,
    exclude: Option<GlobMatcher>,
}

impl PathFilter {
    /// Compile a filter from an include glob and a list of exclude globs.
    pub fn new(include: &str, exclude_patterns: &[String]) -> ScanResult<Self> {
        let include = compile(include)?.compile_matcher();
        let exclude = exclude_glob(exclude_patterns)
            .map(|pattern| compile(&pattern).map(|glob| glob.compile_matcher()))
            .transpose()?;
        Ok(Self { include, exclude })
    }

    /// Whether a file or folder (relative path) is excluded.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        self.exclude
            .as_ref()
            .is_some_and(|matcher| matcher.is_match(relative))
    }

    /// Whether a file (relative path) should be reported.
    pub fn accepts(&self, relative: &Path) -> bool {
        self.include.is_match(relative) && !self.is_excluded(relative)
    }
}

/// Fold exclude patterns into one `**/{a,b}` alternation.
///
/// A leading `**/` is dropped from each pattern first since the combined
/// glob already matches at any depth. Returns `None` when nothing is
/// excluded.
pub fn exclude_glob(patterns: &[String]) -> Option<String> {
    let parts: Vec<&str> = patterns
        .iter()
        .map(|p| p.trim())
        .map(|p| p.strip_prefix("**/").unwrap_or(p))
        .filter(|p| !p.is_empty())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(format!("**/{{{}}}", parts.join(",")))
    }
}

fn compile(pattern: &str) -> ScanResult<Glob> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| ScanError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}
