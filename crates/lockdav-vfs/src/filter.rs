//! Visibility rules for directory listings.
//!
//! Two pattern lists control what clients can see:
//! - `not_in_list`: entries omitted from listings but still addressable
//! - `nondisclosure`: entries omitted from listings and reported as missing

use globset::{Glob, GlobSet, GlobSetBuilder};

/// Glob patterns applied to single path segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiddenPatterns {
    /// Hidden from listings only.
    pub not_in_list: Vec<String>,
    /// Hidden from listings and direct access.
    pub nondisclosure: Vec<String>,
}

impl Default for HiddenPatterns {
    fn default() -> Self {
        Self {
            not_in_list: vec![".*".to_string()],
            nondisclosure: vec![".ht*".to_string()],
        }
    }
}

impl HiddenPatterns {
    /// No hidden entries at all.
    pub fn none() -> Self {
        Self {
            not_in_list: Vec::new(),
            nondisclosure: Vec::new(),
        }
    }
}

/// Compiled form of [`HiddenPatterns`].
#[derive(Debug, Clone)]
pub struct EntryFilter {
    unlisted: GlobSet,
    undisclosed: GlobSet,
}

impl EntryFilter {
    /// Compile the pattern lists.
    pub fn new(patterns: &HiddenPatterns) -> Result<Self, globset::Error> {
        Ok(Self {
            unlisted: build_set(&patterns.not_in_list)?,
            undisclosed: build_set(&patterns.nondisclosure)?,
        })
    }

    /// Whether a child named `name` is left out of listings.
    pub fn is_unlisted(&self, name: &str) -> bool {
        self.unlisted.is_match(name) || self.undisclosed.is_match(name)
    }

    /// Whether any segment of `path` must not be disclosed.
    pub fn is_undisclosed(&self, path: &str) -> bool {
        crate::path::segments(path).any(|seg| self.undisclosed.is_match(seg))
    }
}

impl Default for EntryFilter {
    fn default() -> Self {
        Self {
            unlisted: GlobSet::empty(),
            undisclosed: GlobSet::empty(),
        }
    }
}

fn build_set(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    builder.build()
}
