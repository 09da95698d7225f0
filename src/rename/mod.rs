//! Member rename mappings and the sort-order gate.
//!
//! Both signature schemes assume the members are stored in sorted path
//! order: a from-scratch build of the renamed archive would sort the new
//! names, so a rename that breaks the order produces an archive no
//! independent build can reproduce. [`validate_rename_order`] refuses such
//! renames before anything touches the disk.
//!
//! Order is byte-wise ordinal comparison of the UTF-8 paths, which matches
//! Unicode code point order. Uppercase ASCII sorts before lowercase.

pub mod tool;

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

pub use tool::{ExternalRenameTool, SevenZaTool};

/// An ordered list of `(old, new)` member path pairs.
///
/// Each old path appears at most once. Pairs keep their insertion order,
/// which is the order they are handed to the external tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameMapping {
    pairs: Vec<(String, String)>,
}

impl RenameMapping {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a mapping from pairs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateMember`] if an old path repeats.
    pub fn from_pairs<I, O, N>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (O, N)>,
        O: Into<String>,
        N: Into<String>,
    {
        let mut mapping = Self::new();
        for (old, new) in pairs {
            mapping.insert(old, new)?;
        }
        Ok(mapping)
    }

    /// Adds a pair.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateMember`] if `old` is already mapped.
    pub fn insert(&mut self, old: impl Into<String>, new: impl Into<String>) -> Result<()> {
        let old = old.into();
        if self.get(&old).is_some() {
            return Err(Error::DuplicateMember { path: old });
        }
        self.pairs.push((old, new.into()));
        Ok(())
    }

    /// The new path for `old`, if mapped.
    pub fn get(&self, old: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(o, _)| o == old)
            .map(|(_, n)| n.as_str())
    }

    /// Pairs in insertion order.
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Iterates over `(old, new)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(o, n)| (o.as_str(), n.as_str()))
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns true if there are no pairs.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl FromStr for RenameMapping {
    type Err = Error;

    /// Parses `old=new[,old=new...]`.
    ///
    /// Member paths containing `,` or `=` cannot be expressed in this form.
    fn from_str(s: &str) -> Result<Self> {
        let mut mapping = Self::new();
        for item in s.split(',') {
            let (old, new) = item.split_once('=').ok_or_else(|| {
                Error::InvalidFormat(format!("rename '{}' is not of the form old=new", item))
            })?;
            if old.is_empty() || new.is_empty() {
                return Err(Error::InvalidFormat(format!(
                    "rename '{}' has an empty side",
                    item
                )));
            }
            mapping.insert(old, new)?;
        }
        Ok(mapping)
    }
}

impl fmt::Display for RenameMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (old, new)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", old, new)?;
        }
        Ok(())
    }
}

/// Checks that applying `mapping` keeps `current` sorted.
///
/// Each mapped path is replaced in place; unmapped members keep their
/// position. Returns the post-rename order on success.
///
/// # Errors
///
/// - [`Error::UnknownMember`] if a mapped path is not in `current`
/// - [`Error::OrderViolation`] if the result is not sorted
pub fn validate_rename_order(current: &[String], mapping: &RenameMapping) -> Result<Vec<String>> {
    let mut proposed = current.to_vec();
    for (old, new) in mapping.iter() {
        let index = current
            .iter()
            .position(|p| p == old)
            .ok_or_else(|| Error::UnknownMember {
                path: old.to_string(),
            })?;
        proposed[index] = new.to_string();
    }

    if !is_sorted(&proposed) {
        return Err(Error::OrderViolation {
            current: current.to_vec(),
            proposed,
        });
    }
    Ok(proposed)
}

/// Returns true if `paths` is in non-decreasing byte-wise order.
pub fn is_sorted(paths: &[String]) -> bool {
    paths.windows(2).all(|w| w[0].as_bytes() <= w[1].as_bytes())
}

/// Builds a mapping by replacing `old` with `new` in every member path
/// that contains it.
pub fn replace_mapping(paths: &[String], old: &str, new: &str) -> Result<RenameMapping> {
    let mut mapping = RenameMapping::new();
    if old.is_empty() {
        return Ok(mapping);
    }
    for path in paths.iter().filter(|p| p.contains(old)) {
        let renamed = path.replace(old, new);
        log::info!("Pattern matched: {} -> {}", path, renamed);
        mapping.insert(path.as_str(), renamed)?;
    }
    Ok(mapping)
}
