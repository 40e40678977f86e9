//! Version identifiers and range constraints.
//!
//! Schema versions and package versions share one representation: a
//! normalized, totally ordered major.minor.patch triple. Constraints are
//! range predicates over versions (`>=1.0.0`, `^2.1`, `>=1.0.0, <2.0.0`)
//! used both to pick installable package versions and to order handler
//! chains.

use std::fmt;

use semver::{Version, VersionReq};

use crate::error::{ResolveError, VersionError};

/// A normalized schema or package version.
///
/// Parsing strips a single leading `v`/`V` marker, so `"v1.2.0"` and
/// `"1.2.0"` are the same `VersionId`. Ordering is standard semantic
/// versioning: major, then minor, then patch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionId(Version);

impl VersionId {
    /// Build a version from its numeric components.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        VersionId(Version::new(major, minor, patch))
    }

    /// Parse a version string, normalizing a leading `v` marker.
    ///
    /// # Errors
    ///
    /// Returns `VersionError::InvalidVersionFormat` if the remainder is not
    /// a major.minor.patch triple.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        let bare = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        Version::parse(bare)
            .map(VersionId)
            .map_err(|e| VersionError::InvalidVersionFormat {
                input: input.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    pub fn patch(&self) -> u64 {
        self.0.patch
    }

    /// True when `other` shares this version's major and minor components.
    ///
    /// Used by the registry-index handler family, which revs its patch
    /// version without structural change.
    pub fn same_minor(&self, other: &VersionId) -> bool {
        self.0.major == other.0.major && self.0.minor == other.0.minor
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl serde::Serialize for VersionId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

/// A version-range constraint.
///
/// Stateless: parsed once, reusable across resolution calls. Supports
/// comma-joined comparators (`>=1.0.0, <2.0.0`), exact (`=1.2.3`), caret
/// compatibility (`^2.1`: same major, minor at least 1), and tilde ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    raw: String,
    req: VersionReq,
}

impl Constraint {
    /// Parse a constraint expression.
    ///
    /// # Errors
    ///
    /// Returns `VersionError::InvalidConstraintFormat` on malformed input.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let req =
            VersionReq::parse(input.trim()).map_err(|e| VersionError::InvalidConstraintFormat {
                input: input.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Constraint {
            raw: input.trim().to_string(),
            req,
        })
    }

    /// True when `version` satisfies this constraint.
    pub fn matches(&self, version: &VersionId) -> bool {
        self.req.matches(&version.0)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Select the highest candidate satisfying `constraint`.
///
/// # Errors
///
/// Returns `ResolveError::NoCompatibleVersion` naming the constraint and
/// the full candidate set when no candidate satisfies it. Never falls back
/// to a "closest" version.
pub fn find_compatible(
    candidates: &[VersionId],
    constraint: &Constraint,
) -> Result<VersionId, ResolveError> {
    candidates
        .iter()
        .filter(|v| constraint.matches(v))
        .max()
        .cloned()
        .ok_or_else(|| ResolveError::NoCompatibleVersion {
            constraint: constraint.to_string(),
            candidates: candidates.iter().map(VersionId::to_string).collect(),
        })
}
