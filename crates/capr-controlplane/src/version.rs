//! Version comparison across the RKE2 and Kubernetes version namespaces
//!
//! A Machine may report either the RKE2 release it was bootstrapped with
//! (`v1.28.5+rke2r1`) or the Kubernetes version of its kubelet (`v1.28.5`).
//! The desired version on the control plane is always an RKE2 release, so
//! it is translated to the Kubernetes namespace before comparing with a
//! Kubernetes-style report.

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

/// Marker that distinguishes RKE2 release versions
const RKE2_MARKER: &str = "rke2";

/// Build metadata prefix carried by every RKE2 release
const RKE2_BUILD_PREFIX: &str = "+rke2r";

/// Errors from version parsing and translation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// The string is not a dotted numeric version
    #[error("invalid version {version:?}: {reason}")]
    Invalid {
        /// The rejected input
        version: String,
        /// What was wrong with it
        reason: String,
    },

    /// The string mentions RKE2 but is not in `vX.Y.Z+rke2rN` form
    #[error("invalid RKE2 version {0:?}: expected vX.Y.Z+rke2rN")]
    InvalidRke2(String),
}

/// Whether a version string is in the RKE2 namespace
pub fn is_rke2_version(version: &str) -> bool {
    version.contains(RKE2_MARKER)
}

/// Translate an RKE2 release version to the Kubernetes version it ships
///
/// `v1.28.5+rke2r1` becomes `v1.28.5`. Versions without an RKE2 marker are
/// already Kubernetes versions and are returned unchanged.
pub fn rke2_to_kube_version(version: &str) -> Result<String, VersionError> {
    if !is_rke2_version(version) {
        return Ok(version.to_string());
    }

    let (kube, revision) = version
        .split_once(RKE2_BUILD_PREFIX)
        .ok_or_else(|| VersionError::InvalidRke2(version.to_string()))?;

    if revision.is_empty() || !revision.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VersionError::InvalidRke2(version.to_string()));
    }

    let parsed =
        Version::parse(kube).map_err(|_| VersionError::InvalidRke2(version.to_string()))?;
    if !parsed.pre.is_empty() || !parsed.build.is_empty() {
        return Err(VersionError::InvalidRke2(version.to_string()));
    }

    Ok(format!("v{}", kube.trim_start_matches('v')))
}

/// A parsed `major.minor.patch[-pre][+build]` version
///
/// Parsing is tolerant: the `v` prefix is optional and missing minor or
/// patch components default to zero. [`Version::precedence_cmp`] follows
/// semantic version precedence and ignores build metadata; `Ord` breaks
/// precedence ties on build metadata so it stays consistent with `Eq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    /// Major component
    pub major: u64,
    /// Minor component
    pub minor: u64,
    /// Patch component
    pub patch: u64,
    /// Dot-separated pre-release identifiers
    pub pre: Vec<Identifier>,
    /// Dot-separated build metadata identifiers
    pub build: Vec<Identifier>,
}

/// A single pre-release or build identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// Purely numeric identifier, compared numerically
    Numeric(u64),
    /// Identifier containing non-digits, compared lexically
    AlphaNumeric(String),
}

impl Identifier {
    fn parse(raw: &str, whole: &str) -> Result<Self, VersionError> {
        if raw.is_empty() {
            return Err(invalid(whole, "empty identifier"));
        }
        if !raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return Err(invalid(whole, format!("illegal character in {:?}", raw)));
        }
        if raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = raw.parse::<u64>() {
                return Ok(Identifier::Numeric(n));
            }
        }
        Ok(Identifier::AlphaNumeric(raw.to_string()))
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Identifier::Numeric(a), Identifier::Numeric(b)) => a.cmp(b),
            (Identifier::Numeric(_), Identifier::AlphaNumeric(_)) => Ordering::Less,
            (Identifier::AlphaNumeric(_), Identifier::Numeric(_)) => Ordering::Greater,
            (Identifier::AlphaNumeric(a), Identifier::AlphaNumeric(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Numeric(n) => write!(f, "{}", n),
            Identifier::AlphaNumeric(s) => f.write_str(s),
        }
    }
}

fn invalid(version: &str, reason: impl Into<String>) -> VersionError {
    VersionError::Invalid {
        version: version.to_string(),
        reason: reason.into(),
    }
}

fn parse_identifiers(raw: &str, whole: &str) -> Result<Vec<Identifier>, VersionError> {
    raw.split('.').map(|id| Identifier::parse(id, whole)).collect()
}

impl Version {
    /// Parse a version string
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        let rest = trimmed.strip_prefix('v').unwrap_or(trimmed);
        if rest.is_empty() {
            return Err(invalid(input, "empty version"));
        }

        let (rest, build) = match rest.split_once('+') {
            Some((head, build)) => (head, parse_identifiers(build, input)?),
            None => (rest, Vec::new()),
        };
        let (core, pre) = match rest.split_once('-') {
            Some((head, pre)) => (head, parse_identifiers(pre, input)?),
            None => (rest, Vec::new()),
        };

        let parts = core
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid(input, format!("non-numeric component {:?}", part)));
                }
                part.parse::<u64>()
                    .map_err(|e| invalid(input, format!("component {:?}: {}", part, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (major, minor, patch) = match parts.as_slice() {
            [major] => (*major, 0, 0),
            [major, minor] => (*major, *minor, 0),
            [major, minor, patch] => (*major, *minor, *patch),
            _ => return Err(invalid(input, "expected at most three numeric components")),
        };

        Ok(Self {
            major,
            minor,
            patch,
            pre,
            build,
        })
    }
}

impl Version {
    /// Semantic version precedence, ignoring build metadata
    ///
    /// `v1.28.5+rke2r1` and `v1.28.5+rke2r2` have equal precedence.
    pub fn precedence_cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                // A release sorts after all of its pre-releases
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.pre.cmp(&other.pre),
            })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence_cmp(other)
            .then_with(|| self.build.cmp(&other.build))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)?;
        let join = |ids: &[Identifier]| {
            ids.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(".")
        };
        if !self.pre.is_empty() {
            write!(f, "-{}", join(&self.pre))?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", join(&self.build))?;
        }
        Ok(())
    }
}

/// Whether two versions have equal precedence
///
/// Build metadata is ignored, so RKE2 revisions of the same Kubernetes
/// release compare equal. Two empty strings are equal; one empty string never is. If either side
/// does not parse, the strings are compared after dropping a `v` prefix.
pub fn compare_versions(a: &str, b: &str) -> bool {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return true,
        (true, false) | (false, true) => return false,
        _ => {}
    }
    match (Version::parse(a), Version::parse(b)) {
        (Ok(a), Ok(b)) => a.precedence_cmp(&b) == Ordering::Equal,
        _ => a.trim_start_matches('v') == b.trim_start_matches('v'),
    }
}
