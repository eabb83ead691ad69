//! Server version parsing and range matching for advisories

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CatalogError;

/// A MongoDB release number, ordered numerically
///
/// Pre-release and build suffixes (`-rc1`, `-ent`) are ignored, so `3.0.6-rc0`
/// compares equal to `3.0.6`. Missing components count as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServerVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for ServerVersion {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let release = s
            .trim()
            .split(['-', '+', ' '])
            .next()
            .unwrap_or_default();
        if release.is_empty() {
            return Err(CatalogError::InvalidVersion(s.to_string()));
        }

        let mut parts = [0u32; 3];
        for (i, piece) in release.split('.').enumerate() {
            if i >= parts.len() {
                break;
            }
            parts[i] = piece
                .parse()
                .map_err(|_| CatalogError::InvalidVersion(s.to_string()))?;
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl TryFrom<String> for ServerVersion {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ServerVersion> for String {
    fn from(v: ServerVersion) -> Self {
        v.to_string()
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Inclusive range of affected versions; an open bound is unbounded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<ServerVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<ServerVersion>,
}

impl VersionRange {
    /// Whether `version` falls inside the range
    pub fn contains(&self, version: &ServerVersion) -> bool {
        self.min.is_none_or(|min| *version >= min) && self.max.is_none_or(|max| *version <= max)
    }
}

/// Whether a server matches an advisory
///
/// # Arguments
/// * `affected` - Vulnerable version ranges
/// * `module` - Module that must be installed for the advisory to apply
/// * `version` - Version reported by the server
/// * `modules` - Modules reported by the server
///
/// # Returns
/// * `bool` - True if the server is vulnerable
pub fn is_affected(
    affected: &[VersionRange],
    module: Option<&str>,
    version: &ServerVersion,
    modules: &[String],
) -> bool {
    if let Some(required) = module {
        if !modules.iter().any(|m| m == required) {
            return false;
        }
    }
    affected.iter().any(|range| range.contains(version))
}
