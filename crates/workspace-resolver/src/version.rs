//! Version and revision newtypes shared across the core.

use std::fmt;

pub use semver::Version;

/// An opaque source-control revision identifier (a git commit hash, for
/// example). Kept as a newtype rather than a bare `String` so call sites
/// can't accidentally compare a revision against a branch name or a
/// location string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Revision(pub String);

impl Revision {
    pub fn new(id: impl Into<String>) -> Self {
        Revision(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Revision {
    fn from(s: &str) -> Self {
        Revision(s.to_string())
    }
}
