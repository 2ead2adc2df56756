//! `PackageReference` and its `kind` discriminant (spec §3).

use crate::identity::PackageIdentity;

/// How a package was declared: by path, by source control, by registry
/// identity, or as a user-managed local override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// One of the packages whose manifest the orchestrator was invoked on.
    Root,
    /// A dependency declared by a local filesystem path.
    FileSystem,
    /// Source control reachable only on the local filesystem (e.g. a bare
    /// repo checked out next to the workspace).
    LocalSourceControl,
    /// Source control reached over the network.
    RemoteSourceControl,
    /// A registry-hosted package, addressed by identity + version range.
    Registry,
    /// A user-initiated local override of an otherwise-managed dependency.
    Edited,
}

impl ReferenceKind {
    pub fn is_source_control(self) -> bool {
        matches!(
            self,
            ReferenceKind::LocalSourceControl | ReferenceKind::RemoteSourceControl
        )
    }
}

/// `{identity, kind, location}` from spec §3. Two references with the same
/// identity but different `location` are distinct for change detection
/// (§4.2 "lookup by location") but share the identity key in the pin store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageReference {
    pub identity: PackageIdentity,
    pub kind: ReferenceKind,
    /// Path for filesystem/local source control, URL for remote source
    /// control, or the registry identity string for a registry package.
    pub location: String,
}

impl PackageReference {
    pub fn new(identity: PackageIdentity, kind: ReferenceKind, location: impl Into<String>) -> Self {
        PackageReference {
            identity,
            kind,
            location: location.into(),
        }
    }

    pub fn root(identity: PackageIdentity, path: impl Into<String>) -> Self {
        Self::new(identity, ReferenceKind::Root, path)
    }
}
