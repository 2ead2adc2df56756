//! Consumed interfaces for manifest loading (spec §6). Manifest parsing
//! itself is out of scope; these traits describe only the shape the core
//! depends on.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::identity::PackageIdentity;
use crate::reference::PackageReference;
use crate::solver::Constraint;

/// One root package's manifest as the core needs to see it: its identity,
/// its path (for reporting), the raw bytes used by the origin hash (spec
/// §4.1), its top-level declared dependencies, and the minimum tools
/// version it declares, if any (spec §4.2 "the minimum tools-version
/// across roots", §6 `Package.resolved`'s `minimumToolsVersion` field).
#[derive(Debug, Clone)]
pub struct RootManifest {
    pub identity: PackageIdentity,
    pub path: String,
    pub raw_bytes: Vec<u8>,
    pub declared_dependencies: Vec<PackageReference>,
    pub minimum_tools_version: Option<String>,
}

/// `loadRootManifests(paths) -> Map<Identity, Manifest>`.
#[async_trait]
pub trait RootManifestLoader: Send + Sync {
    async fn load_root_manifests(&self, paths: &[String]) -> anyhow::Result<Vec<RootManifest>>;
}

/// spec §4.2 "the minimum tools-version across roots": roots that don't
/// declare one are ignored; among the ones that do, the lowest wins.
/// Versions are compared component-wise as dotted integers (`"5.7" <
/// "5.10"`) rather than lexicographically, since a root's tools-version is
/// a version string, not an opaque identifier.
pub fn minimum_tools_version_across_roots(roots: &[RootManifest]) -> Option<String> {
    roots
        .iter()
        .filter_map(|r| r.minimum_tools_version.as_deref())
        .min_by(|a, b| compare_dotted_versions(a, b))
        .map(str::to_string)
}

fn compare_dotted_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let parse = |s: &str| -> Vec<u64> { s.split('.').map(|part| part.parse().unwrap_or(0)).collect() };
    parse(a).cmp(&parse(b))
}

/// `.dependencyConstraints`, `.editedPackagesConstraints`,
/// `.missingPackages`, `.requiredPackages` from spec §6.
#[derive(Debug, Clone, Default)]
pub struct DependencyManifests {
    pub dependency_constraints: Vec<Constraint>,
    pub edited_packages_constraints: Vec<Constraint>,
    pub missing_packages: Vec<PackageReference>,
    pub required_packages: HashSet<PackageIdentity>,
}

/// `loadDependencyManifests(root, autoAdd?) -> DependencyManifests`.
#[async_trait]
pub trait DependencyManifestLoader: Send + Sync {
    async fn load_dependency_manifests(
        &self,
        roots: &[RootManifest],
        auto_add: bool,
    ) -> anyhow::Result<DependencyManifests>;
}

/// `updateBinaryArtifacts(manifests, addedOrUpdated, scope)` /
/// `updatePrebuilts(manifests, addedOrUpdated, scope)` — both are
/// fire-and-report side effects the core triggers but does not implement.
#[async_trait]
pub trait ArtifactRefresher: Send + Sync {
    async fn update_binary_artifacts(
        &self,
        manifests: &DependencyManifests,
        added_or_updated: &[PackageReference],
    ) -> anyhow::Result<()>;

    async fn update_prebuilts(
        &self,
        manifests: &DependencyManifests,
        added_or_updated: &[PackageReference],
    ) -> anyhow::Result<()>;
}
