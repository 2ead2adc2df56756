//! In-memory fakes for driving a [`workspace_resolver::orchestrator::ResolveOrchestrator`]
//! end to end without touching a filesystem, a registry, or a network —
//! the same role `cargo-test-support` plays for `cargo`'s own test suite,
//! scaled down to what this crate's consumed interfaces need.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use workspace_resolver::checkout::{ArtifactStore, CustomContainerRetriever};
use workspace_resolver::container::{Container, ContainerKind, ContainerProvider, OperationScope, Tag, UpdateStrategy};
use workspace_resolver::delegate::WorkspaceDelegate;
use workspace_resolver::identity::PackageIdentity;
use workspace_resolver::manifest::{ArtifactRefresher, DependencyManifestLoader, DependencyManifests, RootManifest, RootManifestLoader};
use workspace_resolver::reference::PackageReference;
use workspace_resolver::solver::{BoundVersion, Constraint, DependencyResolverBinding, ProductFilter, Resolver, SolveFailure, VersionRequirement};
use workspace_resolver::version::{Revision, Version};

/// One entry of an in-memory "registry": a package's available versions and
/// what each version transitively requires. Mirrors `resolver-tests`'
/// `registry(vec![pkg!(...)])` helper, reduced to what our `Resolver` fake
/// needs to walk.
#[derive(Debug, Clone, Default)]
pub struct PackageEntry {
    pub identity: PackageIdentity,
    pub kind: ContainerKind,
    pub versions: Vec<Version>,
    pub dependencies: HashMap<String, Vec<Constraint>>,
}

impl PackageEntry {
    pub fn new(name: &str) -> Self {
        PackageEntry {
            identity: PackageIdentity::from_name(name),
            kind: ContainerKind::Registry,
            versions: Vec::new(),
            dependencies: HashMap::new(),
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.versions.push(Version::parse(version).expect("valid semver in test fixture"));
        self
    }

    pub fn depends_on(mut self, version: &str, constraint: Constraint) -> Self {
        self.dependencies.entry(version.to_string()).or_default().push(constraint);
        self
    }
}

/// A greedy, deterministic stand-in for the real PubGrub-style solver: for
/// each constraint, picks the highest version in the registry satisfying
/// it, then recurses into that version's declared dependencies. Good
/// enough to exercise the orchestrator's reconciliation and checkout paths;
/// it is not a general-purpose SAT solver and never needs to be one here.
pub struct FakeResolver {
    pub registry: HashMap<PackageIdentity, PackageEntry>,
}

impl FakeResolver {
    pub fn new(entries: impl IntoIterator<Item = PackageEntry>) -> Self {
        FakeResolver {
            registry: entries.into_iter().map(|e| (e.identity.clone(), e)).collect(),
        }
    }

    fn resolve_one(
        &self,
        constraint: &Constraint,
        out: &mut HashMap<PackageIdentity, DependencyResolverBinding>,
    ) -> Result<(), SolveFailure> {
        if out.contains_key(&constraint.package.identity) {
            return Ok(());
        }
        match &constraint.requirement {
            VersionRequirement::Unversioned => {
                out.insert(
                    constraint.package.identity.clone(),
                    DependencyResolverBinding {
                        package: constraint.package.clone(),
                        bound_version: BoundVersion::Unversioned,
                        products: ProductFilter::default(),
                    },
                );
                Ok(())
            }
            VersionRequirement::Revision(revision, branch) => {
                out.insert(
                    constraint.package.identity.clone(),
                    DependencyResolverBinding {
                        package: constraint.package.clone(),
                        bound_version: BoundVersion::Revision(revision.clone(), branch.clone()),
                        products: ProductFilter::default(),
                    },
                );
                Ok(())
            }
            VersionRequirement::Version(req) => {
                let entry = self.registry.get(&constraint.package.identity).ok_or_else(|| {
                    SolveFailure::MissingPackage(constraint.package.clone().into())
                })?;
                let chosen = entry
                    .versions
                    .iter()
                    .filter(|v| req.matches(v))
                    .max()
                    .cloned()
                    .ok_or_else(|| SolveFailure::MissingPackage(constraint.package.clone().into()))?;
                out.insert(
                    constraint.package.identity.clone(),
                    DependencyResolverBinding {
                        package: constraint.package.clone(),
                        bound_version: BoundVersion::Version(chosen.clone()),
                        products: ProductFilter::default(),
                    },
                );
                if let Some(deps) = entry.dependencies.get(&chosen.to_string()) {
                    for dep in deps.clone() {
                        self.resolve_one(&dep, out)?;
                    }
                }
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Resolver for FakeResolver {
    async fn solve(&self, constraints: &[Constraint]) -> Result<Vec<DependencyResolverBinding>, SolveFailure> {
        let mut out = HashMap::new();
        for constraint in constraints {
            self.resolve_one(constraint, &mut out)?;
        }
        Ok(out.into_values().collect())
    }
}

/// A fake source-control/registry container that answers from a fixed
/// in-memory version list, never touching the network.
pub struct FakeContainer {
    pub kind: ContainerKind,
}

#[async_trait]
impl Container for FakeContainer {
    fn kind(&self) -> ContainerKind {
        self.kind
    }

    async fn get_tag(&self, for_version: &Version) -> anyhow::Result<Option<Tag>> {
        Ok(Some(Tag {
            name: format!("v{for_version}"),
        }))
    }

    async fn get_revision(&self, for_tag_or_identifier: &str) -> anyhow::Result<Revision> {
        Ok(Revision::new(format!("rev-{for_tag_or_identifier}")))
    }

    async fn check_integrity(&self, _version: &Version, _revision: &Revision) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Hands back a [`FakeContainer`] of whatever kind the registry entry
/// declares, ignoring `updateStrategy` (there's no real upstream to honor
/// it against).
pub struct FakeContainerProvider {
    pub kinds: HashMap<PackageIdentity, ContainerKind>,
}

impl FakeContainerProvider {
    pub fn new(kinds: impl IntoIterator<Item = (PackageIdentity, ContainerKind)>) -> Self {
        FakeContainerProvider {
            kinds: kinds.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ContainerProvider for FakeContainerProvider {
    async fn get_container(
        &self,
        package: &PackageReference,
        _update_strategy: UpdateStrategy,
        _scope: &OperationScope,
    ) -> anyhow::Result<Box<dyn Container>> {
        let kind = self.kinds.get(&package.identity).copied().unwrap_or(ContainerKind::Registry);
        Ok(Box::new(FakeContainer { kind }))
    }
}

/// No custom-kind dependencies in a test fixture unless explicitly wired.
pub struct NoCustomContainers;

#[async_trait]
impl CustomContainerRetriever for NoCustomContainers {
    async fn retrieve(&self, package: &PackageReference, _version: &Version) -> anyhow::Result<PathBuf> {
        anyhow::bail!("no custom container retriever configured for `{}`", package.identity)
    }
}

/// Records removals instead of touching a filesystem.
#[derive(Default)]
pub struct FakeArtifactStore {
    pub removed: Mutex<Vec<PackageIdentity>>,
}

impl ArtifactStore for FakeArtifactStore {
    fn remove_artifact(&self, identity: &PackageIdentity) -> anyhow::Result<()> {
        self.removed.lock().unwrap().push(identity.clone());
        Ok(())
    }
}

/// Root/dependency manifest loaders backed by a fixed in-memory fixture
/// instead of parsing real manifest files.
pub struct FixtureManifests {
    pub roots: Vec<RootManifest>,
    pub dependency_constraints: Vec<Constraint>,
    pub edited_packages_constraints: Vec<Constraint>,
    pub required_packages: Vec<PackageIdentity>,
}

#[async_trait]
impl RootManifestLoader for FixtureManifests {
    async fn load_root_manifests(&self, _paths: &[String]) -> anyhow::Result<Vec<RootManifest>> {
        Ok(self.roots.clone())
    }
}

#[async_trait]
impl DependencyManifestLoader for FixtureManifests {
    async fn load_dependency_manifests(
        &self,
        _roots: &[RootManifest],
        _auto_add: bool,
    ) -> anyhow::Result<DependencyManifests> {
        Ok(DependencyManifests {
            dependency_constraints: self.dependency_constraints.clone(),
            edited_packages_constraints: self.edited_packages_constraints.clone(),
            missing_packages: Vec::new(),
            required_packages: self.required_packages.iter().cloned().collect(),
        })
    }
}

/// A no-op artifact refresher; binary-artifact/prebuilt download is out of
/// scope and these calls just need to not fail the cycle.
pub struct NullArtifactRefresher;

#[async_trait]
impl ArtifactRefresher for NullArtifactRefresher {
    async fn update_binary_artifacts(&self, _manifests: &DependencyManifests, _added_or_updated: &[PackageReference]) -> anyhow::Result<()> {
        Ok(())
    }

    async fn update_prebuilts(&self, _manifests: &DependencyManifests, _added_or_updated: &[PackageReference]) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Captures every delegate event fired during a cycle so tests can assert
/// on ordering and counts without guessing at internal call sites.
#[derive(Default)]
pub struct RecordingDelegate {
    pub events: Mutex<Vec<String>>,
}

impl WorkspaceDelegate for RecordingDelegate {
    fn will_resolve_dependencies(&self, reason: Option<&str>) {
        self.events.lock().unwrap().push(format!("will_resolve_dependencies({reason:?})"));
    }
    fn did_resolve_dependencies(&self, _duration: Duration) {
        self.events.lock().unwrap().push("did_resolve_dependencies".into());
    }
    fn will_update_dependencies(&self) {
        self.events.lock().unwrap().push("will_update_dependencies".into());
    }
    fn did_update_dependencies(&self, _duration: Duration) {
        self.events.lock().unwrap().push("did_update_dependencies".into());
    }
    fn dependencies_up_to_date(&self) {
        self.events.lock().unwrap().push("dependencies_up_to_date".into());
    }
}

/// Builds a `PackageReference` for a registry-kind dependency, the common
/// case in fixtures.
pub fn registry_ref(name: &str) -> PackageReference {
    PackageReference::new(PackageIdentity::from_name(name), workspace_resolver::reference::ReferenceKind::Registry, name)
}

/// Builds a version-requirement constraint against a registry package.
pub fn version_constraint(name: &str, req: &str) -> Constraint {
    Constraint {
        package: registry_ref(name),
        requirement: VersionRequirement::Version(semver::VersionReq::parse(req).expect("valid semver req in test fixture")),
    }
}
