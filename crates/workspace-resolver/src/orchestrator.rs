//! Resolve Orchestrator (C9, spec §4.7-§4.9): the three entry points —
//! `update`, `resolve`, resolve-from-lock — that select a strategy and
//! drive the precomputer, reconciler and checkout executor, persisting the
//! pin store at the end of a successful cycle.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use futures::future::join_all;
use indexmap::IndexMap;

use crate::checkout::{ArtifactStore, CheckoutExecutor, CustomContainerRetriever};
use crate::config::WorkspaceConfiguration;
use crate::container::{ContainerProvider, OperationScope, UpdateStrategy};
use crate::delegate::WorkspaceDelegate;
use crate::errors::ResolutionError;
use crate::identity::PackageIdentity;
use crate::managed::{CheckoutState, ManagedDependency, ManagedDependencyState, ManagedDependencyStore};
use crate::manifest::{
    minimum_tools_version_across_roots, ArtifactRefresher, DependencyManifestLoader, DependencyManifests,
    RootManifestLoader,
};
use crate::origin_hash::compute_origin_hash;
use crate::pin::{PinState, ResolvedPackage, ResolvedPackagesStore};
use crate::precompute::{Precomputer, ResolutionPrecomputationResult};
use crate::reconcile::{self, PackageStateChange};
use crate::reference::PackageReference;
use crate::root_graph::RootGraph;
use crate::solver::{Constraint, Resolver};

/// `resolve(root, strategy)`'s strategy argument (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStrategy {
    LockFile,
    Update { force: bool },
    BestEffort,
}

/// spec §5 "active-resolver slot": the one piece of state an external
/// cancellation signal can observe. Set around every `solve` call, cleared
/// immediately after; this orchestrator is single-threaded, so a plain
/// `Mutex<bool>` is enough — no atomic needed, the mutex only exists to
/// give `&self` methods interior mutability.
#[derive(Default)]
pub struct ActiveResolverSlot(Mutex<bool>);

impl ActiveResolverSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        *self.0.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn begin(&self) {
        *self.0.lock().unwrap_or_else(|poison| poison.into_inner()) = true;
    }

    fn end(&self) {
        *self.0.lock().unwrap_or_else(|poison| poison.into_inner()) = false;
    }
}

/// Everything the orchestrator needs borrowed from its caller for one
/// cycle. All fields are trait objects because every one of them is an
/// out-of-scope collaborator (spec §1, §6) — the orchestrator only knows
/// their interface shape.
pub struct ResolveOrchestrator<'a> {
    pub root_manifests: &'a dyn RootManifestLoader,
    pub dependency_manifests: &'a dyn DependencyManifestLoader,
    pub containers: &'a dyn ContainerProvider,
    pub resolver: &'a dyn Resolver,
    pub artifacts: &'a dyn ArtifactRefresher,
    pub artifact_store: &'a dyn ArtifactStore,
    pub custom: &'a dyn CustomContainerRetriever,
    pub delegate: &'a dyn WorkspaceDelegate,
    pub managed: &'a ManagedDependencyStore,
    pub config: WorkspaceConfiguration,
    pub pin_store_path: PathBuf,
    /// Where the managed-dependency database is persisted after a
    /// successful cycle (spec §6). `None` keeps the store in-memory only,
    /// for callers (tests, dry runs) that never want a workspace-state.json
    /// written.
    pub managed_store_path: Option<PathBuf>,
    pub active_resolver: ActiveResolverSlot,
}

impl<'a> ResolveOrchestrator<'a> {
    /// spec §4.7 `update(root, packages?, dryRun)`.
    pub async fn update(
        &self,
        root_paths: &[String],
        packages: &[String],
        dry_run: bool,
    ) -> Result<Vec<(PackageReference, PackageStateChange)>, ResolutionError> {
        tracing::info!(roots = ?root_paths, packages = ?packages, dry_run, "updating dependencies");
        self.delegate.will_update_dependencies();
        let started = Instant::now();

        let roots = self.load_roots(root_paths).await?;
        let origin_hash = self.origin_hash(&roots);
        let mut pins = self.load_pins()?;

        let requested: HashSet<PackageIdentity> = packages.iter().map(|p| PackageIdentity::from(p.as_str())).collect();
        // spec §4.7 step 3: empty `packages` drops every pin as a solver
        // hint (full update); otherwise only the requested identities are
        // dropped and the rest remain as hints (partial update).
        let pin_hints: IndexMap<PackageIdentity, ResolvedPackage> = if requested.is_empty() {
            IndexMap::new()
        } else {
            pins.iter()
                .cloned()
                .filter(|p| !requested.contains(&p.package_ref.identity))
                .map(|p| (p.package_ref.identity.clone(), p))
                .collect()
        };

        let dependency_manifests = self.dependency_manifests.load_dependency_manifests(&roots, true).await.map_err(|e| {
            ResolutionError::InvalidInput(format!("loading dependency manifests: {e}"))
        })?;
        let constraints = Self::constraints(&dependency_manifests);

        let bindings = self.solve(&constraints).await?;
        let root_graph = RootGraph::from_manifests(&roots);
        let managed_snapshot = self.managed.snapshot();
        let changes = reconcile::reconcile(&bindings, &managed_snapshot, &root_graph, true, &pin_hints)?;

        if dry_run {
            return Ok(changes);
        }

        self.apply_and_persist(&roots, &changes, &mut pins, origin_hash).await?;
        self.delegate.did_update_dependencies(started.elapsed());
        tracing::debug!(elapsed = ?started.elapsed(), changes = changes.len(), "update cycle complete");
        Ok(changes)
    }

    /// spec §4.7 `resolve(root, strategy)`.
    pub async fn resolve(
        &self,
        root_paths: &[String],
        strategy: ResolveStrategy,
    ) -> Result<DependencyManifests, ResolutionError> {
        self.delegate.will_resolve_dependencies(None);
        let started = Instant::now();

        tracing::info!(?strategy, "resolving dependencies");
        let result = match strategy {
            ResolveStrategy::LockFile => {
                let (manifests, precomputation) = self.resolve_from_lock(root_paths).await?;
                match precomputation {
                    ResolutionPrecomputationResult::NotRequired => Ok(manifests),
                    ResolutionPrecomputationResult::Required(reason) => {
                        tracing::warn!(?reason, "lock file is out of date for the requested strategy");
                        Err(ResolutionError::LockFileOutOfDate(format!("{reason:?}")))
                    }
                }
            }
            ResolveStrategy::Update { force } => {
                if force {
                    self.full_resolve(root_paths, true).await
                } else {
                    self.resolve_best_effort_or_full(root_paths, false).await
                }
            }
            ResolveStrategy::BestEffort => self.resolve_best_effort_or_full(root_paths, true).await,
        };

        self.delegate.did_resolve_dependencies(started.elapsed());
        result
    }

    async fn resolve_best_effort_or_full(
        &self,
        root_paths: &[String],
        freeze_branches: bool,
    ) -> Result<DependencyManifests, ResolutionError> {
        if self.managed.snapshot().values().any(|dep| dep.state.is_edited()) {
            return self.full_resolve(root_paths, !freeze_branches).await;
        }

        let roots = self.load_roots(root_paths).await?;
        let origin_hash = self.origin_hash(&roots);
        let pins = self.load_pins()?;
        let stale = pins.origin_hash().map(|h| h != origin_hash).unwrap_or(true);
        if stale {
            return self.full_resolve(root_paths, !freeze_branches).await;
        }

        let (manifests, precomputation) = self.resolve_from_lock(root_paths).await?;
        match precomputation {
            ResolutionPrecomputationResult::NotRequired => {
                self.delegate.dependencies_up_to_date();
                Ok(manifests)
            }
            ResolutionPrecomputationResult::Required(_) => self.full_resolve(root_paths, !freeze_branches).await,
        }
    }

    /// The common path behind `update()` and the `Update{force}` /
    /// fallback branches of `resolve()`: solve, reconcile against every
    /// current pin as a hint, apply, reload, verify completeness, persist.
    async fn full_resolve(
        &self,
        root_paths: &[String],
        update_branches: bool,
    ) -> Result<DependencyManifests, ResolutionError> {
        let roots = self.load_roots(root_paths).await?;
        let origin_hash = self.origin_hash(&roots);
        let mut pins = self.load_pins()?;
        let pin_hints: IndexMap<PackageIdentity, ResolvedPackage> =
            pins.iter().cloned().map(|p| (p.package_ref.identity.clone(), p)).collect();

        let dependency_manifests = self.dependency_manifests.load_dependency_manifests(&roots, true).await.map_err(|e| {
            ResolutionError::InvalidInput(format!("loading dependency manifests: {e}"))
        })?;
        let constraints = Self::constraints(&dependency_manifests);

        let bindings = self.solve(&constraints).await?;
        let root_graph = RootGraph::from_manifests(&roots);
        let managed_snapshot = self.managed.snapshot();
        let changes = reconcile::reconcile(&bindings, &managed_snapshot, &root_graph, update_branches, &pin_hints)?;

        self.apply_and_persist(&roots, &changes, &mut pins, origin_hash).await
    }

    /// Applies reconciler output, reloads manifests against the freshly
    /// materialized state, checks the missing-packages invariant (spec
    /// §4.9) against that reloaded view, then saves the pin store (spec
    /// §4.7 step 7). Runs after either `update()` or a full `resolve()`
    /// path, never after resolve-from-lock (which has its own lighter
    /// checkout step and never rewrites the pin file).
    async fn apply_and_persist(
        &self,
        roots: &[crate::manifest::RootManifest],
        changes: &[(PackageReference, PackageStateChange)],
        pins: &mut ResolvedPackagesStore,
        origin_hash: String,
    ) -> Result<DependencyManifests, ResolutionError> {
        let executor = CheckoutExecutor::new(self.managed, self.containers, self.artifact_store, self.custom, self.delegate);
        let touched = executor.apply(changes).await;
        tracing::debug!(touched = touched.len(), "checkout executor applied reconciled changes");

        let reloaded = self
            .dependency_manifests
            .load_dependency_manifests(roots, true)
            .await
            .map_err(|e| ResolutionError::InvalidInput(format!("reloading dependency manifests: {e}")))?;
        self.artifacts.update_binary_artifacts(&reloaded, &touched).await.ok();
        self.artifacts.update_prebuilts(&reloaded, &touched).await.ok();

        let managed_identities: HashSet<PackageIdentity> = self.managed.snapshot().keys().cloned().collect();
        let missing: Vec<PackageIdentity> = reloaded
            .required_packages
            .iter()
            .filter(|id| !managed_identities.contains(*id))
            .cloned()
            .collect();
        if !missing.is_empty() {
            tracing::error!(?missing, "required packages still missing after checkout");
            return Err(ResolutionError::ExhaustedAttempts { missing });
        }

        for (package_ref, change) in changes {
            match change {
                PackageStateChange::Added(_) | PackageStateChange::Updated(_) => {
                    if let Some(dep) = self.managed.get(&package_ref.identity) {
                        pins.add(&dep);
                    }
                }
                PackageStateChange::Removed => pins.remove(&package_ref.identity),
                PackageStateChange::Unchanged => {}
            }
        }
        pins.save(origin_hash, minimum_tools_version_across_roots(roots))?;
        if let Some(path) = &self.managed_store_path {
            self.managed.save(path)?;
        }
        Ok(reloaded)
    }

    /// spec §4.8 resolve-from-lock.
    async fn resolve_from_lock(
        &self,
        root_paths: &[String],
    ) -> Result<(DependencyManifests, ResolutionPrecomputationResult), ResolutionError> {
        let roots = self.load_roots(root_paths).await?;
        let pins = self.load_pins()?;

        // Step 2: pre-warm containers for every pinned package. Best-effort
        // — a failed prewarm doesn't fail the cycle, it just means step 4's
        // checkout (if selected) pays the network cost itself. Gated on
        // `WorkspaceConfiguration::prefetch_based_on_resolved_file`: callers
        // that only want a lock-accurate manifest reload (e.g. a plain
        // read-only `resolve(LockFile)` with no intent to materialize
        // anything) can skip the network fan-out entirely.
        if self.config.prefetch_based_on_resolved_file {
            let scope = OperationScope::default();
            let prewarm_tasks = pins.iter().map(|pin| {
                let strategy = self.prewarm_strategy(pin);
                async move { self.containers.get_container(&pin.package_ref, strategy, &scope).await }
            });
            join_all(prewarm_tasks).await;
        }

        // Step 3: select pins that need an actual clone/download.
        let managed_snapshot = self.managed.snapshot();
        let selected: Vec<&ResolvedPackage> = pins
            .iter()
            .filter(|pin| self.pin_needs_reprocessing(pin, &managed_snapshot))
            .collect();

        // Step 4: apply those in parallel.
        let scope = OperationScope::default();
        let checkout_tasks = selected.iter().map(|pin| self.apply_pin(pin, &scope));
        for outcome in join_all(checkout_tasks).await {
            outcome?;
        }

        // Step 5: reload manifests, refresh artifacts with an empty
        // added-or-updated list (spec §9 open question, decided in
        // DESIGN.md to follow the spec text literally even though clones
        // may have just happened), then precompute.
        let dependency_manifests = self
            .dependency_manifests
            .load_dependency_manifests(&roots, false)
            .await
            .map_err(|e| ResolutionError::InvalidInput(format!("loading dependency manifests: {e}")))?;
        self.artifacts.update_binary_artifacts(&dependency_manifests, &[]).await.ok();
        self.artifacts.update_prebuilts(&dependency_manifests, &[]).await.ok();

        let constraints = Self::constraints(&dependency_manifests);
        self.active_resolver.begin();
        let precomputation = Precomputer::run(self.resolver, &constraints, false).await;
        self.active_resolver.end();

        Ok((dependency_manifests, precomputation))
    }

    fn prewarm_strategy(&self, pin: &ResolvedPackage) -> UpdateStrategy {
        if self.config.skip_dependencies_updates {
            return UpdateStrategy::Never;
        }
        match &pin.state {
            PinState::Branch(_, revision) | PinState::Revision(revision) => {
                UpdateStrategy::IfNeeded(revision.clone())
            }
            PinState::Version(_, Some(revision)) => UpdateStrategy::IfNeeded(revision.clone()),
            PinState::Version(_, None) => UpdateStrategy::Always,
        }
    }

    fn pin_needs_reprocessing(
        &self,
        pin: &ResolvedPackage,
        managed: &IndexMap<PackageIdentity, ManagedDependency>,
    ) -> bool {
        match managed.get(&pin.package_ref.identity) {
            None => true,
            Some(dep) => {
                if dep.package_ref.location != pin.package_ref.location {
                    return true;
                }
                match (&pin.state, &dep.state) {
                    (_, ManagedDependencyState::Edited { .. })
                    | (_, ManagedDependencyState::FileSystem(_))
                    | (_, ManagedDependencyState::Custom(_, _)) => true,
                    (PinState::Version(v, _), ManagedDependencyState::RegistryDownload(existing)) => v != existing,
                    (PinState::Version(v, r), ManagedDependencyState::SourceControlCheckout(CheckoutState::Version(ev, er))) => {
                        v != ev || r.as_ref().is_some_and(|r| r != er)
                    }
                    (PinState::Revision(r), ManagedDependencyState::SourceControlCheckout(CheckoutState::Revision(er))) => {
                        r != er
                    }
                    (PinState::Branch(name, r), ManagedDependencyState::SourceControlCheckout(CheckoutState::Branch(en, er))) => {
                        name != en || r != er
                    }
                    _ => true,
                }
            }
        }
    }

    async fn apply_pin(&self, pin: &ResolvedPackage, scope: &OperationScope) -> Result<(), ResolutionError> {
        let new_state = match &pin.state {
            PinState::Version(version, known_revision) => {
                let strategy = match known_revision {
                    Some(revision) => UpdateStrategy::IfNeeded(revision.clone()),
                    None => UpdateStrategy::Always,
                };
                let container = self
                    .containers
                    .get_container(&pin.package_ref, strategy, scope)
                    .await
                    .map_err(|source| ResolutionError::Integrity {
                        identity: pin.package_ref.identity.clone(),
                        reason: source.to_string(),
                    })?;
                match container.kind() {
                    crate::container::ContainerKind::SourceControl => {
                        let tag = container.get_tag(version).await.ok().flatten();
                        let identifier = tag.map(|t| t.name).unwrap_or_else(|| version.to_string());
                        let revision = container.get_revision(&identifier).await.map_err(|source| {
                            ResolutionError::Integrity {
                                identity: pin.package_ref.identity.clone(),
                                reason: source.to_string(),
                            }
                        })?;
                        ManagedDependencyState::SourceControlCheckout(CheckoutState::Version(version.clone(), revision))
                    }
                    crate::container::ContainerKind::Registry => ManagedDependencyState::RegistryDownload(version.clone()),
                    crate::container::ContainerKind::Custom => {
                        let path = self.custom.retrieve(&pin.package_ref, version).await.map_err(|source| {
                            ResolutionError::Integrity {
                                identity: pin.package_ref.identity.clone(),
                                reason: source.to_string(),
                            }
                        })?;
                        ManagedDependencyState::Custom(version.clone(), path)
                    }
                }
            }
            PinState::Revision(revision) => ManagedDependencyState::SourceControlCheckout(CheckoutState::Revision(revision.clone())),
            PinState::Branch(name, revision) => {
                ManagedDependencyState::SourceControlCheckout(CheckoutState::Branch(name.clone(), revision.clone()))
            }
        };
        self.managed.upsert(ManagedDependency::new(pin.package_ref.clone(), new_state));
        Ok(())
    }

    async fn solve(&self, constraints: &[Constraint]) -> Result<Vec<crate::solver::DependencyResolverBinding>, ResolutionError> {
        self.active_resolver.begin();
        let result = self.resolver.solve(constraints).await;
        self.active_resolver.end();
        Ok(result?)
    }

    async fn load_roots(&self, root_paths: &[String]) -> Result<Vec<crate::manifest::RootManifest>, ResolutionError> {
        self.root_manifests
            .load_root_manifests(root_paths)
            .await
            .map_err(|e| ResolutionError::InvalidInput(format!("loading root manifests: {e}")))
    }

    fn load_pins(&self) -> Result<ResolvedPackagesStore, ResolutionError> {
        Ok(ResolvedPackagesStore::load(&self.pin_store_path)?)
    }

    fn origin_hash(&self, roots: &[crate::manifest::RootManifest]) -> String {
        let bytes: Vec<&[u8]> = roots.iter().map(|r| r.raw_bytes.as_slice()).collect();
        let locations: Vec<&str> = roots
            .iter()
            .flat_map(|r| r.declared_dependencies.iter())
            .map(|d| d.location.as_str())
            .collect();
        compute_origin_hash(bytes, locations)
    }

    fn constraints(manifests: &DependencyManifests) -> Vec<Constraint> {
        manifests
            .dependency_constraints
            .iter()
            .chain(manifests.edited_packages_constraints.iter())
            .cloned()
            .collect()
    }
}
