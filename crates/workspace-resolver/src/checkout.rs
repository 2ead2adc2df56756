//! Checkout Executor (C7, spec §4.6): applies reconciler output in two
//! strict phases — removals, then installs/updates — with parallel fan-out
//! within each phase.

use std::path::PathBuf;
use std::time::Instant;

use futures::future::join_all;

use crate::container::{ContainerKind, ContainerProvider, OperationScope, UpdateStrategy};
use crate::delegate::{OnceGate, WorkspaceDelegate};
use crate::identity::PackageIdentity;
use crate::managed::{CheckoutState, ManagedDependency, ManagedDependencyState, ManagedDependencyStore};
use crate::reconcile::{PackageStateChange, Requirement};
use crate::reference::PackageReference;
use crate::version::Version;

/// Deletes the on-disk artifact for a removed package. Kept as a trait so
/// tests can use an in-memory fake instead of touching the filesystem.
pub trait ArtifactStore: Send + Sync {
    fn remove_artifact(&self, identity: &PackageIdentity) -> anyhow::Result<()>;
}

/// Retrieves a custom-kind dependency's content at a given version,
/// returning the path it was materialized to (spec §4.6 "custom:... record
/// `custom(V, path)`").
#[async_trait::async_trait]
pub trait CustomContainerRetriever: Send + Sync {
    async fn retrieve(&self, package: &PackageReference, version: &Version) -> anyhow::Result<PathBuf>;
}

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("failed to remove artifact for `{identity}`: {source}")]
    RemovalFailed {
        identity: PackageIdentity,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to install `{identity}`: {source}")]
    InstallFailed {
        identity: PackageIdentity,
        #[source]
        source: anyhow::Error,
    },
}

/// One task's outcome, collected so the driver can decide pass/fail without
/// letting a single bad package cancel its siblings (spec §5 "failures are
/// logged per-task but do not cancel siblings").
pub struct TaskOutcome<T> {
    pub identity: PackageIdentity,
    pub result: Result<T, CheckoutError>,
}

pub struct CheckoutExecutor<'a> {
    store: &'a ManagedDependencyStore,
    provider: &'a dyn ContainerProvider,
    artifacts: &'a dyn ArtifactStore,
    custom: &'a dyn CustomContainerRetriever,
    delegate: &'a dyn WorkspaceDelegate,
    once_gate: OnceGate,
}

impl<'a> CheckoutExecutor<'a> {
    pub fn new(
        store: &'a ManagedDependencyStore,
        provider: &'a dyn ContainerProvider,
        artifacts: &'a dyn ArtifactStore,
        custom: &'a dyn CustomContainerRetriever,
        delegate: &'a dyn WorkspaceDelegate,
    ) -> Self {
        CheckoutExecutor {
            store,
            provider,
            artifacts,
            custom,
            delegate,
            once_gate: OnceGate::new(),
        }
    }

    /// Applies `changes` in two strict phases and returns the packages that
    /// were added or updated (used by the orchestrator to feed
    /// `updateBinaryArtifacts`/`updatePrebuilts`). Per spec §5/§7, a
    /// per-task failure in either phase is trapped and logged rather than
    /// aborting the cycle — one bad package must not cancel its siblings.
    /// The missing-packages invariant (spec §4.9), checked by the caller
    /// against the reloaded manifests, is what ultimately decides whether
    /// the cycle as a whole fails.
    pub async fn apply(&self, changes: &[(PackageReference, PackageStateChange)]) -> Vec<PackageReference> {
        // Phase A: removals, sequential per package (the removal itself is
        // one filesystem op + one store mutation), parallel across
        // packages.
        let removals: Vec<_> = changes
            .iter()
            .filter(|(_, change)| matches!(change, PackageStateChange::Removed))
            .collect();

        let removal_tasks = removals.iter().map(|(package_ref, _)| async move {
            let identity = package_ref.identity.clone();
            let result = self
                .artifacts
                .remove_artifact(&identity)
                .map_err(|source| CheckoutError::RemovalFailed {
                    identity: identity.clone(),
                    source,
                });
            if result.is_ok() {
                self.store.remove(&identity);
            }
            TaskOutcome { identity, result }
        });
        for outcome in join_all(removal_tasks).await {
            match &outcome.result {
                Ok(()) => tracing::debug!(identity = %outcome.identity, "removal task finished"),
                Err(err) => tracing::error!(
                    identity = %outcome.identity,
                    error = %err,
                    "removal task failed; trapped per-task, missing-packages invariant decides the cycle"
                ),
            }
        }

        // Phase B: installs/updates, parallel across packages. Must not
        // start until every Phase A task above has completed.
        let installs: Vec<_> = changes
            .iter()
            .filter_map(|(package_ref, change)| match change {
                PackageStateChange::Added(state) | PackageStateChange::Updated(state) => {
                    Some((package_ref, &state.requirement))
                }
                _ => None,
            })
            .collect();

        let install_tasks = installs.iter().map(|(package_ref, requirement)| async move {
            let result = self.install_one(package_ref, requirement).await;
            ((*package_ref).clone(), result)
        });

        let mut touched = Vec::with_capacity(installs.len());
        for (package_ref, result) in join_all(install_tasks).await {
            match result {
                Ok(()) => {
                    tracing::debug!(identity = %package_ref.identity, "install task finished");
                    touched.push(package_ref);
                }
                Err(err) => tracing::error!(
                    identity = %package_ref.identity,
                    error = %err,
                    "install task failed; trapped per-task, missing-packages invariant decides the cycle"
                ),
            }
        }

        touched
    }

    async fn install_one(
        &self,
        package_ref: &PackageReference,
        requirement: &Requirement,
    ) -> Result<(), CheckoutError> {
        let identity = package_ref.identity.clone();
        let scope = OperationScope::default();

        let new_state = match requirement {
            Requirement::Version(v) => self
                .install_version(package_ref, v, &scope)
                .await
                .map_err(|source| CheckoutError::InstallFailed {
                    identity: identity.clone(),
                    source,
                })?,
            Requirement::Revision(r, None) => {
                ManagedDependencyState::SourceControlCheckout(CheckoutState::Revision(r.clone()))
            }
            Requirement::Revision(r, Some(branch)) => {
                ManagedDependencyState::SourceControlCheckout(CheckoutState::Branch(branch.clone(), r.clone()))
            }
            Requirement::Unversioned => ManagedDependencyState::FileSystem(PathBuf::from(&package_ref.location)),
        };

        self.store
            .upsert(ManagedDependency::new(package_ref.clone(), new_state));
        Ok(())
    }

    /// spec §9 "concurrent map for one-shot delegate fan-out": fires
    /// `willComputeVersion`/`didComputeVersion` at most once per identity
    /// via `self.once_gate`, even if this executor were ever asked to
    /// install the same identity more than once in a cycle.
    async fn install_version(
        &self,
        package_ref: &PackageReference,
        version: &Version,
        scope: &OperationScope,
    ) -> anyhow::Result<ManagedDependencyState> {
        let identity = &package_ref.identity;
        let should_report = self.once_gate.fire_once(identity);
        if should_report {
            self.delegate.will_compute_version(identity, &package_ref.location);
        }
        let started = Instant::now();

        let container = self
            .provider
            .get_container(package_ref, UpdateStrategy::Always, scope)
            .await?;

        let state = match container.kind() {
            ContainerKind::SourceControl => {
                let tag = container.get_tag(version).await?;
                let identifier = tag.map(|t| t.name).unwrap_or_else(|| version.to_string());
                let revision = container.get_revision(&identifier).await?;
                container.check_integrity(version, &revision).await?;
                ManagedDependencyState::SourceControlCheckout(CheckoutState::Version(version.clone(), revision))
            }
            ContainerKind::Registry => ManagedDependencyState::RegistryDownload(version.clone()),
            ContainerKind::Custom => {
                let path = self.custom.retrieve(package_ref, version).await?;
                ManagedDependencyState::Custom(version.clone(), path)
            }
        };

        if should_report {
            self.delegate
                .did_compute_version(identity, &package_ref.location, version, started.elapsed());
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{Container, Tag};
    use crate::delegate::NullDelegate;
    use crate::identity::PackageIdentity;
    use crate::reconcile::State;
    use crate::reference::ReferenceKind;
    use crate::solver::ProductFilter;
    use crate::version::Revision;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeArtifacts {
        removed: Mutex<Vec<PackageIdentity>>,
        fails_for: Vec<PackageIdentity>,
    }
    impl ArtifactStore for FakeArtifacts {
        fn remove_artifact(&self, identity: &PackageIdentity) -> anyhow::Result<()> {
            if self.fails_for.contains(identity) {
                anyhow::bail!("simulated transport failure removing `{identity}`");
            }
            self.removed.lock().unwrap().push(identity.clone());
            Ok(())
        }
    }

    struct FakeContainer {
        kind: ContainerKind,
        fails: bool,
    }
    #[async_trait]
    impl Container for FakeContainer {
        fn kind(&self) -> ContainerKind {
            self.kind
        }
        async fn get_tag(&self, for_version: &Version) -> anyhow::Result<Option<Tag>> {
            if self.fails {
                anyhow::bail!("simulated transport failure fetching tag for `{for_version}`");
            }
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

    struct FakeProvider {
        kind: ContainerKind,
        fails_for: Vec<PackageIdentity>,
    }
    #[async_trait]
    impl ContainerProvider for FakeProvider {
        async fn get_container(
            &self,
            package: &PackageReference,
            _update_strategy: UpdateStrategy,
            _scope: &OperationScope,
        ) -> anyhow::Result<Box<dyn Container>> {
            Ok(Box::new(FakeContainer {
                kind: self.kind,
                fails: self.fails_for.contains(&package.identity),
            }))
        }
    }

    struct NoCustom;
    #[async_trait]
    impl CustomContainerRetriever for NoCustom {
        async fn retrieve(&self, _package: &PackageReference, _version: &Version) -> anyhow::Result<PathBuf> {
            unreachable!("no custom dependencies in this test")
        }
    }

    #[derive(Default)]
    struct RecordingDelegate {
        will: Mutex<Vec<PackageIdentity>>,
        did: Mutex<Vec<PackageIdentity>>,
    }
    impl WorkspaceDelegate for RecordingDelegate {
        fn will_compute_version(&self, package: &PackageIdentity, _location: &str) {
            self.will.lock().unwrap().push(package.clone());
        }
        fn did_compute_version(&self, package: &PackageIdentity, _location: &str, _version: &Version, _duration: Duration) {
            self.did.lock().unwrap().push(package.clone());
        }
    }

    fn pkg_ref(name: &str) -> PackageReference {
        PackageReference::new(PackageIdentity::from_name(name), ReferenceKind::RemoteSourceControl, name)
    }

    #[test]
    fn removals_happen_before_installs_and_both_succeed() {
        let store = ManagedDependencyStore::new();
        store.upsert(ManagedDependency::new(
            pkg_ref("stale"),
            ManagedDependencyState::RegistryDownload(Version::new(1, 0, 0)),
        ));
        let artifacts = FakeArtifacts {
            removed: Mutex::new(Vec::new()),
            fails_for: vec![],
        };
        let provider = FakeProvider {
            kind: ContainerKind::SourceControl,
            fails_for: vec![],
        };
        let custom = NoCustom;
        let delegate = NullDelegate;
        let executor = CheckoutExecutor::new(&store, &provider, &artifacts, &custom, &delegate);

        let changes = vec![
            (pkg_ref("stale"), PackageStateChange::Removed),
            (
                pkg_ref("fresh"),
                PackageStateChange::Added(State {
                    requirement: Requirement::Version(Version::new(2, 0, 0)),
                    products: ProductFilter::default(),
                }),
            ),
        ];

        let touched = futures::executor::block_on(executor.apply(&changes));
        assert_eq!(touched, vec![pkg_ref("fresh")]);
        assert!(store.get(&PackageIdentity::from_name("stale")).is_none());
        assert!(store.get(&PackageIdentity::from_name("fresh")).is_some());
        assert_eq!(artifacts.removed.lock().unwrap().len(), 1);
    }

    #[test]
    fn unversioned_install_creates_filesystem_state_without_container_io() {
        let store = ManagedDependencyStore::new();
        let artifacts = FakeArtifacts {
            removed: Mutex::new(Vec::new()),
            fails_for: vec![],
        };
        let provider = FakeProvider {
            kind: ContainerKind::SourceControl,
            fails_for: vec![],
        };
        let custom = NoCustom;
        let delegate = NullDelegate;
        let executor = CheckoutExecutor::new(&store, &provider, &artifacts, &custom, &delegate);

        let changes = vec![(
            pkg_ref("local"),
            PackageStateChange::Added(State {
                requirement: Requirement::Unversioned,
                products: ProductFilter::default(),
            }),
        )];
        futures::executor::block_on(executor.apply(&changes));
        let dep = store.get(&PackageIdentity::from_name("local")).unwrap();
        assert!(matches!(dep.state, ManagedDependencyState::FileSystem(_)));
    }

    /// spec §5/§7: a per-task transport failure in either phase must not
    /// abort the cycle or the sibling tasks — `apply` returns whatever
    /// succeeded, and the caller's missing-packages invariant is what
    /// decides pass/fail.
    #[test]
    fn one_bad_package_does_not_cancel_its_siblings() {
        let store = ManagedDependencyStore::new();
        store.upsert(ManagedDependency::new(
            pkg_ref("stale-ok"),
            ManagedDependencyState::RegistryDownload(Version::new(1, 0, 0)),
        ));
        store.upsert(ManagedDependency::new(
            pkg_ref("stale-fails"),
            ManagedDependencyState::RegistryDownload(Version::new(1, 0, 0)),
        ));
        let artifacts = FakeArtifacts {
            removed: Mutex::new(Vec::new()),
            fails_for: vec![PackageIdentity::from_name("stale-fails")],
        };
        let provider = FakeProvider {
            kind: ContainerKind::SourceControl,
            fails_for: vec![PackageIdentity::from_name("broken")],
        };
        let custom = NoCustom;
        let delegate = NullDelegate;
        let executor = CheckoutExecutor::new(&store, &provider, &artifacts, &custom, &delegate);

        let changes = vec![
            (pkg_ref("stale-ok"), PackageStateChange::Removed),
            (pkg_ref("stale-fails"), PackageStateChange::Removed),
            (
                pkg_ref("broken"),
                PackageStateChange::Added(State {
                    requirement: Requirement::Version(Version::new(1, 0, 0)),
                    products: ProductFilter::default(),
                }),
            ),
            (
                pkg_ref("fine"),
                PackageStateChange::Added(State {
                    requirement: Requirement::Version(Version::new(2, 0, 0)),
                    products: ProductFilter::default(),
                }),
            ),
        ];

        let touched = futures::executor::block_on(executor.apply(&changes));
        assert_eq!(touched, vec![pkg_ref("fine")]);
        // the failed removal leaves its managed-store entry in place so a
        // later cycle can retry it.
        assert!(store.get(&PackageIdentity::from_name("stale-fails")).is_some());
        assert!(store.get(&PackageIdentity::from_name("stale-ok")).is_none());
        assert!(store.get(&PackageIdentity::from_name("fine")).is_some());
        assert!(store.get(&PackageIdentity::from_name("broken")).is_none());
    }

    #[test]
    fn install_version_fires_will_and_did_compute_version_once_per_identity() {
        let store = ManagedDependencyStore::new();
        let artifacts = FakeArtifacts {
            removed: Mutex::new(Vec::new()),
            fails_for: vec![],
        };
        let provider = FakeProvider {
            kind: ContainerKind::SourceControl,
            fails_for: vec![],
        };
        let custom = NoCustom;
        let delegate = RecordingDelegate::default();
        let executor = CheckoutExecutor::new(&store, &provider, &artifacts, &custom, &delegate);

        let changes = vec![(
            pkg_ref("fresh"),
            PackageStateChange::Added(State {
                requirement: Requirement::Version(Version::new(2, 0, 0)),
                products: ProductFilter::default(),
            }),
        )];
        futures::executor::block_on(executor.apply(&changes));

        assert_eq!(delegate.will.lock().unwrap().as_slice(), &[PackageIdentity::from_name("fresh")]);
        assert_eq!(delegate.did.lock().unwrap().as_slice(), &[PackageIdentity::from_name("fresh")]);
    }
}
