use std::path::PathBuf;
use std::sync::Once;

use resolver_test_support::{
    FakeContainerProvider, FakeResolver, FixtureManifests, NoCustomContainers, NullArtifactRefresher,
    PackageEntry, RecordingDelegate,
};
use workspace_resolver::config::WorkspaceConfiguration;
use workspace_resolver::container::ContainerKind;
use workspace_resolver::identity::PackageIdentity;
use workspace_resolver::managed::ManagedDependencyStore;
use workspace_resolver::manifest::RootManifest;
use workspace_resolver::orchestrator::{ActiveResolverSlot, ResolveOrchestrator};
use workspace_resolver::reference::{PackageReference, ReferenceKind};
use workspace_resolver::solver::Constraint;

static TRACING_INIT: Once = Once::new();

/// Installs an `EnvFilter`-driven subscriber the first time a test in this
/// binary calls it, so `RUST_LOG=debug cargo test` surfaces the core's
/// tracing events instead of them going nowhere.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn tmp_pin_path() -> PathBuf {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Package.resolved");
    std::mem::forget(dir);
    path
}

pub fn source_control_ref(name: &str, url: &str) -> PackageReference {
    PackageReference::new(PackageIdentity::from_name(name), ReferenceKind::RemoteSourceControl, url)
}

pub fn app_root(manifest_bytes: &[u8], declared: Vec<PackageReference>) -> RootManifest {
    RootManifest {
        identity: PackageIdentity::from_name("app"),
        path: "app".into(),
        raw_bytes: manifest_bytes.to_vec(),
        declared_dependencies: declared,
        minimum_tools_version: None,
    }
}

/// Everything a test needs to construct a `ResolveOrchestrator` without
/// fighting the borrow checker over temporaries: every fake lives here,
/// owned, and the orchestrator borrows from `&self`.
pub struct Harness {
    pub fixture: FixtureManifests,
    pub resolver: FakeResolver,
    pub containers: FakeContainerProvider,
    pub artifact_store: resolver_test_support::FakeArtifactStore,
    pub custom: NoCustomContainers,
    pub artifacts: NullArtifactRefresher,
    pub delegate: RecordingDelegate,
    pub managed: ManagedDependencyStore,
    pub config: WorkspaceConfiguration,
    pub pin_store_path: PathBuf,
}

impl Harness {
    pub fn new(
        roots: Vec<RootManifest>,
        dependency_constraints: Vec<Constraint>,
        required_packages: Vec<PackageIdentity>,
        registry: Vec<PackageEntry>,
        kinds: Vec<(PackageIdentity, ContainerKind)>,
    ) -> Self {
        init_tracing();
        Harness {
            fixture: FixtureManifests {
                roots,
                dependency_constraints,
                edited_packages_constraints: vec![],
                required_packages,
            },
            resolver: FakeResolver::new(registry),
            containers: FakeContainerProvider::new(kinds),
            artifact_store: resolver_test_support::FakeArtifactStore::default(),
            custom: NoCustomContainers,
            artifacts: NullArtifactRefresher,
            delegate: RecordingDelegate::default(),
            managed: ManagedDependencyStore::new(),
            config: WorkspaceConfiguration::default(),
            pin_store_path: tmp_pin_path(),
        }
    }

    pub fn orchestrator(&self) -> ResolveOrchestrator<'_> {
        ResolveOrchestrator {
            root_manifests: &self.fixture,
            dependency_manifests: &self.fixture,
            containers: &self.containers,
            resolver: &self.resolver,
            artifacts: &self.artifacts,
            artifact_store: &self.artifact_store,
            custom: &self.custom,
            delegate: &self.delegate,
            managed: &self.managed,
            config: self.config.clone(),
            pin_store_path: self.pin_store_path.clone(),
            managed_store_path: None,
            active_resolver: ActiveResolverSlot::new(),
        }
    }
}
