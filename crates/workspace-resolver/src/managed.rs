//! Managed Dependency Store (C1): durable map of package identity → on-disk
//! state.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use indexmap::IndexMap;
use resolver_schemas::{
    CheckoutStateSchema, ManagedDependencySchema, ManagedStateSchema, ReferenceKindSchema,
    WorkspaceStateSchema,
};

use crate::identity::PackageIdentity;
use crate::reference::{PackageReference, ReferenceKind};
use crate::version::{Revision, Version};

/// spec §3 `CheckoutState`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutState {
    Version(Version, Revision),
    Revision(Revision),
    Branch(String, Revision),
}

/// spec §3 `ManagedDependencyState`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedDependencyState {
    SourceControlCheckout(CheckoutState),
    RegistryDownload(Version),
    FileSystem(PathBuf),
    Edited {
        based_on: Option<Box<ManagedDependency>>,
        unmanaged_path: Option<PathBuf>,
    },
    Custom(Version, PathBuf),
}

impl ManagedDependencyState {
    pub fn is_edited(&self) -> bool {
        matches!(self, ManagedDependencyState::Edited { .. })
    }
}

/// spec §3 `ManagedDependency`. Invariant: `identity` (via `package_ref`) is
/// the primary key; a store must never hold two entries with the same
/// identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedDependency {
    pub package_ref: PackageReference,
    pub state: ManagedDependencyState,
    pub subpath: Option<PathBuf>,
}

impl ManagedDependency {
    pub fn new(package_ref: PackageReference, state: ManagedDependencyState) -> Self {
        ManagedDependency {
            package_ref,
            state,
            subpath: None,
        }
    }

    pub fn identity(&self) -> &PackageIdentity {
        &self.package_ref.identity
    }
}

/// A single-writer, snapshot-on-read store of managed dependencies.
///
/// spec §5: "the managed store is guarded by a single-writer mutex; reads
/// produce immutable snapshots... Reads during reconciliation take a
/// snapshot." A plain `Mutex` gives us that discipline without an
/// actor/task abstraction: every mutation takes the lock, every read
/// clones out a map snapshot and releases it immediately. The map is an
/// `IndexMap` rather than a `HashMap` so `iter()`/`snapshot()` preserve
/// insertion order — spec §6 describes the on-disk database as "one
/// subdirectory per checked-out package", and a deterministic iteration
/// order keeps the serialized form (and any diagnostics that walk it)
/// stable across runs instead of shuffling with `HashMap`'s random seed.
#[derive(Debug, Default)]
pub struct ManagedDependencyStore {
    inner: Mutex<IndexMap<PackageIdentity, ManagedDependency>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ManagedStoreError {
    #[error("failed to read the managed-dependency database at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write the managed-dependency database at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Schema(#[from] resolver_schemas::SchemaError),
}

impl ManagedDependencyStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(IndexMap::new()),
        }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = ManagedDependency>) -> Self {
        let map = entries
            .into_iter()
            .map(|dep| (dep.identity().clone(), dep))
            .collect();
        Self {
            inner: Mutex::new(map),
        }
    }

    /// Loads the managed-dependency database from its on-disk JSON
    /// representation (spec §6). A missing file yields an empty store, the
    /// same "nothing materialized yet" convention `ResolvedPackagesStore`
    /// uses for a missing `Package.resolved`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManagedStoreError> {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ManagedDependencyStore::new());
            }
            Err(e) => {
                return Err(ManagedStoreError::Read {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };
        let doc = resolver_schemas::parse_workspace_state(&contents)?;
        let entries: Vec<_> = doc.dependencies.into_iter().map(decode_managed_dependency).collect();
        tracing::debug!(path = %path.display(), count = entries.len(), "loaded managed-dependency database");
        Ok(ManagedDependencyStore::from_entries(entries))
    }

    /// Writes the managed-dependency database to `path` atomically,
    /// preserving the store's insertion order in the serialized list.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ManagedStoreError> {
        let path = path.as_ref();
        let dependencies: Vec<_> = self
            .lock()
            .values()
            .map(encode_managed_dependency)
            .collect();
        let count = dependencies.len();
        let doc = WorkspaceStateSchema::new(dependencies);
        let text = resolver_schemas::serialize_workspace_state(&doc)?;
        resolver_util::atomic::write_atomic(path, text.as_bytes()).map_err(|source| {
            ManagedStoreError::Write {
                path: path.to_path_buf(),
                source,
            }
        })?;
        tracing::info!(path = %path.display(), count, "saved managed-dependency database");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<PackageIdentity, ManagedDependency>> {
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Returns an immutable point-in-time copy of the store, safe to read
    /// without holding the lock across other calls.
    pub fn snapshot(&self) -> IndexMap<PackageIdentity, ManagedDependency> {
        self.lock().clone()
    }

    pub fn get(&self, identity: &PackageIdentity) -> Option<ManagedDependency> {
        self.lock().get(identity).cloned()
    }

    /// Inserts or replaces the managed dependency for `dep`'s identity.
    pub fn upsert(&self, dep: ManagedDependency) {
        self.lock().insert(dep.identity().clone(), dep);
    }

    /// Removes the managed dependency for `identity`, if present.
    pub fn remove(&self, identity: &PackageIdentity) -> Option<ManagedDependency> {
        self.lock().remove(identity)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn encode_reference_kind(kind: ReferenceKind) -> ReferenceKindSchema {
    match kind {
        ReferenceKind::Root => ReferenceKindSchema::Root,
        ReferenceKind::FileSystem => ReferenceKindSchema::FileSystem,
        ReferenceKind::LocalSourceControl => ReferenceKindSchema::LocalSourceControl,
        ReferenceKind::RemoteSourceControl => ReferenceKindSchema::RemoteSourceControl,
        ReferenceKind::Registry => ReferenceKindSchema::Registry,
        ReferenceKind::Edited => ReferenceKindSchema::Edited,
    }
}

fn decode_reference_kind(kind: ReferenceKindSchema) -> ReferenceKind {
    match kind {
        ReferenceKindSchema::Root => ReferenceKind::Root,
        ReferenceKindSchema::FileSystem => ReferenceKind::FileSystem,
        ReferenceKindSchema::LocalSourceControl => ReferenceKind::LocalSourceControl,
        ReferenceKindSchema::RemoteSourceControl => ReferenceKind::RemoteSourceControl,
        ReferenceKindSchema::Registry => ReferenceKind::Registry,
        ReferenceKindSchema::Edited => ReferenceKind::Edited,
    }
}

/// Encodes a `ManagedDependency` to its on-disk schema shape, recursing
/// through `Edited.based_on` the same way `ManagedDependencyState` nests
/// `Option<Box<ManagedDependency>>`.
fn encode_managed_dependency(dep: &ManagedDependency) -> ManagedDependencySchema {
    let state = match &dep.state {
        ManagedDependencyState::SourceControlCheckout(checkout) => match checkout.clone() {
            CheckoutState::Version(v, r) => ManagedStateSchema::SourceControlCheckout {
                checkout: CheckoutStateSchema::Version,
                version: Some(v.to_string()),
                revision: Some(r.as_str().to_string()),
                branch: None,
            },
            CheckoutState::Revision(r) => ManagedStateSchema::SourceControlCheckout {
                checkout: CheckoutStateSchema::Revision,
                version: None,
                revision: Some(r.as_str().to_string()),
                branch: None,
            },
            CheckoutState::Branch(name, r) => ManagedStateSchema::SourceControlCheckout {
                checkout: CheckoutStateSchema::Branch,
                version: None,
                revision: Some(r.as_str().to_string()),
                branch: Some(name),
            },
        },
        ManagedDependencyState::RegistryDownload(v) => {
            ManagedStateSchema::RegistryDownload { version: v.to_string() }
        }
        ManagedDependencyState::FileSystem(path) => ManagedStateSchema::FileSystem {
            path: path.to_string_lossy().into_owned(),
        },
        ManagedDependencyState::Edited { based_on, unmanaged_path } => ManagedStateSchema::Edited {
            based_on: based_on.as_deref().map(encode_managed_dependency).map(Box::new),
            unmanaged_path: unmanaged_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
        },
        ManagedDependencyState::Custom(v, path) => ManagedStateSchema::Custom {
            version: v.to_string(),
            path: path.to_string_lossy().into_owned(),
        },
    };
    ManagedDependencySchema {
        identity: dep.identity().as_str().to_string(),
        kind: encode_reference_kind(dep.package_ref.kind),
        location: dep.package_ref.location.clone(),
        subpath: dep.subpath.as_ref().map(|p| p.to_string_lossy().into_owned()),
        state,
    }
}

fn decode_managed_dependency(schema: ManagedDependencySchema) -> ManagedDependency {
    let identity = PackageIdentity::from_name(&schema.identity);
    let kind = decode_reference_kind(schema.kind);
    let state = match schema.state {
        ManagedStateSchema::SourceControlCheckout { checkout, version, revision, branch } => {
            let revision = Revision::new(revision.unwrap_or_default());
            let checkout_state = match checkout {
                CheckoutStateSchema::Version => CheckoutState::Version(
                    version.as_deref().and_then(|v| Version::parse(v).ok()).unwrap_or(Version::new(0, 0, 0)),
                    revision,
                ),
                CheckoutStateSchema::Revision => CheckoutState::Revision(revision),
                CheckoutStateSchema::Branch => CheckoutState::Branch(branch.unwrap_or_default(), revision),
            };
            ManagedDependencyState::SourceControlCheckout(checkout_state)
        }
        ManagedStateSchema::RegistryDownload { version } => {
            ManagedDependencyState::RegistryDownload(Version::parse(&version).unwrap_or(Version::new(0, 0, 0)))
        }
        ManagedStateSchema::FileSystem { path } => ManagedDependencyState::FileSystem(PathBuf::from(path)),
        ManagedStateSchema::Edited { based_on, unmanaged_path } => ManagedDependencyState::Edited {
            based_on: based_on.map(|b| Box::new(decode_managed_dependency(*b))),
            unmanaged_path: unmanaged_path.map(PathBuf::from),
        },
        ManagedStateSchema::Custom { version, path } => ManagedDependencyState::Custom(
            Version::parse(&version).unwrap_or(Version::new(0, 0, 0)),
            PathBuf::from(path),
        ),
    };
    ManagedDependency {
        package_ref: PackageReference::new(identity, kind, schema.location),
        state,
        subpath: schema.subpath.map(PathBuf::from),
    }
}
