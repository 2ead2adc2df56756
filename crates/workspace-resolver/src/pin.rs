//! Resolved Packages Store (C2): the durable lock file (`Package.resolved`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use resolver_schemas::{PinSchema, PinStateSchema, ReferenceKindSchema, ResolvedFileSchema};

use crate::identity::PackageIdentity;
use crate::managed::{CheckoutState, ManagedDependency, ManagedDependencyState};
use crate::reference::{PackageReference, ReferenceKind};
use crate::version::{Revision, Version};

/// spec §3 `PinState`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinState {
    Version(Version, Option<Revision>),
    Revision(Revision),
    Branch(String, Revision),
}

/// spec §3 `ResolvedPackage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub package_ref: PackageReference,
    pub state: PinState,
    pub origin_hash: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PinStoreError {
    #[error("failed to read Package.resolved at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write Package.resolved at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Schema(#[from] resolver_schemas::SchemaError),
}

/// spec §3/§4.2 `ResolvedPackagesStore`. Owns the on-disk path and an
/// in-memory map of identity → pin plus the top-level `originHash`.
///
/// Invariants upheld by this type:
/// - (I1) every pin's identity is unique (enforced: it's the map key).
/// - (I2) pins may reference packages not currently materialized.
/// - (I3) `origin_hash` is `Some` iff the store was last written by a
///   resolution rooted in a known manifest set.
#[derive(Debug, Clone)]
pub struct ResolvedPackagesStore {
    path: PathBuf,
    pins: HashMap<PackageIdentity, ResolvedPackage>,
    origin_hash: Option<String>,
    minimum_tools_version: Option<String>,
    /// Top-level `Package.resolved` keys this version doesn't understand,
    /// kept opaque and round-tripped through every `load`/`save` pair so a
    /// hand-edited or future-version field is never silently dropped.
    extra: std::collections::BTreeMap<String, toml::Value>,
}

impl ResolvedPackagesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ResolvedPackagesStore {
            path: path.into(),
            pins: HashMap::new(),
            origin_hash: None,
            minimum_tools_version: None,
            extra: std::collections::BTreeMap::new(),
        }
    }

    /// Loads the store from disk. A missing file yields an empty store
    /// rather than an error — the first resolution cycle always starts
    /// from nothing.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, PinStoreError> {
        let path = path.into();
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ResolvedPackagesStore::new(path));
            }
            Err(e) => {
                return Err(PinStoreError::Read { path, source: e });
            }
        };
        let doc = resolver_schemas::parse(&contents)?;
        let mut pins = HashMap::new();
        for (identity_str, pin_schema) in doc.pins {
            let identity = PackageIdentity::from_name(&identity_str);
            pins.insert(identity.clone(), decode_pin(identity, pin_schema));
        }
        tracing::debug!(path = %path.display(), pins = pins.len(), "loaded Package.resolved");
        Ok(ResolvedPackagesStore {
            path,
            pins,
            origin_hash: doc.origin_hash,
            minimum_tools_version: doc.minimum_tools_version,
            extra: doc.extra,
        })
    }

    pub fn origin_hash(&self) -> Option<&str> {
        self.origin_hash.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn get(&self, identity: &PackageIdentity) -> Option<&ResolvedPackage> {
        self.pins.get(identity)
    }

    /// spec §4.2 "lookup by location": returns a pin iff both identity
    /// matches and the stored location equals the queried reference's
    /// location. Detects a package whose source URL moved while its
    /// identity stayed stable.
    pub fn get_matching_location(&self, package_ref: &PackageReference) -> Option<&ResolvedPackage> {
        self.pins
            .get(&package_ref.identity)
            .filter(|pin| pin.package_ref.location == package_ref.location)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedPackage> {
        self.pins.values()
    }

    /// spec §4.2 `add(ManagedDependency)`: derives a `PinState` from the
    /// dependency's materialized state. `fileSystem`/`edited`/`custom`
    /// dependencies aren't pinnable and are silently skipped, matching the
    /// spec's "not pinnable (skipped)".
    pub fn add(&mut self, dep: &ManagedDependency) {
        let Some(state) = pin_state_for(&dep.state) else {
            return;
        };
        self.pins.insert(
            dep.identity().clone(),
            ResolvedPackage {
                package_ref: dep.package_ref.clone(),
                state,
                origin_hash: None,
            },
        );
    }

    pub fn remove(&mut self, identity: &PackageIdentity) {
        self.pins.remove(identity);
    }

    /// Writes the store to disk with the supplied origin hash and minimum
    /// tools version, atomically (temp file + rename) and with pins sorted
    /// by identity for a stable diff.
    pub fn save(
        &mut self,
        origin_hash: String,
        minimum_tools_version: Option<String>,
    ) -> Result<(), PinStoreError> {
        self.origin_hash = Some(origin_hash.clone());
        if minimum_tools_version.is_some() {
            self.minimum_tools_version = minimum_tools_version;
        }

        let mut doc = ResolvedFileSchema::new(Some(origin_hash), self.minimum_tools_version.clone());
        doc.extra = self.extra.clone();
        for pin in self.pins.values() {
            doc.pins
                .insert(pin.package_ref.identity.as_str().to_string(), encode_pin(pin));
        }
        let text = resolver_schemas::serialize(&doc)?;
        resolver_util::atomic::write_atomic(&self.path, text.as_bytes()).map_err(|source| {
            PinStoreError::Write {
                path: self.path.clone(),
                source,
            }
        })?;
        tracing::info!(path = %self.path.display(), pins = self.pins.len(), "saved Package.resolved");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn pin_state_for(state: &ManagedDependencyState) -> Option<PinState> {
    match state {
        ManagedDependencyState::SourceControlCheckout(checkout) => Some(match checkout.clone() {
            CheckoutState::Version(v, r) => PinState::Version(v, Some(r)),
            CheckoutState::Revision(r) => PinState::Revision(r),
            CheckoutState::Branch(name, r) => PinState::Branch(name, r),
        }),
        ManagedDependencyState::RegistryDownload(v) => Some(PinState::Version(v.clone(), None)),
        ManagedDependencyState::FileSystem(_)
        | ManagedDependencyState::Edited { .. }
        | ManagedDependencyState::Custom(_, _) => None,
    }
}

fn encode_pin(pin: &ResolvedPackage) -> PinSchema {
    let kind = match pin.package_ref.kind {
        ReferenceKind::Root => ReferenceKindSchema::Root,
        ReferenceKind::FileSystem => ReferenceKindSchema::FileSystem,
        ReferenceKind::LocalSourceControl => ReferenceKindSchema::LocalSourceControl,
        ReferenceKind::RemoteSourceControl => ReferenceKindSchema::RemoteSourceControl,
        ReferenceKind::Registry => ReferenceKindSchema::Registry,
        ReferenceKind::Edited => ReferenceKindSchema::Edited,
    };
    let (state, version, revision, branch) = match &pin.state {
        PinState::Version(v, r) => (
            PinStateSchema::Version,
            Some(v.to_string()),
            r.as_ref().map(|r| r.as_str().to_string()),
            None,
        ),
        PinState::Revision(r) => (PinStateSchema::Revision, None, Some(r.as_str().to_string()), None),
        PinState::Branch(name, r) => (
            PinStateSchema::Branch,
            None,
            Some(r.as_str().to_string()),
            Some(name.clone()),
        ),
    };
    PinSchema {
        kind,
        location: pin.package_ref.location.clone(),
        state,
        version,
        revision,
        branch,
    }
}

fn decode_pin(identity: PackageIdentity, schema: PinSchema) -> ResolvedPackage {
    let kind = match schema.kind {
        ReferenceKindSchema::Root => ReferenceKind::Root,
        ReferenceKindSchema::FileSystem => ReferenceKind::FileSystem,
        ReferenceKindSchema::LocalSourceControl => ReferenceKind::LocalSourceControl,
        ReferenceKindSchema::RemoteSourceControl => ReferenceKind::RemoteSourceControl,
        ReferenceKindSchema::Registry => ReferenceKind::Registry,
        ReferenceKindSchema::Edited => ReferenceKind::Edited,
    };
    let state = match schema.state {
        PinStateSchema::Version => PinState::Version(
            schema
                .version
                .as_deref()
                .and_then(|v| Version::parse(v).ok())
                .unwrap_or(Version::new(0, 0, 0)),
            schema.revision.map(Revision::new),
        ),
        PinStateSchema::Revision => {
            PinState::Revision(Revision::new(schema.revision.unwrap_or_default()))
        }
        PinStateSchema::Branch => PinState::Branch(
            schema.branch.unwrap_or_default(),
            Revision::new(schema.revision.unwrap_or_default()),
        ),
    };
    ResolvedPackage {
        package_ref: PackageReference::new(identity, kind, schema.location),
        state,
        origin_hash: None,
    }
}
