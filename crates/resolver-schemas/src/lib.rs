//! On-disk schema for the `Package.resolved` lock file.
//!
//! This crate only knows about *shapes*: it has no notion of a managed
//! dependency store, a container provider, or a resolver. That separation
//! lets the on-disk format evolve (new schema versions) without dragging
//! the whole resolution core along, the same split `cargo-util-schemas`
//! draws between `Cargo.lock`'s serialized shape and `cargo`'s in-memory
//! `Resolve` graph.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The `Package.resolved` format understood by this crate. Bumped whenever
/// the on-disk shape changes in a way that isn't purely additive.
pub const SCHEMA_VERSION: u32 = 1;

/// Top-level document written to `Package.resolved`.
///
/// Pins are stored in a `BTreeMap` keyed by identity so serialization is
/// naturally sorted and diffs stay small, matching spec §4.2's "writes a
/// stable serialization (sorted by identity)".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedFileSchema {
    pub version: u32,
    #[serde(rename = "originHash", skip_serializing_if = "Option::is_none")]
    pub origin_hash: Option<String>,
    #[serde(rename = "minimumToolsVersion", skip_serializing_if = "Option::is_none")]
    pub minimum_tools_version: Option<String>,
    pub pins: BTreeMap<String, PinSchema>,
    /// Top-level keys this version of the schema doesn't recognize.
    /// Captured rather than rejected so a newer writer's fields survive a
    /// round trip through an older reader, the same passthrough
    /// `cargo::core::resolver::Resolve::merge_from` uses to carry forward
    /// checksums it didn't itself compute.
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

impl ResolvedFileSchema {
    pub fn new(origin_hash: Option<String>, minimum_tools_version: Option<String>) -> Self {
        Self {
            version: SCHEMA_VERSION,
            origin_hash,
            minimum_tools_version,
            pins: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }
}

/// A single pinned package entry as it appears on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PinSchema {
    pub kind: ReferenceKindSchema,
    pub location: String,
    pub state: PinStateSchema,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ReferenceKindSchema {
    Root,
    FileSystem,
    LocalSourceControl,
    RemoteSourceControl,
    Registry,
    Edited,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PinStateSchema {
    Version,
    Revision,
    Branch,
}

/// Errors that can occur while loading or saving `Package.resolved`.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("failed to parse Package.resolved: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize Package.resolved: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error(
        "Package.resolved was written by a newer format (version {found}); this tool understands up to version {supported}"
    )]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("failed to parse the managed-dependency database: {0}")]
    ParseWorkspaceState(#[source] serde_json::Error),
    #[error("failed to serialize the managed-dependency database: {0}")]
    SerializeWorkspaceState(#[source] serde_json::Error),
    #[error(
        "the managed-dependency database was written by a newer format (version {found}); this tool understands up to version {supported}"
    )]
    UnsupportedWorkspaceStateVersion { found: u32, supported: u32 },
}

/// On-disk schema for the managed-dependency database (spec §6: "on-disk
/// directory layout with one subdirectory per checked-out package ...
/// Custom dependencies may record arbitrary paths"). Stored as JSON rather
/// than TOML, the same split `cargo-util-schemas` draws between
/// `Cargo.lock` (TOML) and `.cargo/.crates2.json`/`.package-cache` (JSON) —
/// not every piece of persisted state needs the same on-disk format, and a
/// bag of per-package state keyed by identity is a natural JSON document.
pub const WORKSPACE_STATE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceStateSchema {
    pub version: u32,
    pub dependencies: Vec<ManagedDependencySchema>,
}

impl WorkspaceStateSchema {
    pub fn new(dependencies: Vec<ManagedDependencySchema>) -> Self {
        Self {
            version: WORKSPACE_STATE_SCHEMA_VERSION,
            dependencies,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManagedDependencySchema {
    pub identity: String,
    pub kind: ReferenceKindSchema,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subpath: Option<String>,
    pub state: ManagedStateSchema,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CheckoutStateSchema {
    Version,
    Revision,
    Branch,
}

/// `ManagedDependencyState` (spec §3), with one additional recursive
/// `basedOn` field on `edited` that mirrors the domain type's
/// `Option<Box<ManagedDependency>>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ManagedStateSchema {
    SourceControlCheckout {
        checkout: CheckoutStateSchema,
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        revision: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
    },
    RegistryDownload {
        version: String,
    },
    FileSystem {
        path: String,
    },
    Edited {
        #[serde(skip_serializing_if = "Option::is_none")]
        based_on: Option<Box<ManagedDependencySchema>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        unmanaged_path: Option<String>,
    },
    Custom {
        version: String,
        path: String,
    },
}

/// Parses a workspace-state document from its JSON text, rejecting
/// documents from a newer, not-yet-understood schema version.
pub fn parse_workspace_state(contents: &str) -> Result<WorkspaceStateSchema, SchemaError> {
    let doc: WorkspaceStateSchema =
        serde_json::from_str(contents).map_err(SchemaError::ParseWorkspaceState)?;
    if doc.version > WORKSPACE_STATE_SCHEMA_VERSION {
        return Err(SchemaError::UnsupportedWorkspaceStateVersion {
            found: doc.version,
            supported: WORKSPACE_STATE_SCHEMA_VERSION,
        });
    }
    Ok(doc)
}

/// Serializes a workspace-state document to pretty-printed JSON text.
pub fn serialize_workspace_state(doc: &WorkspaceStateSchema) -> Result<String, SchemaError> {
    serde_json::to_string_pretty(doc).map_err(SchemaError::SerializeWorkspaceState)
}

/// Parses a `Package.resolved` document from its TOML text, rejecting
/// documents from a newer, not-yet-understood schema version.
pub fn parse(contents: &str) -> Result<ResolvedFileSchema, SchemaError> {
    let doc: ResolvedFileSchema = toml::from_str(contents)?;
    if doc.version > SCHEMA_VERSION {
        return Err(SchemaError::UnsupportedVersion {
            found: doc.version,
            supported: SCHEMA_VERSION,
        });
    }
    Ok(doc)
}

/// Serializes a `Package.resolved` document to TOML text.
pub fn serialize(doc: &ResolvedFileSchema) -> Result<String, SchemaError> {
    Ok(toml::to_string_pretty(doc)?)
}
