//! Container Provider (C3, consumed interface, spec §4.3).

use async_trait::async_trait;

use crate::reference::PackageReference;
use crate::version::{Revision, Version};

/// How aggressively a container should refresh upstream state before
/// answering queries (spec §4.3, §4.8, glossary "Update strategy").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStrategy {
    Never,
    IfNeeded(Revision),
    Always,
}

/// Scope/telemetry handle threaded through provider calls; the core treats
/// it as an opaque token it passes along, not something it interprets.
#[derive(Debug, Clone, Default)]
pub struct OperationScope {
    pub label: Option<String>,
}

/// A tag resolved from a version, as returned by a source-control
/// container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
}

/// The three container kinds the core distinguishes (spec §9 "container
/// polymorphism"). Each variant carries only the capability surface the
/// core actually calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    SourceControl,
    Registry,
    Custom,
}

/// A handle to a package's versioned history. `getContainer` hands one of
/// these back; `kind` tells the caller which capability subset applies.
#[async_trait]
pub trait Container: Send + Sync {
    fn kind(&self) -> ContainerKind;

    /// Source-control containers resolve a version to its tag, if any
    /// release was tagged for it.
    async fn get_tag(&self, for_version: &Version) -> anyhow::Result<Option<Tag>>;

    /// Resolves a tag name or an arbitrary identifier (branch name, short
    /// hash) to a full revision.
    async fn get_revision(&self, for_tag_or_identifier: &str) -> anyhow::Result<Revision>;

    /// Verifies that `(version, revision)` are mutually consistent (e.g.
    /// the tag for `version` really points at `revision`).
    async fn check_integrity(&self, version: &Version, revision: &Revision) -> anyhow::Result<()>;
}

/// Consumed interface: `getContainer(package, updateStrategy, scope) ->
/// Container`. Implementations must be safe for concurrent calls with
/// distinct packages; concurrent calls for the same package must be
/// coalesced (spec §4.3) — that coalescing is the provider's
/// responsibility, not the core's.
#[async_trait]
pub trait ContainerProvider: Send + Sync {
    async fn get_container(
        &self,
        package: &PackageReference,
        update_strategy: UpdateStrategy,
        scope: &OperationScope,
    ) -> anyhow::Result<Box<dyn Container>>;
}
