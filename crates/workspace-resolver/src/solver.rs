//! Resolver (C4, consumed interface, spec §4.4/§6): the PubGrub-style SAT
//! solver. Its internals are explicitly out of scope; this module only
//! carries the interface shape the core depends on.

use async_trait::async_trait;
use semver::VersionReq;

use crate::reference::PackageReference;
use crate::version::{Revision, Version};

/// What the caller is asking the solver to satisfy for one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRequirement {
    Version(VersionReq),
    Revision(Revision, Option<String>),
    Unversioned,
}

/// One constraint fed into `solve` — a requirement contributed by a root
/// manifest, a loaded dependency manifest, an edited package, or an extra
/// caller-supplied constraint (spec §4.4, §4.7 step 4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub package: PackageReference,
    pub requirement: VersionRequirement,
}

/// spec §3 `DependencyResolverBinding.boundVersion`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundVersion {
    /// A valid solver state never emits this for a binding passed to the
    /// core; the reconciler treats it as a fatal, solver-is-broken signal
    /// (spec §4.5 step 3, "excluded → fatal").
    Excluded,
    Unversioned,
    Version(Version),
    Revision(Revision, Option<String>),
}

/// Which products of a package were pulled in, opaque to the core beyond
/// being carried through to the reconciler's output `State`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter(pub Vec<String>);

/// spec §3 `DependencyResolverBinding`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyResolverBinding {
    pub package: PackageReference,
    pub bound_version: BoundVersion,
    pub products: ProductFilter,
}

/// Failure shapes the solver can report (spec §4.4 result mapping, §7
/// `ResolutionFailure`).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SolveFailure {
    #[error("no package satisfies the constraints for `{0}`")]
    MissingPackage(DisplayRef),
    #[error("`{package}` is pinned to a different requirement than the graph now needs: {requirement}")]
    DifferentRequirement {
        package: DisplayRef,
        requirement: String,
    },
    #[error("unsatisfiable: {0}")]
    Unsatisfiable(String),
    #[error("{0}")]
    Other(String),
}

/// `PackageReference` doesn't implement `Display` (it has no single
/// canonical rendering outside of diagnostics); this thin wrapper supplies
/// one purely for error messages so `SolveFailure` can derive `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRef(pub PackageReference);

impl std::fmt::Display for DisplayRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.identity)
    }
}

impl From<PackageReference> for DisplayRef {
    fn from(p: PackageReference) -> Self {
        DisplayRef(p)
    }
}

/// Consumed interface: `resolver.solve(constraints) -> Success(bindings) |
/// Failure(error)`.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn solve(
        &self,
        constraints: &[Constraint],
    ) -> Result<Vec<DependencyResolverBinding>, SolveFailure>;
}
