//! Top-level error kinds (spec §7).

use crate::checkout::CheckoutError;
use crate::identity::PackageIdentity;
use crate::managed::ManagedStoreError;
use crate::pin::PinStoreError;
use crate::reconcile::ReconcileError;
use crate::solver::SolveFailure;

#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error("integrity check failed for `{identity}`: {reason}")]
    Integrity {
        identity: PackageIdentity,
        reason: String,
    },

    #[error("dependency resolution failed: {0}")]
    ResolutionFailure(#[from] SolveFailure),

    #[error(
        "resolution produced a graph that still references unobtainable packages after checkout: {missing:?}"
    )]
    ExhaustedAttempts { missing: Vec<PackageIdentity> },

    #[error("reconciliation found an inconsistent state: {0}")]
    Inconsistency(#[from] ReconcileError),

    #[error("transport error while contacting `{identity}`: {source}")]
    Transport {
        identity: PackageIdentity,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Persistence(#[from] PinStoreError),

    #[error(transparent)]
    ManagedPersistence(#[from] ManagedStoreError),

    /// spec §4.7 `resolve(lockFile)`: the lock file is authoritative, but
    /// precomputation determined a real resolution is required.
    #[error("Package.resolved is out of date and the `lockFile` strategy forbids re-resolving: {0}")]
    LockFileOutOfDate(String),
}
