//! Delegate callbacks (spec §6 "observable events") and the one-shot
//! fan-out gate described in spec §9.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use crate::identity::PackageIdentity;
use crate::version::Version;

/// Observable events the orchestrator fires during a resolve/update cycle.
/// Borrowed for the duration of one cycle — spec §9 describes the
/// resolver's own delegate as holding a "weak back-reference" to this one
/// purely for reporting; in Rust that's just a `&dyn WorkspaceDelegate`
/// whose lifetime the borrow checker bounds to the call, no `Weak<_>`
/// bookkeeping required.
pub trait WorkspaceDelegate: Send + Sync {
    fn will_resolve_dependencies(&self, _reason: Option<&str>) {}
    fn did_resolve_dependencies(&self, _duration: Duration) {}
    fn will_update_dependencies(&self) {}
    fn did_update_dependencies(&self, _duration: Duration) {}
    fn will_compute_version(&self, _package: &PackageIdentity, _location: &str) {}
    fn did_compute_version(
        &self,
        _package: &PackageIdentity,
        _location: &str,
        _version: &Version,
        _duration: Duration,
    ) {
    }
    fn dependencies_up_to_date(&self) {}
}

/// A delegate that ignores every event, for call sites that don't need
/// observability (tests, precompute-only paths).
pub struct NullDelegate;
impl WorkspaceDelegate for NullDelegate {}

/// spec §9 "Concurrent map for one-shot delegate fan-out": the
/// `willComputeVersion`-per-package event must fire at most once per
/// identity despite the solver potentially visiting the same package
/// across multiple version ranges. A `Mutex<HashSet<_>>` gives the same
/// memoize-on-first-touch semantics as an atomic compare-and-set map
/// without reaching for a lock-free structure this workload doesn't need.
#[derive(Default)]
pub struct OnceGate {
    fired: Mutex<HashSet<PackageIdentity>>,
}

impl OnceGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time it's called for `identity`, `false`
    /// on every subsequent call.
    pub fn fire_once(&self, identity: &PackageIdentity) -> bool {
        self.fired
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .insert(identity.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_exactly_once_per_identity() {
        let gate = OnceGate::new();
        let id = PackageIdentity::from_name("foo");
        assert!(gate.fire_once(&id));
        assert!(!gate.fire_once(&id));
        assert!(!gate.fire_once(&id));
    }

    #[test]
    fn distinct_identities_each_fire_once() {
        let gate = OnceGate::new();
        assert!(gate.fire_once(&PackageIdentity::from_name("a")));
        assert!(gate.fire_once(&PackageIdentity::from_name("b")));
    }
}
