//! State Reconciler (C6, spec §4.5): diffs resolver bindings against the
//! managed-dependency store and classifies each package as
//! added/updated/unchanged/removed.
//!
//! This component is pure computation — spec §5 lists it among the things
//! that "run without yielding" — so it takes an immutable snapshot of the
//! managed store and never touches a container or the network.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::identity::PackageIdentity;
use crate::managed::{CheckoutState, ManagedDependency, ManagedDependencyState};
use crate::reference::PackageReference;
use crate::solver::{BoundVersion, DependencyResolverBinding, ProductFilter};
use crate::version::{Revision, Version};

/// spec §3 reconciler `Requirement`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Version(Version),
    Revision(Revision, Option<String>),
    Unversioned,
}

/// spec §3 `State = {Requirement, ProductFilter}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    pub requirement: Requirement,
    pub products: ProductFilter,
}

/// spec §3 `PackageStateChange`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageStateChange {
    Added(State),
    Updated(State),
    Unchanged,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("solver emitted an `excluded` binding for `{0}`; this indicates a solver defect")]
    ExcludedBindingEmitted(PackageIdentity),
    #[error(
        "illegal transition: `{0}` moved to unversioned from a registry/custom download, which is not a reachable state"
    )]
    IllegalUnversionedTransition(PackageIdentity),
}

/// Identifies a root package so unversioned bindings for roots can be
/// skipped (spec §4.5 step 3, "if the package is a root → skip").
pub trait RootSet {
    fn is_root(&self, identity: &PackageIdentity) -> bool;
}

impl RootSet for HashSet<PackageIdentity> {
    fn is_root(&self, identity: &PackageIdentity) -> bool {
        self.contains(identity)
    }
}

/// Runs the reconciliation described in spec §4.5 and returns an ordered
/// list of `(PackageReference, PackageStateChange)`, bindings first in
/// input order, removals last.
pub fn reconcile(
    bindings: &[DependencyResolverBinding],
    managed: &IndexMap<PackageIdentity, ManagedDependency>,
    roots: &impl RootSet,
    update_branches: bool,
    pins: &IndexMap<PackageIdentity, crate::pin::ResolvedPackage>,
) -> Result<Vec<(PackageReference, PackageStateChange)>, ReconcileError> {
    let mut out = Vec::with_capacity(bindings.len());
    let mut touched: HashSet<PackageIdentity> = HashSet::new();

    for binding in bindings {
        let identity = binding.package.identity.clone();
        touched.insert(identity.clone());

        // Step 1: edited dependencies are preserved across resolutions —
        // emit `unchanged` for the *original* reference they're based on.
        if let Some(current) = managed.get(&identity) {
            if let ManagedDependencyState::Edited { based_on, .. } = &current.state {
                let original_ref = based_on
                    .as_ref()
                    .map(|b| b.package_ref.clone())
                    .unwrap_or_else(|| current.package_ref.clone());
                out.push((original_ref, PackageStateChange::Unchanged));
                continue;
            }
        }

        // Step 2: re-lookup by (identity, location) to capture drift. The
        // map is keyed purely by identity, so a package whose source moved
        // while its version/revision stayed put would otherwise look
        // unchanged; `classify` checks `location_drifted` alongside each
        // arm's own state comparison to force `Updated` in that case.
        let current = managed.get(&identity);

        let change = classify(binding, current, roots, update_branches, pins, &identity)?;
        out.push((binding.package.clone(), change));
    }

    // Step 4: anything untouched becomes `removed`, emitted last.
    let mut removed: Vec<_> = managed
        .iter()
        .filter(|(id, dep)| !touched.contains(*id) && !dep.state.is_edited())
        .map(|(_, dep)| (dep.package_ref.clone(), PackageStateChange::Removed))
        .collect();
    removed.sort_by(|a, b| a.0.identity.cmp(&b.0.identity));
    out.extend(removed);

    Ok(out)
}

fn classify(
    binding: &DependencyResolverBinding,
    current: Option<&ManagedDependency>,
    roots: &impl RootSet,
    update_branches: bool,
    pins: &IndexMap<PackageIdentity, crate::pin::ResolvedPackage>,
    identity: &PackageIdentity,
) -> Result<PackageStateChange, ReconcileError> {
    let drifted = location_drifted(current, binding);

    match &binding.bound_version {
        BoundVersion::Excluded => Err(ReconcileError::ExcludedBindingEmitted(identity.clone())),

        BoundVersion::Unversioned => {
            if roots.is_root(identity) {
                return Ok(PackageStateChange::Unchanged);
            }
            match current.map(|d| &d.state) {
                Some(ManagedDependencyState::FileSystem(_)) | Some(ManagedDependencyState::Edited { .. }) => {
                    if drifted {
                        Ok(PackageStateChange::Updated(State {
                            requirement: Requirement::Unversioned,
                            products: binding.products.clone(),
                        }))
                    } else {
                        Ok(PackageStateChange::Unchanged)
                    }
                }
                Some(ManagedDependencyState::SourceControlCheckout(_)) => Ok(PackageStateChange::Updated(State {
                    requirement: Requirement::Unversioned,
                    products: binding.products.clone(),
                })),
                Some(ManagedDependencyState::RegistryDownload(_)) | Some(ManagedDependencyState::Custom(_, _)) => {
                    Err(ReconcileError::IllegalUnversionedTransition(identity.clone()))
                }
                None => Ok(PackageStateChange::Added(State {
                    requirement: Requirement::Unversioned,
                    products: binding.products.clone(),
                })),
            }
        }

        BoundVersion::Revision(id, branch) => {
            let effective_revision = if !update_branches {
                if let (Some(branch_name), Some(pin)) = (branch, pins.get(identity)) {
                    match &pin.state {
                        crate::pin::PinState::Branch(pinned_branch, pinned_rev) if pinned_branch == branch_name => {
                            pinned_rev.clone()
                        }
                        _ => id.clone(),
                    }
                } else {
                    id.clone()
                }
            } else {
                id.clone()
            };

            let target = match branch {
                Some(name) => CheckoutState::Branch(name.clone(), effective_revision),
                None => CheckoutState::Revision(effective_revision),
            };

            match current.map(|d| &d.state) {
                Some(ManagedDependencyState::SourceControlCheckout(existing)) if *existing == target && !drifted => {
                    Ok(PackageStateChange::Unchanged)
                }
                Some(ManagedDependencyState::SourceControlCheckout(_)) | Some(_) => {
                    Ok(PackageStateChange::Updated(state_for_checkout(&target, &binding.products)))
                }
                None => Ok(PackageStateChange::Added(state_for_checkout(&target, &binding.products))),
            }
        }

        BoundVersion::Version(v) => match current.map(|d| &d.state) {
            Some(ManagedDependencyState::SourceControlCheckout(CheckoutState::Version(existing, _)))
                if existing == v && !drifted =>
            {
                Ok(PackageStateChange::Unchanged)
            }
            Some(ManagedDependencyState::RegistryDownload(existing)) if existing == v && !drifted => {
                Ok(PackageStateChange::Unchanged)
            }
            Some(ManagedDependencyState::Custom(existing, _)) if existing == v && !drifted => {
                Ok(PackageStateChange::Unchanged)
            }
            Some(_) => Ok(PackageStateChange::Updated(State {
                requirement: Requirement::Version(v.clone()),
                products: binding.products.clone(),
            })),
            None => Ok(PackageStateChange::Added(State {
                requirement: Requirement::Version(v.clone()),
                products: binding.products.clone(),
            })),
        },
    }
}

/// spec §4.5 step 2: a package whose current location differs from the
/// binding's location has drifted (its source URL moved while identity
/// stayed stable) and can never be classified `Unchanged`, regardless of
/// whether its version/revision/branch still matches.
fn location_drifted(current: Option<&ManagedDependency>, binding: &DependencyResolverBinding) -> bool {
    current
        .map(|dep| dep.package_ref.location != binding.package.location)
        .unwrap_or(false)
}

fn state_for_checkout(target: &CheckoutState, products: &ProductFilter) -> State {
    let requirement = match target {
        CheckoutState::Version(v, _) => Requirement::Version(v.clone()),
        CheckoutState::Revision(r) => Requirement::Revision(r.clone(), None),
        CheckoutState::Branch(name, r) => Requirement::Revision(r.clone(), Some(name.clone())),
    };
    State {
        requirement,
        products: products.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pin::{PinState, ResolvedPackage};
    use crate::reference::ReferenceKind;

    fn pkg_ref(name: &str) -> PackageReference {
        PackageReference::new(PackageIdentity::from_name(name), ReferenceKind::Registry, name)
    }

    fn binding_version(name: &str, v: (u64, u64, u64)) -> DependencyResolverBinding {
        DependencyResolverBinding {
            package: pkg_ref(name),
            bound_version: BoundVersion::Version(Version::new(v.0, v.1, v.2)),
            products: ProductFilter::default(),
        }
    }

    #[test]
    fn p3_unchanged_when_version_matches_existing_registry_download() {
        let mut managed = IndexMap::new();
        managed.insert(
            PackageIdentity::from_name("foo"),
            ManagedDependency::new(pkg_ref("foo"), ManagedDependencyState::RegistryDownload(Version::new(1, 0, 0))),
        );
        let roots = HashSet::new();
        let pins = IndexMap::new();
        let out = reconcile(&[binding_version("foo", (1, 0, 0))], &managed, &roots, true, &pins).unwrap();
        assert_eq!(out, vec![(pkg_ref("foo"), PackageStateChange::Unchanged)]);
    }

    #[test]
    fn location_drift_forces_updated_even_when_version_matches() {
        let mut managed = IndexMap::new();
        managed.insert(
            PackageIdentity::from_name("foo"),
            ManagedDependency::new(
                PackageReference::new(PackageIdentity::from_name("foo"), ReferenceKind::Registry, "old-location"),
                ManagedDependencyState::RegistryDownload(Version::new(1, 0, 0)),
            ),
        );
        let roots = HashSet::new();
        let pins = IndexMap::new();
        let binding = DependencyResolverBinding {
            package: PackageReference::new(PackageIdentity::from_name("foo"), ReferenceKind::Registry, "new-location"),
            bound_version: BoundVersion::Version(Version::new(1, 0, 0)),
            products: ProductFilter::default(),
        };
        let out = reconcile(&[binding], &managed, &roots, true, &pins).unwrap();
        match &out[0].1 {
            PackageStateChange::Updated(state) => assert_eq!(state.requirement, Requirement::Version(Version::new(1, 0, 0))),
            other => panic!("expected Updated on location drift, got {other:?}"),
        }
    }

    #[test]
    fn added_when_no_current_managed_dependency() {
        let managed = IndexMap::new();
        let roots = HashSet::new();
        let pins = IndexMap::new();
        let out = reconcile(&[binding_version("foo", (2, 0, 0))], &managed, &roots, true, &pins).unwrap();
        match &out[0].1 {
            PackageStateChange::Added(state) => assert_eq!(state.requirement, Requirement::Version(Version::new(2, 0, 0))),
            other => panic!("expected Added, got {other:?}"),
        }
    }

    #[test]
    fn untouched_managed_dependency_is_removed_last() {
        let mut managed = IndexMap::new();
        managed.insert(
            PackageIdentity::from_name("stale"),
            ManagedDependency::new(pkg_ref("stale"), ManagedDependencyState::RegistryDownload(Version::new(1, 0, 0))),
        );
        managed.insert(
            PackageIdentity::from_name("foo"),
            ManagedDependency::new(pkg_ref("foo"), ManagedDependencyState::RegistryDownload(Version::new(1, 0, 0))),
        );
        let roots = HashSet::new();
        let pins = IndexMap::new();
        let out = reconcile(&[binding_version("foo", (1, 0, 0))], &managed, &roots, true, &pins).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.last().unwrap().1, PackageStateChange::Removed);
    }

    #[test]
    fn excluded_binding_is_fatal() {
        let managed = IndexMap::new();
        let roots = HashSet::new();
        let pins = IndexMap::new();
        let binding = DependencyResolverBinding {
            package: pkg_ref("foo"),
            bound_version: BoundVersion::Excluded,
            products: ProductFilter::default(),
        };
        let err = reconcile(&[binding], &managed, &roots, true, &pins).unwrap_err();
        assert!(matches!(err, ReconcileError::ExcludedBindingEmitted(_)));
    }

    #[test]
    fn unversioned_for_registry_download_is_illegal() {
        let mut managed = IndexMap::new();
        managed.insert(
            PackageIdentity::from_name("foo"),
            ManagedDependency::new(pkg_ref("foo"), ManagedDependencyState::RegistryDownload(Version::new(1, 0, 0))),
        );
        let roots = HashSet::new();
        let pins = IndexMap::new();
        let binding = DependencyResolverBinding {
            package: pkg_ref("foo"),
            bound_version: BoundVersion::Unversioned,
            products: ProductFilter::default(),
        };
        let err = reconcile(&[binding], &managed, &roots, true, &pins).unwrap_err();
        assert!(matches!(err, ReconcileError::IllegalUnversionedTransition(_)));
    }

    #[test]
    fn branch_freeze_reuses_pinned_revision_when_update_branches_is_false() {
        let managed = IndexMap::new();
        let roots = HashSet::new();
        let mut pins = IndexMap::new();
        pins.insert(
            PackageIdentity::from_name("lib"),
            ResolvedPackage {
                package_ref: pkg_ref("lib"),
                state: PinState::Branch("main".into(), Revision::new("revA")),
                origin_hash: None,
            },
        );
        let binding = DependencyResolverBinding {
            package: pkg_ref("lib"),
            bound_version: BoundVersion::Revision(Revision::new("revB_from_upstream"), Some("main".into())),
            products: ProductFilter::default(),
        };
        let out = reconcile(&[binding], &managed, &roots, false, &pins).unwrap();
        match &out[0].1 {
            PackageStateChange::Added(state) => {
                assert_eq!(state.requirement, Requirement::Revision(Revision::new("revA"), Some("main".into())));
            }
            other => panic!("expected Added with frozen revision, got {other:?}"),
        }
    }

    #[test]
    fn branch_tracking_updates_when_update_branches_is_true() {
        let mut managed = IndexMap::new();
        managed.insert(
            PackageIdentity::from_name("lib"),
            ManagedDependency::new(
                pkg_ref("lib"),
                ManagedDependencyState::SourceControlCheckout(CheckoutState::Branch(
                    "main".into(),
                    Revision::new("revA"),
                )),
            ),
        );
        let roots = HashSet::new();
        let mut pins = IndexMap::new();
        pins.insert(
            PackageIdentity::from_name("lib"),
            ResolvedPackage {
                package_ref: pkg_ref("lib"),
                state: PinState::Branch("main".into(), Revision::new("revA")),
                origin_hash: None,
            },
        );
        let binding = DependencyResolverBinding {
            package: pkg_ref("lib"),
            bound_version: BoundVersion::Revision(Revision::new("revB"), Some("main".into())),
            products: ProductFilter::default(),
        };
        let out = reconcile(&[binding], &managed, &roots, true, &pins).unwrap();
        match &out[0].1 {
            PackageStateChange::Updated(state) => {
                assert_eq!(state.requirement, Requirement::Revision(Revision::new("revB"), Some("main".into())));
            }
            other => panic!("expected Updated, got {other:?}"),
        }
    }

    proptest::proptest! {
        /// Whatever mix of bindings and pre-existing managed dependencies
        /// goes in, every identity appears at most once in the output —
        /// the reconciler must never emit two state changes for the same
        /// package.
        #[test]
        fn output_never_repeats_an_identity(
            binding_names in proptest::collection::hash_set("[a-z]{1,8}", 0..6),
            stale_names in proptest::collection::hash_set("[a-z]{1,8}", 0..6),
            major in 0u64..5,
        ) {
            let bindings: Vec<_> = binding_names.iter().map(|n| binding_version(n, (major, 0, 0))).collect();
            let mut managed = IndexMap::new();
            for name in &stale_names {
                managed.insert(
                    PackageIdentity::from_name(name),
                    ManagedDependency::new(pkg_ref(name), ManagedDependencyState::RegistryDownload(Version::new(0, 1, 0))),
                );
            }
            let roots = HashSet::new();
            let pins = IndexMap::new();
            let out = reconcile(&bindings, &managed, &roots, true, &pins).unwrap();

            let mut seen = HashSet::new();
            for (package_ref, _) in &out {
                proptest::prop_assert!(seen.insert(package_ref.identity.clone()));
            }
        }
    }
}
