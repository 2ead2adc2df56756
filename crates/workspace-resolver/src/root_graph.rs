//! A minimal adjacency helper tracking root package identities before a
//! resolver binding list exists (SPEC_FULL.md §4 supplement), in the
//! spirit — not the code — of `cargo`'s internal `Graph<PackageId, _>`.

use std::collections::HashSet;

use crate::identity::PackageIdentity;
use crate::manifest::RootManifest;
use crate::reconcile::RootSet;

#[derive(Debug, Clone, Default)]
pub struct RootGraph {
    roots: HashSet<PackageIdentity>,
}

impl RootGraph {
    pub fn from_manifests(manifests: &[RootManifest]) -> Self {
        RootGraph {
            roots: manifests.iter().map(|m| m.identity.clone()).collect(),
        }
    }

    pub fn identities(&self) -> impl Iterator<Item = &PackageIdentity> {
        self.roots.iter()
    }
}

impl RootSet for RootGraph {
    fn is_root(&self, identity: &PackageIdentity) -> bool {
        self.roots.contains(identity)
    }
}
