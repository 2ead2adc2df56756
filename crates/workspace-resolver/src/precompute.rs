//! Precomputer (C5, spec §4.4): decides whether full resolution can be
//! skipped by running the solver against an in-memory, network-free view
//! of what's already loaded.

use crate::solver::{Constraint, Resolver, SolveFailure};

/// spec §9 "Open questions" note: whether a binding conflicts with an
/// edited override during precomputation is left ambiguous by spec.md.
/// DESIGN.md records the decision: the precomputer reports whatever the
/// resolver reports and does not itself special-case edited packages —
/// that's the reconciler's job (spec §4.5 step 1), which always runs after
/// a real resolve, never after a precompute-only cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionPrecomputationResult {
    NotRequired,
    Required(PrecomputationReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrecomputationReason {
    NewPackages(String),
    PackageRequirementChange { package: String, detail: String },
    Other(String),
    ErrorsPreviouslyReported,
}

/// The precomputer must not mutate any store (spec §4.4); it's a pure
/// function of a resolver instance (already wired by its caller to answer
/// only from loaded manifests, never the network) and a constraint set.
pub struct Precomputer;

impl Precomputer {
    /// Runs `resolver` against `constraints` and maps the outcome per spec
    /// §4.4's result table. `errors_previously_reported` models "if
    /// diagnostics already reported errors during setup" — checked before
    /// even invoking the solver, since there is nothing useful left to
    /// precompute once that has happened.
    pub async fn run(
        resolver: &dyn Resolver,
        constraints: &[Constraint],
        errors_previously_reported: bool,
    ) -> ResolutionPrecomputationResult {
        if errors_previously_reported {
            return ResolutionPrecomputationResult::Required(
                PrecomputationReason::ErrorsPreviouslyReported,
            );
        }

        match resolver.solve(constraints).await {
            Ok(_bindings) => ResolutionPrecomputationResult::NotRequired,
            Err(SolveFailure::MissingPackage(pkg)) => {
                ResolutionPrecomputationResult::Required(PrecomputationReason::NewPackages(pkg.to_string()))
            }
            Err(SolveFailure::DifferentRequirement { package, requirement }) => {
                ResolutionPrecomputationResult::Required(PrecomputationReason::PackageRequirementChange {
                    package: package.to_string(),
                    detail: requirement,
                })
            }
            Err(SolveFailure::Unsatisfiable(msg)) => {
                ResolutionPrecomputationResult::Required(PrecomputationReason::Other(msg))
            }
            Err(SolveFailure::Other(msg)) => {
                ResolutionPrecomputationResult::Required(PrecomputationReason::Other(msg))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PackageIdentity;
    use crate::reference::{PackageReference, ReferenceKind};
    use crate::solver::{BoundVersion, DependencyResolverBinding, DisplayRef, ProductFilter};
    use crate::version::Version;
    use async_trait::async_trait;

    struct AlwaysSucceeds;
    #[async_trait]
    impl Resolver for AlwaysSucceeds {
        async fn solve(
            &self,
            constraints: &[Constraint],
        ) -> Result<Vec<DependencyResolverBinding>, SolveFailure> {
            Ok(constraints
                .iter()
                .map(|c| DependencyResolverBinding {
                    package: c.package.clone(),
                    bound_version: BoundVersion::Version(Version::new(1, 0, 0)),
                    products: ProductFilter::default(),
                })
                .collect())
        }
    }

    struct AlwaysMissing;
    #[async_trait]
    impl Resolver for AlwaysMissing {
        async fn solve(&self, _constraints: &[Constraint]) -> Result<Vec<DependencyResolverBinding>, SolveFailure> {
            Err(SolveFailure::MissingPackage(DisplayRef(PackageReference::new(
                PackageIdentity::from_name("missing"),
                ReferenceKind::Registry,
                "missing",
            ))))
        }
    }

    #[test]
    fn success_means_not_required() {
        let result = futures::executor::block_on(Precomputer::run(&AlwaysSucceeds, &[], false));
        assert_eq!(result, ResolutionPrecomputationResult::NotRequired);
    }

    #[test]
    fn missing_package_maps_to_new_packages_reason() {
        let result = futures::executor::block_on(Precomputer::run(&AlwaysMissing, &[], false));
        assert!(matches!(
            result,
            ResolutionPrecomputationResult::Required(PrecomputationReason::NewPackages(_))
        ));
    }

    #[test]
    fn previously_reported_errors_short_circuit_before_solving() {
        let result = futures::executor::block_on(Precomputer::run(&AlwaysMissing, &[], true));
        assert_eq!(
            result,
            ResolutionPrecomputationResult::Required(PrecomputationReason::ErrorsPreviouslyReported)
        );
    }
}
