//! Orchestrator configuration (spec §6).

use std::collections::HashSet;

/// Configuration knobs the orchestrator reads on every entry point.
/// Argument parsing (how these get populated from a CLI) is explicitly out
/// of scope; this is the already-parsed shape.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceConfiguration {
    /// Force containers to never fetch; mirrors `UpdateStrategy::Never`
    /// being used everywhere regardless of what resolve-from-lock would
    /// otherwise pick.
    pub skip_dependencies_updates: bool,
    /// Pre-warm pinned containers before resolving (spec §4.8 step 2).
    pub prefetch_based_on_resolved_file: bool,
    /// Whether manifest loading should emit multiple test products per
    /// package. Spec §6 enumerates this alongside the other configuration
    /// knobs but calls it out explicitly as "irrelevant to core" — the
    /// field is kept here only so the configuration surface matches the
    /// spec's enumeration, and it is never read by anything in this crate.
    pub should_create_multiple_test_products: bool,
    /// Trait names enabled per root package. Opaque to the core beyond
    /// being threaded into manifest loading; kept here because it's part
    /// of the configuration surface spec §6 enumerates.
    pub traits: HashSet<String>,
}
