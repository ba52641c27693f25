// checkgraph-providers/src/registry.rs
// ============================================================================
// Module: Provider Registry
// Description: Resolves a step's `type` to a registered `Provider`,
//              enforcing an allow/deny policy.
// Purpose: Host-facing registry: built-ins (`log`, `command`) register by
//          default; a host can add its own providers and restrict which
//          types are reachable from a given run.
// Dependencies: checkgraph-core
// ============================================================================

//! Grounded in the teacher's `decision-gate-providers::registry::ProviderRegistry`:
//! a `BTreeMap<String, Box<dyn _>>` keyed by identifier, wrapped with an
//! allow/deny [`ProviderAccessPolicy`] whose denylist always overrides its
//! allowlist.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use checkgraph_core::interfaces::Provider;
use checkgraph_core::interfaces::ProviderRegistry as ProviderRegistryTrait;

use crate::command::CommandProvider;
use crate::log::LogProvider;

// ============================================================================
// SECTION: Access Policy
// ============================================================================

/// Controls which provider `type` strings a registry will hand out.
///
/// # Invariants
/// - `denylist` overrides `allowlist` when both are present.
/// - If `allowlist` is `None`, every non-denied type is allowed.
#[derive(Debug, Clone, Default)]
pub struct ProviderAccessPolicy {
    /// Optional allowlist of provider type strings.
    pub allowlist: Option<BTreeSet<String>>,
    /// Explicit denylist of provider type strings.
    pub denylist: BTreeSet<String>,
}

impl ProviderAccessPolicy {
    /// Returns a policy that permits every registered type.
    #[must_use]
    pub const fn allow_all() -> Self {
        Self {
            allowlist: None,
            denylist: BTreeSet::new(),
        }
    }

    /// Returns `true` if `provider_type` is allowed by this policy.
    #[must_use]
    pub fn is_allowed(&self, provider_type: &str) -> bool {
        if self.denylist.contains(provider_type) {
            return false;
        }
        self.allowlist.as_ref().is_none_or(|allowlist| allowlist.contains(provider_type))
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// A [`ProviderRegistryTrait`] implementation backed by a `BTreeMap`.
///
/// # Invariants
/// - Provider type strings are unique within the registry.
pub struct CheckgraphProviderRegistry {
    providers: BTreeMap<String, Arc<dyn Provider>>,
    policy: ProviderAccessPolicy,
}

impl CheckgraphProviderRegistry {
    /// Creates an empty registry under `policy`.
    #[must_use]
    pub fn new(policy: ProviderAccessPolicy) -> Self {
        Self {
            providers: BTreeMap::new(),
            policy,
        }
    }

    /// Creates a registry with the built-in `log` and `command` providers
    /// registered, permitting every type.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new(ProviderAccessPolicy::allow_all());
        registry.register("log", LogProvider::new());
        registry.register("command", CommandProvider::new());
        registry
    }

    /// Registers `provider` under `provider_type`, replacing any prior
    /// registration for that type.
    pub fn register(&mut self, provider_type: impl Into<String>, provider: impl Provider + 'static) {
        self.providers.insert(provider_type.into(), Arc::new(provider));
    }
}

impl ProviderRegistryTrait for CheckgraphProviderRegistry {
    fn resolve(&self, provider_type: &str) -> Option<Arc<dyn Provider>> {
        if !self.policy.is_allowed(provider_type) {
            return None;
        }
        self.providers.get(provider_type).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_resolve_by_default() {
        let registry = CheckgraphProviderRegistry::with_builtins();
        assert!(registry.resolve("log").is_some());
        assert!(registry.resolve("command").is_some());
        assert!(registry.resolve("unknown").is_none());
    }

    #[test]
    fn denylist_overrides_registration() {
        let mut policy = ProviderAccessPolicy::allow_all();
        policy.denylist.insert("command".to_string());
        let mut registry = CheckgraphProviderRegistry::new(policy);
        registry.register("command", CommandProvider::new());
        assert!(registry.resolve("command").is_none());
    }

    #[test]
    fn allowlist_excludes_unlisted_types() {
        let policy = ProviderAccessPolicy {
            allowlist: Some(BTreeSet::from(["log".to_string()])),
            denylist: BTreeSet::new(),
        };
        let mut registry = CheckgraphProviderRegistry::new(policy);
        registry.register("log", LogProvider::new());
        registry.register("command", CommandProvider::new());
        assert!(registry.resolve("log").is_some());
        assert!(registry.resolve("command").is_none());
    }
}
