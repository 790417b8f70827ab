//! # Protocol Registry
//!
//! Data-driven mapping from mode names to protocols, with explicit
//! fallback lists.
//!
//! ## Resolution
//!
//! Resolving a mode walks, depth-first and in registration order:
//! 1. the mode's own protocol
//! 2. each registered fallback mode (recursively)
//! 3. the registry's generic mode, if one is configured
//!
//! The first candidate whose protocol is loaded wins. Every candidate tried
//! is recorded in the resolution's fallback chain. A mode with no
//! registration is treated as naming a protocol of the same id.
//!
//! The registry is built once with [`RegistryBuilder`] and is immutable
//! afterwards; resolution is a pure lookup.

use crate::primitives::MAX_FALLBACK_DEPTH;
use crate::protocol::Protocol;
use crate::types::validate_name;
use crate::{ModeName, ProtocolId, ProtogateError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// MODE RESOLUTION
// =============================================================================

/// Whether a resolution found a protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionOutcome {
    Resolved,
    Unresolved,
}

/// The result of resolving one mode. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeResolution {
    /// The mode that was requested.
    pub requested: ModeName,
    /// The protocol that was selected, if any.
    pub resolved: Option<ProtocolId>,
    /// Every candidate protocol tried, in order, including the one selected.
    pub chain: Vec<ProtocolId>,
    pub outcome: ResolutionOutcome,
}

impl ModeResolution {
    /// Check if a protocol was selected.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.outcome == ResolutionOutcome::Resolved
    }

    /// A resolution is degraded when the first candidate was not available
    /// and a fallback was used instead.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.is_resolved() && self.chain.len() > 1
    }

    /// Convert an unresolved resolution into `UnresolvedMode`.
    pub fn into_result(self) -> Result<Self, ProtogateError> {
        if self.is_resolved() {
            Ok(self)
        } else {
            Err(ProtogateError::UnresolvedMode {
                mode: self.requested,
                tried: self.chain,
            })
        }
    }
}

// =============================================================================
// REGISTRY BUILDER
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct ModeEntry {
    protocol: ProtocolId,
    fallbacks: Vec<ModeName>,
}

/// Collects registrations during the load phase.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    protocols: BTreeMap<ProtocolId, Protocol>,
    modes: BTreeMap<ModeName, ModeEntry>,
    /// (parent, fallback) edges in registration order.
    fallback_edges: Vec<(ModeName, ModeName)>,
    generic: Option<ModeName>,
}

impl RegistryBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mode mapping to a protocol id.
    ///
    /// With `fallback_of = Some(parent)`, this mode is appended to `parent`'s
    /// fallback list. The parent may be registered before or after.
    pub fn register(
        &mut self,
        mode: impl Into<ModeName>,
        protocol: impl Into<ProtocolId>,
        fallback_of: Option<ModeName>,
    ) -> Result<&mut Self, ProtogateError> {
        let mode = mode.into();
        let protocol = protocol.into();
        validate_name("mode", mode.as_str())?;
        validate_name("protocol", protocol.as_str())?;

        if self.modes.contains_key(&mode) {
            return Err(ProtogateError::InvalidDefinition(format!(
                "mode '{}' registered twice",
                mode
            )));
        }
        if let Some(parent) = fallback_of {
            validate_name("mode", parent.as_str())?;
            if parent == mode {
                return Err(ProtogateError::InvalidDefinition(format!(
                    "mode '{}' cannot be its own fallback",
                    mode
                )));
            }
            self.fallback_edges.push((parent, mode.clone()));
        }

        self.modes.insert(
            mode,
            ModeEntry {
                protocol,
                fallbacks: Vec::new(),
            },
        );
        Ok(self)
    }

    /// Load a protocol definition.
    pub fn load(&mut self, protocol: Protocol) -> Result<&mut Self, ProtogateError> {
        protocol.validate()?;
        if self.protocols.contains_key(protocol.id()) {
            return Err(ProtogateError::InvalidDefinition(format!(
                "protocol '{}' loaded twice",
                protocol.id()
            )));
        }
        self.protocols.insert(protocol.id().clone(), protocol);
        Ok(self)
    }

    /// Name the generic mode tried last for every resolution.
    pub fn generic(&mut self, mode: impl Into<ModeName>) -> &mut Self {
        self.generic = Some(mode.into());
        self
    }

    /// Validate and freeze the registry.
    pub fn build(self) -> Result<ProtocolRegistry, ProtogateError> {
        let mut modes = self.modes;

        for (parent, fallback) in self.fallback_edges {
            let entry = modes.get_mut(&parent).ok_or_else(|| {
                ProtogateError::InvalidDefinition(format!(
                    "mode '{}' is a fallback of unregistered mode '{}'",
                    fallback, parent
                ))
            })?;
            entry.fallbacks.push(fallback);
        }

        if let Some(generic) = &self.generic {
            validate_name("mode", generic.as_str())?;
            let as_protocol = ProtocolId::new(generic.as_str());
            if !modes.contains_key(generic) && !self.protocols.contains_key(&as_protocol) {
                return Err(ProtogateError::InvalidDefinition(format!(
                    "generic mode '{}' is neither registered nor a loaded protocol",
                    generic
                )));
            }
        }

        tracing::debug!(
            protocols = self.protocols.len(),
            modes = modes.len(),
            "protocol registry built"
        );

        Ok(ProtocolRegistry {
            protocols: self.protocols,
            modes,
            generic: self.generic,
        })
    }
}

// =============================================================================
// PROTOCOL REGISTRY
// =============================================================================

/// Immutable mode → protocol registry.
#[derive(Debug, Clone, Default)]
pub struct ProtocolRegistry {
    protocols: BTreeMap<ProtocolId, Protocol>,
    modes: BTreeMap<ModeName, ModeEntry>,
    generic: Option<ModeName>,
}

impl ProtocolRegistry {
    /// Start a new registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Resolve a mode to a protocol.
    ///
    /// Always returns a resolution; check [`ModeResolution::is_resolved`]
    /// or use [`ModeResolution::into_result`].
    #[must_use]
    pub fn resolve(&self, mode: &str) -> ModeResolution {
        let requested = ModeName::new(mode);
        let mut chain = Vec::new();
        let mut visited = BTreeSet::new();

        let mut resolved = self.walk(&requested, 0, &mut chain, &mut visited);
        if resolved.is_none() {
            if let Some(generic) = &self.generic {
                resolved = self.walk(generic, 0, &mut chain, &mut visited);
            }
        }

        let outcome = if resolved.is_some() {
            ResolutionOutcome::Resolved
        } else {
            ResolutionOutcome::Unresolved
        };

        ModeResolution {
            requested,
            resolved,
            chain,
            outcome,
        }
    }

    /// Depth-first walk. `depth` bounds how far fallback lists are
    /// followed; `visited` stops cycles.
    fn walk(
        &self,
        mode: &ModeName,
        depth: usize,
        chain: &mut Vec<ProtocolId>,
        visited: &mut BTreeSet<ModeName>,
    ) -> Option<ProtocolId> {
        if depth >= MAX_FALLBACK_DEPTH || !visited.insert(mode.clone()) {
            return None;
        }

        let Some(entry) = self.modes.get(mode) else {
            let candidate = ProtocolId::new(mode.as_str());
            let found = self.protocols.contains_key(&candidate);
            if !chain.contains(&candidate) {
                chain.push(candidate.clone());
            }
            return found.then_some(candidate);
        };

        if !chain.contains(&entry.protocol) {
            chain.push(entry.protocol.clone());
        }
        if self.protocols.contains_key(&entry.protocol) {
            return Some(entry.protocol.clone());
        }

        entry
            .fallbacks
            .iter()
            .find_map(|fallback| self.walk(fallback, depth + 1, chain, visited))
    }

    /// Look up a loaded protocol.
    #[must_use]
    pub fn protocol(&self, id: &ProtocolId) -> Option<&Protocol> {
        self.protocols.get(id)
    }

    /// Check if a protocol is loaded.
    #[must_use]
    pub fn contains_protocol(&self, id: &ProtocolId) -> bool {
        self.protocols.contains_key(id)
    }

    /// Loaded protocols, ordered by id.
    pub fn protocols(&self) -> impl Iterator<Item = &Protocol> {
        self.protocols.values()
    }

    /// Registered modes with their protocol and fallback modes.
    pub fn modes(&self) -> impl Iterator<Item = (&ModeName, &ProtocolId, &[ModeName])> {
        self.modes
            .iter()
            .map(|(mode, entry)| (mode, &entry.protocol, entry.fallbacks.as_slice()))
    }

    /// The generic mode, if configured.
    #[must_use]
    pub fn generic(&self) -> Option<&ModeName> {
        self.generic.as_ref()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(chain: &[ProtocolId]) -> Vec<&str> {
        chain.iter().map(ProtocolId::as_str).collect()
    }

    fn registry_with(protocols: &[&str]) -> RegistryBuilder {
        let mut builder = ProtocolRegistry::builder();
        for id in protocols {
            builder.load(Protocol::new(*id, "1.0.0")).expect("load");
        }
        builder
    }

    #[test]
    fn direct_resolution_has_single_candidate() {
        let mut builder = registry_with(&["quick-review"]);
        builder.register("quick", "quick-review", None).expect("reg");
        let registry = builder.build().expect("build");

        let resolution = registry.resolve("quick");
        assert!(resolution.is_resolved());
        assert!(!resolution.is_degraded());
        assert_eq!(ids(&resolution.chain), vec!["quick-review"]);
    }

    #[test]
    fn falls_back_to_generic_when_custom_missing() {
        let mut builder = registry_with(&["generic"]);
        builder
            .register("comprehensive", "comprehensive", None)
            .expect("reg")
            .register("generic", "generic", Some(ModeName::new("comprehensive")))
            .expect("reg");
        let registry = builder.build().expect("build");

        let resolution = registry.resolve("comprehensive");
        assert_eq!(resolution.resolved, Some(ProtocolId::new("generic")));
        assert_eq!(ids(&resolution.chain), vec!["comprehensive", "generic"]);
        assert!(resolution.is_degraded());
    }

    #[test]
    fn fallbacks_follow_registration_order() {
        let mut builder = registry_with(&["architecture", "design"]);
        builder
            .register("comprehensive", "comprehensive", None)
            .expect("reg")
            .register("security", "security", Some("comprehensive".into()))
            .expect("reg")
            .register("architecture", "architecture", Some("comprehensive".into()))
            .expect("reg")
            .register("design", "design", Some("comprehensive".into()))
            .expect("reg");
        let registry = builder.build().expect("build");

        let resolution = registry.resolve("comprehensive");
        assert_eq!(resolution.resolved, Some(ProtocolId::new("architecture")));
        assert_eq!(
            ids(&resolution.chain),
            vec!["comprehensive", "security", "architecture"]
        );
    }

    #[test]
    fn generic_mode_is_tried_last() {
        let mut builder = registry_with(&["generic-protocol"]);
        builder
            .register("generic", "generic-protocol", None)
            .expect("reg")
            .register("ui", "ui-review", None)
            .expect("reg")
            .generic("generic");
        let registry = builder.build().expect("build");

        let resolution = registry.resolve("ui");
        assert_eq!(ids(&resolution.chain), vec!["ui-review", "generic-protocol"]);
        assert!(resolution.is_degraded());
    }

    #[test]
    fn unresolved_when_nothing_loaded() {
        let mut builder = registry_with(&[]);
        builder
            .register("comprehensive", "comprehensive", None)
            .expect("reg")
            .register("generic", "generic", Some("comprehensive".into()))
            .expect("reg");
        let registry = builder.build().expect("build");

        let resolution = registry.resolve("comprehensive");
        assert!(!resolution.is_resolved());
        assert_eq!(ids(&resolution.chain), vec!["comprehensive", "generic"]);

        let err = resolution.into_result().expect_err("unresolved");
        assert!(matches!(err, ProtogateError::UnresolvedMode { tried, .. } if tried.len() == 2));
    }

    #[test]
    fn unregistered_mode_names_a_protocol() {
        let registry = registry_with(&["closure"]).build().expect("build");
        assert!(registry.resolve("closure").is_resolved());
        assert!(!registry.resolve("unknown").is_resolved());
    }

    #[test]
    fn fallback_cycles_terminate() {
        let mut builder = registry_with(&[]);
        builder
            .register("a", "pa", Some("b".into()))
            .expect("reg")
            .register("b", "pb", Some("a".into()))
            .expect("reg");
        let registry = builder.build().expect("build");

        let resolution = registry.resolve("a");
        assert!(!resolution.is_resolved());
        assert_eq!(ids(&resolution.chain), vec!["pa", "pb"]);
    }

    #[test]
    fn generic_is_tried_after_wide_fallback_lists() {
        let mut builder = registry_with(&["generic"]);
        builder
            .register("root", "root", None)
            .expect("reg")
            .generic("generic");
        let width = MAX_FALLBACK_DEPTH + 6;
        for i in 0..width {
            builder
                .register(format!("f{}", i), format!("pf{}", i), Some("root".into()))
                .expect("reg");
        }
        let registry = builder.build().expect("build");

        let resolution = registry.resolve("root");
        assert_eq!(resolution.resolved, Some(ProtocolId::new("generic")));
        // root, every fallback, then generic
        assert_eq!(resolution.chain.len(), width + 2);
    }

    #[test]
    fn deep_fallback_chains_stop_at_depth_limit() {
        let mut builder = registry_with(&["generic"]);
        builder.generic("generic");
        for i in 0..=MAX_FALLBACK_DEPTH {
            let parent = (i > 0).then(|| ModeName::new(format!("m{}", i - 1)));
            builder
                .register(format!("m{}", i), format!("p{}", i), parent)
                .expect("reg");
        }
        let registry = builder.build().expect("build");

        let resolution = registry.resolve("m0");
        assert_eq!(resolution.resolved, Some(ProtocolId::new("generic")));
        assert_eq!(resolution.chain.len(), MAX_FALLBACK_DEPTH + 1);
        assert!(!resolution.chain.contains(&ProtocolId::new(format!("p{}", MAX_FALLBACK_DEPTH))));
    }

    #[test]
    fn duplicate_registrations_rejected() {
        let mut builder = registry_with(&["p"]);
        builder.register("m", "p", None).expect("reg");
        assert!(builder.register("m", "p", None).is_err());
        assert!(builder.load(Protocol::new("p", "2")).is_err());
    }

    #[test]
    fn fallback_of_unknown_mode_fails_build() {
        let mut builder = registry_with(&["p"]);
        builder
            .register("m", "p", Some("ghost".into()))
            .expect("reg");
        assert!(matches!(
            builder.build(),
            Err(ProtogateError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn resolution_is_idempotent() {
        let mut builder = registry_with(&["generic"]);
        builder
            .register("comprehensive", "comprehensive", None)
            .expect("reg")
            .generic("generic");
        let registry = builder.build().expect("build");

        assert_eq!(
            registry.resolve("comprehensive"),
            registry.resolve("comprehensive")
        );
    }
}
