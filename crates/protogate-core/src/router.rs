//! # Router
//!
//! Thin routing layer over the [`ProtocolRegistry`].
//!
//! The router never retries and never hides a fallback: a degraded
//! resolution is returned with its full chain and logged as a warning,
//! an unresolved one becomes `UnresolvedMode` for the caller to halt on.

use crate::ProtogateError;
use crate::registry::{ModeResolution, ProtocolRegistry};

/// Routes requested modes through a registry.
#[derive(Debug, Clone, Copy)]
pub struct Router<'a> {
    registry: &'a ProtocolRegistry,
}

impl<'a> Router<'a> {
    #[must_use]
    pub fn new(registry: &'a ProtocolRegistry) -> Self {
        Self { registry }
    }

    /// Resolve a mode, keeping unresolved outcomes as data.
    #[must_use]
    pub fn resolve(&self, mode: &str) -> ModeResolution {
        let resolution = self.registry.resolve(mode);

        match &resolution.resolved {
            Some(protocol) if resolution.is_degraded() => {
                tracing::warn!(
                    mode,
                    protocol = %protocol,
                    candidates = resolution.chain.len(),
                    "degraded resolution: fell back"
                );
            }
            Some(protocol) => {
                tracing::debug!(mode, protocol = %protocol, "mode resolved");
            }
            None => {
                tracing::debug!(mode, candidates = resolution.chain.len(), "mode unresolved");
            }
        }

        resolution
    }

    /// Resolve a mode, failing with `UnresolvedMode` if nothing matched.
    pub fn route(&self, mode: &str) -> Result<ModeResolution, ProtogateError> {
        self.resolve(mode).into_result()
    }
}
