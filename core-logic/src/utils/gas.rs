//! # Core Logic - Gas Configuration
//!
//! Gas policy for the rare on-chain broadcast. This module provides
//! configuration only; the broadcaster does the actual estimation.

use serde::Deserialize;

/// Configuration for gas management
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GasConfig {
    /// Multiplier applied to the node's estimate.
    #[serde(default = "default_estimate_margin")]
    pub estimate_margin: f64,
    /// Gas limit used when estimation fails.
    #[serde(default = "default_fallback_gas_limit")]
    pub fallback_gas_limit: u64,
}

fn default_estimate_margin() -> f64 {
    1.2
}

fn default_fallback_gas_limit() -> u64 {
    300_000
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            estimate_margin: default_estimate_margin(),
            fallback_gas_limit: default_fallback_gas_limit(),
        }
    }
}

impl GasConfig {
    /// Estimate padded by the configured margin, truncated like the node
    /// would truncate a float gas value.
    pub fn padded(&self, estimate: u64) -> u64 {
        (estimate as f64 * self.estimate_margin) as u64
    }
}
