//! Engine configuration
//!
//! Operational knobs only. Consensus limits (script size, op count, stack
//! depth) live in [`crate::constants`]. Settings can be loaded from JSON or
//! environment variables, or built programmatically.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::DEFAULT_SIG_CACHE_SIZE;
use crate::crypto::CryptoAlgorithm;
use crate::error::{Result, ScriptError};

pub const ENV_ALGORITHM: &str = "TOKEN_SCRIPT_ALGORITHM";
pub const ENV_SIG_CACHE_SIZE: &str = "TOKEN_SCRIPT_SIG_CACHE_SIZE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Signature algorithm used by every node of the deployment
    #[serde(default)]
    pub algorithm: CryptoAlgorithm,

    /// Verified signature cache capacity (0 disables the cache)
    #[serde(default = "default_sig_cache_size")]
    pub sig_cache_size: usize,
}

fn default_sig_cache_size() -> usize {
    DEFAULT_SIG_CACHE_SIZE
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { algorithm: CryptoAlgorithm::default(), sig_cache_size: DEFAULT_SIG_CACHE_SIZE }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ScriptError::Config(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ScriptError::Config(e.to_string()))
    }

    /// Defaults overridden by `TOKEN_SCRIPT_*` environment variables.
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = var(ENV_ALGORITHM) {
            match val.parse::<CryptoAlgorithm>() {
                Ok(algorithm) => config.algorithm = algorithm,
                Err(e) => warn!("ignoring {}: {}", ENV_ALGORITHM, e),
            }
        }

        if let Some(val) = var(ENV_SIG_CACHE_SIZE) {
            match val.parse::<usize>() {
                Ok(size) => config.sig_cache_size = size,
                Err(e) => warn!("ignoring {}={}: {}", ENV_SIG_CACHE_SIZE, val, e),
            }
        }

        config
    }
}
