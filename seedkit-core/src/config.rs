//! Tunables for the identity workflow.
//!
//! Every field has a default, so an empty JSON object (or no config at all) is
//! a valid configuration. Hosts usually only override the KDF cost on low-end
//! devices.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{validation::MIN_WORD_COUNT, SeedKitError};

/// Default settling window before a derivation fires.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 200;

/// Configuration for [`crate::IdentityController`] and [`crate::SeedRefStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Milliseconds of input silence before address derivation runs.
    pub settle_delay_ms: u64,
    /// Phrases with fewer words are reported as short.
    pub min_word_count: usize,
    /// Cost parameters for deriving the PIN key.
    pub kdf: KdfParams,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            min_word_count: MIN_WORD_COUNT,
            kdf: KdfParams::default(),
        }
    }
}

impl FlowConfig {
    /// Parses a configuration from JSON and checks that it is usable.
    ///
    /// # Errors
    ///
    /// Returns [`SeedKitError::InvalidConfig`] if the JSON is malformed or a
    /// value is out of range.
    pub fn from_json(json: &str) -> Result<Self, SeedKitError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| SeedKitError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is within the range the workflow supports.
    ///
    /// # Errors
    ///
    /// Returns [`SeedKitError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<(), SeedKitError> {
        if self.min_word_count == 0 {
            return Err(SeedKitError::InvalidConfig(
                "min_word_count must be at least 1".to_string(),
            ));
        }
        self.kdf.validate()
    }

    /// The settling window as a [`Duration`].
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Argon2id cost parameters used to stretch the user's PIN.
///
/// Defaults follow the OWASP recommendation for Argon2id (19 MiB, 2 passes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfParams {
    /// Memory cost in KiB. Must be at least `8 * parallelism`.
    pub memory_kib: u32,
    /// Number of passes over memory.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Cheapest parameters Argon2 accepts. Only meant for tests.
    #[must_use]
    pub const fn insecure_fast() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }

    /// Checks the parameters against Argon2's limits.
    ///
    /// # Errors
    ///
    /// Returns [`SeedKitError::InvalidConfig`] if any parameter is out of range.
    pub fn validate(&self) -> Result<(), SeedKitError> {
        if self.iterations == 0 || self.parallelism == 0 {
            return Err(SeedKitError::InvalidConfig(
                "kdf iterations and parallelism must be at least 1".to_string(),
            ));
        }
        if self.memory_kib < self.parallelism.saturating_mul(8) {
            return Err(SeedKitError::InvalidConfig(format!(
                "kdf memory_kib must be at least {}",
                self.parallelism.saturating_mul(8)
            )));
        }
        Ok(())
    }
}
