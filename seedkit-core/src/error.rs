use thiserror::Error;

use crate::{
    controller::ControllerError, derivation::DerivationError, seed_ref::StorageError,
};

/// Error outputs from `SeedKit`
#[derive(Debug, Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum SeedKitError {
    /// The provided configuration could not be parsed or is out of range
    #[error("invalid_config: {0}")]
    InvalidConfig(String),
    /// Address derivation failed for the presented seed phrase
    #[error(transparent)]
    Derivation(#[from] DerivationError),
    /// Persisting or unlocking an identity failed
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The identity workflow was driven out of order
    #[error(transparent)]
    Controller(#[from] ControllerError),
}
