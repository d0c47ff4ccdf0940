//! Registry error types
//!
//! Error types for viewer registry operations.

use super::producer::ClientId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No viewer with this ID is registered (already stopped or never existed)
    ClientNotFound(ClientId),
    /// The relay task that owns the registry has shut down
    RelayClosed,
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::ClientNotFound(id) => write!(f, "Client not found: {}", id),
            RegistryError::RelayClosed => write!(f, "Relay is not running"),
        }
    }
}

impl std::error::Error for RegistryError {}
