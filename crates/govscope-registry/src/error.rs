use thiserror::Error;

/// Registry access result type
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors surfaced by registry reads and fixture writes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The requested entity does not exist (or no longer exists)
    #[error("Not found: {0}")]
    NotFound(String),

    /// The registry could not serve the read
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    /// A write was refused because it would violate a registry invariant
    #[error("Rejected: {0}")]
    Rejected(String),
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
