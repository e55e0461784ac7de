use orka_models::ClusterId;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Cluster not found: {0}")]
    NotFound(ClusterId),

    #[error("Item already exists: {0}")]
    AlreadyExists(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
