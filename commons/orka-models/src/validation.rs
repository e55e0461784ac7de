use crate::request::ClusterRequest;
use validator::Validate;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Cluster name cannot contain '/': {0}")]
    InvalidClusterName(String),

    #[error("Cluster size {0} exceeds the supported maximum of {1}")]
    ClusterTooLarge(u32, u32),

    #[error("Owner credential cannot be empty")]
    MissingToken,

    #[error("Validator error: {0}")]
    ValidatorError(#[from] validator::ValidationErrors),
}

/// Slaves get private addresses `192.168.0.2..=254`.
pub const MAX_CLUSTER_SIZE: u32 = 253;

/// Checks a request before it reaches admission control.
pub fn validate_request(request: &ClusterRequest) -> Result<(), ValidationError> {
    request.validate()?;
    if request.name.contains('/') {
        return Err(ValidationError::InvalidClusterName(request.name.clone()));
    }
    if request.cluster_size > MAX_CLUSTER_SIZE {
        return Err(ValidationError::ClusterTooLarge(
            request.cluster_size,
            MAX_CLUSTER_SIZE,
        ));
    }
    if request.token.trim().is_empty() {
        return Err(ValidationError::MissingToken);
    }
    Ok(())
}
