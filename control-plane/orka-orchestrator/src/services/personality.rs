use crate::config::KeyMaterialPaths;
use crate::errors::{MissingResource, OrchestratorError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use orka_models::PersonalityFile;

const AUTHORIZED_KEYS_PATH: &str = "/root/.ssh/authorized_keys";
const SSH_CONFIG_PATH: &str = "/root/.ssh/config";

/// Builds the files injected into every VM: the concatenated public keys as
/// root's authorized keys, and an SSH client config that skips host key
/// prompts between cluster nodes.
pub async fn build_personality(
    keys: &KeyMaterialPaths,
) -> Result<Vec<PersonalityFile>, OrchestratorError> {
    if keys.paths.is_empty() {
        return Ok(Vec::new());
    }
    let mut authorized = String::new();
    for path in &keys.paths {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            OrchestratorError::not_found(
                MissingResource::KeyMaterial,
                format!("{}: {e}", path.display()),
            )
        })?;
        authorized.push_str(&contents);
        if !authorized.ends_with('\n') {
            authorized.push('\n');
        }
    }
    Ok(vec![
        PersonalityFile {
            path: AUTHORIZED_KEYS_PATH.to_string(),
            contents: STANDARD.encode(authorized.as_bytes()),
            owner: "root".to_string(),
            group: "root".to_string(),
            mode: 0o600,
        },
        PersonalityFile {
            path: SSH_CONFIG_PATH.to_string(),
            contents: STANDARD.encode(b"StrictHostKeyChecking no"),
            owner: "root".to_string(),
            group: "root".to_string(),
            mode: 0o600,
        },
    ])
}
