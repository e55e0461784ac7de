use anyhow::Result;
use envconfig::Envconfig;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Private subnet every cluster network receives.
pub const CLUSTER_SUBNET_CIDR: &str = "192.168.0.0/24";
pub const PRIVATE_ADDRESS_PREFIX: &str = "192.168.0.";

#[derive(Debug, Clone, Envconfig)]
pub struct AppConfig {
    // Remote polling
    #[envconfig(from = "ORKA_MAX_WAIT_SECS", default = "300")]
    pub max_wait_secs: u64,

    // Networking
    #[envconfig(from = "ORKA_SCALE_PORT_BASE", default = "9998")]
    pub scale_port_base: u16,

    #[envconfig(
        from = "ORKA_FLOATING_NETWORK_NAME",
        default = "Public IPv4 Network"
    )]
    pub floating_network_name: String,

    // Key material injected into every VM
    #[envconfig(from = "ORKA_SSH_PUBLIC_KEY_PATH", default = "~/.ssh/id_rsa.pub")]
    pub ssh_public_key_path: String,

    #[envconfig(from = "ORKA_EXTRA_SSH_KEY_PATH")]
    pub extra_ssh_key_path: Option<String>,

    // State reporting
    #[envconfig(from = "ORKA_STATE_TRUNCATE_LIMIT", default = "255")]
    pub state_truncate_limit: usize,

    #[envconfig(from = "ORKA_TIMESTAMP_CLUSTER_NAMES", default = "true")]
    pub timestamp_cluster_names: bool,

    // Observability
    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,

    #[envconfig(from = "LOG_FORMAT", default = "plain")]
    pub log_format: String,
}

impl AppConfig {
    /// Load configuration from environment variables only
    pub fn load_from_env() -> Result<Self> {
        Ok(Self::init_from_env()?)
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        if self.max_wait_secs == 0 {
            warn!("ORKA_MAX_WAIT_SECS is 0; every remote wait will time out");
        }
        WaitPolicy {
            max_wait: Duration::from_secs(self.max_wait_secs),
        }
    }

    pub fn network_policy(&self) -> NetworkPolicy {
        NetworkPolicy {
            floating_network_name: self.floating_network_name.clone(),
            scale_port_base: self.scale_port_base,
        }
    }

    pub fn key_material_paths(&self) -> KeyMaterialPaths {
        let mut paths = vec![expand_home(&self.ssh_public_key_path)];
        if let Some(extra) = self
            .extra_ssh_key_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
        {
            paths.push(expand_home(extra));
        }
        KeyMaterialPaths { paths }
    }

    pub fn observability(&self) -> ObservabilityConfig {
        let json = match self.log_format.to_lowercase().as_str() {
            "json" => true,
            "plain" | "text" => false,
            other => {
                warn!(
                    "Unrecognized log format '{}', falling back to 'plain'.",
                    other
                );
                false
            }
        };
        ObservabilityConfig {
            service_name: "orka-orchestrator".to_string(),
            log_level: self.log_level.clone(),
            json_format: json,
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            wait: self.wait_policy(),
            network: self.network_policy(),
            keys: self.key_material_paths(),
            state_truncate_limit: self.state_truncate_limit,
            timestamp_cluster_names: self.timestamp_cluster_names,
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => match env::var("HOME") {
            Ok(home) => PathBuf::from(home).join(rest),
            Err(_) => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    pub max_wait: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NetworkPolicy {
    pub floating_network_name: String,
    pub scale_port_base: u16,
}

impl NetworkPolicy {
    /// Private address of the node with the given ordinal.
    pub fn private_ip(&self, ordinal: u32) -> String {
        format!("{}{}", PRIVATE_ADDRESS_PREFIX, ordinal + 1)
    }

    /// SSH port on the master forwarded to the node with this ordinal.
    pub fn forwarded_port(&self, ordinal: u32) -> u32 {
        self.scale_port_base as u32 + ordinal
    }
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self {
            floating_network_name: "Public IPv4 Network".to_string(),
            scale_port_base: 9998,
        }
    }
}

/// Public key files concatenated into the authorized keys personality.
/// An empty list injects no personality.
#[derive(Debug, Clone, Default)]
pub struct KeyMaterialPaths {
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub service_name: String,
    pub log_level: String,
    pub json_format: bool,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub wait: WaitPolicy,
    pub network: NetworkPolicy,
    pub keys: KeyMaterialPaths,
    pub state_truncate_limit: usize,
    pub timestamp_cluster_names: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            wait: WaitPolicy::default(),
            network: NetworkPolicy::default(),
            keys: KeyMaterialPaths::default(),
            state_truncate_limit: 255,
            timestamp_cluster_names: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: [&str; 6] = [
        "ORKA_MAX_WAIT_SECS",
        "ORKA_SCALE_PORT_BASE",
        "ORKA_SSH_PUBLIC_KEY_PATH",
        "ORKA_EXTRA_SSH_KEY_PATH",
        "ORKA_TIMESTAMP_CLUSTER_NAMES",
        "LOG_FORMAT",
    ];

    fn clear() {
        for key in KEYS {
            unsafe { env::remove_var(key) };
        }
    }

    #[test]
    #[serial]
    fn defaults_apply_without_env() {
        clear();
        let cfg = AppConfig::load_from_env().unwrap();
        assert_eq!(cfg.wait_policy().max_wait, Duration::from_secs(300));
        assert_eq!(cfg.network_policy().forwarded_port(2), 10000);
        assert_eq!(cfg.state_truncate_limit, 255);
        assert!(cfg.timestamp_cluster_names);
        assert!(!cfg.observability().json_format);
        assert_eq!(cfg.key_material_paths().paths.len(), 1);
    }

    #[test]
    #[serial]
    fn env_overrides_are_reflected_in_settings() {
        clear();
        unsafe {
            env::set_var("ORKA_MAX_WAIT_SECS", "30");
            env::set_var("ORKA_SCALE_PORT_BASE", "20000");
            env::set_var("ORKA_SSH_PUBLIC_KEY_PATH", "/etc/orka/id.pub");
            env::set_var("ORKA_EXTRA_SSH_KEY_PATH", "/etc/orka/extra.pub");
            env::set_var("ORKA_TIMESTAMP_CLUSTER_NAMES", "false");
            env::set_var("LOG_FORMAT", "JSON");
        }
        let settings = AppConfig::load_from_env().unwrap().orchestrator_settings();
        assert_eq!(settings.wait.max_wait, Duration::from_secs(30));
        assert_eq!(settings.network.forwarded_port(3), 20003);
        assert_eq!(
            settings.keys.paths,
            vec![
                PathBuf::from("/etc/orka/id.pub"),
                PathBuf::from("/etc/orka/extra.pub")
            ]
        );
        assert!(!settings.timestamp_cluster_names);
        let cfg = AppConfig::load_from_env().unwrap();
        assert!(cfg.observability().json_format);
        clear();
    }

    #[test]
    fn private_addresses_follow_ordinals() {
        let policy = NetworkPolicy::default();
        assert_eq!(policy.private_ip(1), "192.168.0.2");
        assert_eq!(policy.private_ip(3), "192.168.0.4");
    }
}
