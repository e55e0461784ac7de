use orka_models::{DiskTemplate, FlavorSpec};

/// Drives cluster orchestrations against an in-process simulated cloud.
#[derive(clap::Parser, Clone, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct DevCli {
    #[command(subcommand)]
    pub command: DevCommands,
    /// Public key files injected as personality. Without any, the
    /// configured key paths are skipped.
    #[arg(long = "key", global = true)]
    pub keys: Vec<std::path::PathBuf>,
}

#[derive(clap::Subcommand, Clone, Debug)]
pub enum DevCommands {
    /// Create a cluster, scale it and tear it down again
    #[clap(aliases = &["run"])]
    Lifecycle {
        #[clap(flatten)]
        cluster: ClusterArgs,
        /// Nodes added after create
        #[arg(long, default_value_t = 1)]
        grow: u32,
        /// Nodes removed after growing
        #[arg(long, default_value_t = 1)]
        shrink: u32,
        /// Leave the cluster running at the end
        #[arg(long)]
        keep: bool,
    },
    /// Create a single cluster and print the result
    Create {
        #[clap(flatten)]
        cluster: ClusterArgs,
    },
    /// List the sizing values the simulated cloud offers
    #[clap(aliases = &["fl"])]
    Flavors,
}

#[derive(clap::Args, Clone, Debug)]
pub struct ClusterArgs {
    #[arg(long, default_value = "dev")]
    pub name: String,
    #[arg(short, long, default_value_t = 3)]
    pub size: u32,
    #[arg(long, default_value_t = 2)]
    pub master_cpus: u32,
    #[arg(long, default_value_t = 2048)]
    pub master_ram_mb: u64,
    #[arg(long, default_value_t = 1)]
    pub slave_cpus: u32,
    #[arg(long, default_value_t = 1024)]
    pub slave_ram_mb: u64,
    #[arg(long, default_value_t = 10)]
    pub disk_gb: u64,
    #[arg(long, default_value = "ext_vlmc")]
    pub disk_template: String,
}

impl ClusterArgs {
    pub fn master(&self) -> FlavorSpec {
        FlavorSpec {
            cpus: self.master_cpus,
            ram_mb: self.master_ram_mb,
            disk_gb: self.disk_gb,
        }
    }

    pub fn slave(&self) -> FlavorSpec {
        FlavorSpec {
            cpus: self.slave_cpus,
            ram_mb: self.slave_ram_mb,
            disk_gb: self.disk_gb,
        }
    }

    pub fn disk_template(&self) -> anyhow::Result<DiskTemplate> {
        match self.disk_template.as_str() {
            "drbd" => Ok(DiskTemplate::Drbd),
            "ext_vlmc" => Ok(DiskTemplate::ExtVlmc),
            other => anyhow::bail!("unknown disk template '{other}'"),
        }
    }
}
