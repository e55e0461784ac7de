mod cli;

use clap::Parser;
use cli::{ClusterArgs, DevCli, DevCommands};
use orka_models::ClusterRequest;
use orka_orchestrator::config::KeyMaterialPaths;
use orka_orchestrator::observability::setup_tracing;
use orka_orchestrator::AppConfig;
use orka_test_utils::sim_cloud::{SIM_IMAGE, SIM_PROJECT, SIM_TOKEN};
use orka_test_utils::{SimCloud, TestHarness};
use tracing::info;

fn request(args: &ClusterArgs) -> anyhow::Result<ClusterRequest> {
    Ok(ClusterRequest {
        name: args.name.clone(),
        cluster_size: args.size,
        master: args.master(),
        slave: args.slave(),
        disk_template: args.disk_template()?,
        os_image: SIM_IMAGE.to_string(),
        project_name: SIM_PROJECT.to_string(),
        token: SIM_TOKEN.to_string(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = DevCli::parse();
    let config = AppConfig::load_from_env()?;
    setup_tracing(&config.observability())?;

    let mut settings = config.orchestrator_settings();
    settings.keys = KeyMaterialPaths { paths: cli.keys };
    let h = TestHarness::with_cloud(SimCloud::new(), settings);
    let orchestrator = &h.orchestrator;

    match cli.command {
        DevCommands::Flavors => {
            let catalogue = orchestrator.available_flavors(SIM_TOKEN).await?;
            println!("{}", serde_json::to_string_pretty(&catalogue)?);
        }
        DevCommands::Create { cluster } => {
            let created = orchestrator.create_cluster(request(&cluster)?).await?;
            println!("{}", serde_json::to_string_pretty(&created)?);
        }
        DevCommands::Lifecycle {
            cluster,
            grow,
            shrink,
            keep,
        } => {
            let created = orchestrator.create_cluster(request(&cluster)?).await?;
            info!(cluster_id = created.cluster_id, name = %created.cluster_name, "created");
            let id = created.cluster_id;
            if grow > 0 {
                let outcome = orchestrator
                    .scale_cluster(SIM_TOKEN, id, grow as i32)
                    .await?;
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            }
            if shrink > 0 {
                let outcome = orchestrator
                    .scale_cluster(SIM_TOKEN, id, -(shrink as i32))
                    .await?;
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            }
            if !keep {
                let outcome = orchestrator.destroy_cluster(SIM_TOKEN, id, None).await?;
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            }
            info!(
                live_servers = h.cloud.live_servers().await.len(),
                events = h.reporter.events().await.len(),
                "lifecycle finished"
            );
        }
    }
    Ok(())
}
