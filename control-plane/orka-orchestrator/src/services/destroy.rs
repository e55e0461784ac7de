use super::{delete_server_and_wait, locate_master};
use crate::cloud::CloudSession;
use crate::config::OrchestratorSettings;
use crate::errors::{OrchestratorError, Stage};
use crate::reporter::StatusTracker;
use orka_models::{ClusterRecord, Phase};
use tracing::{error, info, warn};

pub struct ClusterDestroyer<'a> {
    session: &'a dyn CloudSession,
    tracker: &'a StatusTracker,
    settings: &'a OrchestratorSettings,
}

impl<'a> ClusterDestroyer<'a> {
    pub fn new(
        session: &'a dyn CloudSession,
        tracker: &'a StatusTracker,
        settings: &'a OrchestratorSettings,
    ) -> Self {
        Self {
            session,
            tracker,
            settings,
        }
    }

    /// Deletes every server on the master's private network, then the
    /// network, then the floating IP. A failing step does not stop the
    /// following ones; all failures are returned together.
    ///
    /// Without a private network only the master is deleted and the cluster
    /// is reported corrupt.
    pub async fn teardown(
        &self,
        record: &mut ClusterRecord,
        master_ip: &str,
    ) -> Result<(), OrchestratorError> {
        let max_wait = self.settings.wait.max_wait;
        self.tracker
            .progress(record, Phase::Teardown, "Locating cluster resources")
            .await;
        let (floating_ip, master) = locate_master(self.session, master_ip).await?;

        let Some(network_id) = master.private_network().map(str::to_string)
        else {
            warn!(
                cluster_id = record.id,
                master = %master.name,
                "no private network found, deleting master only"
            );
            if let Err(e) =
                delete_server_and_wait(self.session, &master.id, &master.name, max_wait)
                    .await
            {
                error!(cluster_id = record.id, error = %e, "failed to delete master");
            }
            return Err(OrchestratorError::ClusterCorrupt(format!(
                "no private network attached to master {}",
                master.name
            )));
        };

        let mut errors: Vec<OrchestratorError> = Vec::new();
        let members: Vec<_> = match self.session.list_servers().await {
            Ok(servers) => servers
                .into_iter()
                .filter(|s| s.is_attached_to(&network_id))
                .collect(),
            Err(e) => {
                errors.push(OrchestratorError::remote(Stage::Lookup, e));
                vec![master.clone()]
            }
        };

        self.tracker
            .progress(
                record,
                Phase::Teardown,
                format!("Deleting {} virtual machines", members.len()),
            )
            .await;
        for server in &members {
            match delete_server_and_wait(self.session, &server.id, &server.name, max_wait)
                .await
            {
                Ok(()) => info!(cluster_id = record.id, server = %server.name, "server deleted"),
                Err(e) => {
                    warn!(
                        cluster_id = record.id,
                        server = %server.name,
                        error = %e,
                        "server deletion failed"
                    );
                    errors.push(e);
                }
            }
        }

        self.tracker
            .progress(record, Phase::Teardown, "Deleting private network")
            .await;
        if let Err(e) = self.session.delete_network(&network_id).await {
            warn!(
                cluster_id = record.id,
                network = %network_id,
                error = %e,
                "network deletion failed"
            );
            errors.push(OrchestratorError::remote(Stage::NetworkDelete, e));
        }

        self.tracker
            .progress(record, Phase::Teardown, "Releasing floating IP")
            .await;
        if let Err(e) = self.session.delete_floating_ip(&floating_ip.id).await {
            warn!(
                cluster_id = record.id,
                address = %floating_ip.address,
                error = %e,
                "floating IP release failed"
            );
            errors.push(OrchestratorError::remote(Stage::FloatingIpDelete, e));
        }

        if errors.is_empty() {
            return Ok(());
        }
        let all = errors.iter().map(ToString::to_string).collect();
        let first = errors.swap_remove(0);
        Err(OrchestratorError::TeardownIncomplete {
            first: Box::new(first),
            all,
        })
    }
}
