use crate::errors::{OrchestratorError, ReporterError};
use async_trait::async_trait;
use chrono::Utc;
use orka_cp_storage::ClusterStore;
use orka_models::{ClusterRecord, ClusterStatus, Phase, ProgressEvent};
use std::sync::Arc;
use tracing::{info, warn};

/// Job-state sink polled by the UI.
#[async_trait]
pub trait StateReporter: Send + Sync {
    async fn publish(&self, event: &ProgressEvent) -> Result<(), ReporterError>;
}

/// Sink that only writes events to the log.
#[derive(Debug, Clone, Default)]
pub struct LogReporter;

#[async_trait]
impl StateReporter for LogReporter {
    async fn publish(&self, event: &ProgressEvent) -> Result<(), ReporterError> {
        match &event.error {
            Some(error) => warn!(
                cluster_id = event.cluster_id,
                phase = %event.phase,
                error = %error,
                "{}", event.message
            ),
            None => info!(
                cluster_id = event.cluster_id,
                phase = %event.phase,
                "{}", event.message
            ),
        }
        Ok(())
    }
}

/// Persists the state narrative of a record and mirrors it to the sink.
#[derive(Clone)]
pub struct StatusTracker {
    store: Arc<dyn ClusterStore>,
    reporter: Arc<dyn StateReporter>,
    truncate_limit: usize,
}

impl StatusTracker {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        reporter: Arc<dyn StateReporter>,
        truncate_limit: usize,
    ) -> Self {
        Self {
            store,
            reporter,
            truncate_limit,
        }
    }

    /// Records an intermediate milestone. Storage and sink failures are
    /// logged and do not interrupt the protocol.
    pub async fn progress(
        &self,
        record: &mut ClusterRecord,
        phase: Phase,
        message: impl Into<String>,
    ) {
        let message = message.into();
        record.state = message.clone();
        record.updated_at = Utc::now();
        if let Err(e) = self.store.update_cluster(record).await {
            warn!(cluster_id = record.id, error = %e, "failed to persist cluster state");
        }
        let event = ProgressEvent::new(record.id, phase, message)
            .with_status(record.status);
        self.emit(&event).await;
    }

    /// Moves the record to `status` and persists it. The store must accept
    /// the write so no record stays `Pending` without a reason.
    pub async fn finish(
        &self,
        record: &mut ClusterRecord,
        phase: Phase,
        status: ClusterStatus,
        message: impl Into<String>,
        error: Option<String>,
    ) -> Result<(), OrchestratorError> {
        let message = message.into();
        record.set_status(status, message.clone());
        if error.is_some() {
            record.error = error.clone();
        }
        self.store.update_cluster(record).await?;
        let mut event =
            ProgressEvent::new(record.id, phase, message).with_status(status);
        if let Some(error) = error {
            event = event.with_error(error);
        }
        self.emit(&event).await;
        Ok(())
    }

    /// Finishes with `status` and the error as narrative, then hands the
    /// error back for propagation.
    pub async fn fail(
        &self,
        record: &mut ClusterRecord,
        phase: Phase,
        status: ClusterStatus,
        error: OrchestratorError,
    ) -> OrchestratorError {
        let msg = error.to_string();
        if let Err(e) = self
            .finish(record, phase, status, msg.clone(), Some(msg))
            .await
        {
            warn!(cluster_id = record.id, error = %e, "failed to record cluster failure");
        }
        error
    }

    async fn emit(&self, event: &ProgressEvent) {
        let event = event.truncated(self.truncate_limit);
        if let Err(e) = self.reporter.publish(&event).await {
            warn!(cluster_id = event.cluster_id, error = %e, "state sink rejected event");
        }
    }
}
