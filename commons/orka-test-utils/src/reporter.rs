use async_trait::async_trait;
use orka_models::ProgressEvent;
use orka_orchestrator::errors::ReporterError;
use orka_orchestrator::reporter::StateReporter;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// Keeps every published event for later assertions.
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ProgressEvent>>,
    unavailable: AtomicBool,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every following event.
    pub fn go_offline(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().await.clone()
    }

    pub async fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .map(|e| e.message.clone())
            .collect()
    }

    pub async fn last(&self) -> Option<ProgressEvent> {
        self.events.lock().await.last().cloned()
    }
}

#[async_trait]
impl StateReporter for RecordingReporter {
    async fn publish(&self, event: &ProgressEvent) -> Result<(), ReporterError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ReporterError("offline".to_string()));
        }
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
