use crate::cluster::ClusterId;
use crate::enums::ClusterStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Orchestration step a progress event belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Admission,
    Network,
    FloatingIp,
    Servers,
    Subnet,
    Ports,
    Handoff,
    Cleanup,
    ScaleUp,
    ScaleDown,
    Rollback,
    Restart,
    Teardown,
    Completed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Admission => "admission",
            Phase::Network => "network",
            Phase::FloatingIp => "floating_ip",
            Phase::Servers => "servers",
            Phase::Subnet => "subnet",
            Phase::Ports => "ports",
            Phase::Handoff => "handoff",
            Phase::Cleanup => "cleanup",
            Phase::ScaleUp => "scale_up",
            Phase::ScaleDown => "scale_down",
            Phase::Rollback => "rollback",
            Phase::Restart => "restart",
            Phase::Teardown => "teardown",
            Phase::Completed => "completed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    pub cluster_id: ClusterId,
    pub phase: Phase,
    pub message: String,
    pub status: Option<ClusterStatus>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(cluster_id: ClusterId, phase: Phase, message: impl Into<String>) -> Self {
        Self {
            cluster_id,
            phase,
            message: message.into(),
            status: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: ClusterStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Returns a copy whose message is cut to `limit` characters, ending in
    /// `..` when shortened.
    pub fn truncated(&self, limit: usize) -> Self {
        let mut out = self.clone();
        out.message = truncate_message(&self.message, limit);
        out
    }
}

pub fn truncate_message(message: &str, limit: usize) -> String {
    if message.chars().count() <= limit {
        return message.to_string();
    }
    let keep = limit.saturating_sub(2);
    let mut out: String = message.chars().take(keep).collect();
    out.push_str("..");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_message_is_untouched() {
        assert_eq!(truncate_message("Creating network", 255), "Creating network");
    }

    #[test]
    fn long_message_is_cut_with_suffix() {
        let msg = "x".repeat(300);
        let cut = truncate_message(&msg, 255);
        assert_eq!(cut.chars().count(), 255);
        assert!(cut.ends_with(".."));
    }

    #[test]
    fn truncated_event_keeps_metadata() {
        let ev = ProgressEvent::new(7, Phase::Servers, "abcdef")
            .with_status(ClusterStatus::Pending);
        let t = ev.truncated(4);
        assert_eq!(t.message, "ab..");
        assert_eq!(t.cluster_id, 7);
        assert_eq!(t.status, Some(ClusterStatus::Pending));
    }
}
