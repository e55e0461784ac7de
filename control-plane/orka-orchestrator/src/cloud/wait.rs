use super::CloudSession;
use crate::errors::{OrchestratorError, Stage};
use orka_models::ResourceStatus;
use std::time::Duration;

fn interpret(
    resource: String,
    stage: Stage,
    from: ResourceStatus,
    expected: ResourceStatus,
    observed: ResourceStatus,
) -> Result<(), OrchestratorError> {
    if observed == expected {
        Ok(())
    } else if observed == from {
        Err(OrchestratorError::TimeoutWaitingForStatus { resource, expected })
    } else {
        Err(OrchestratorError::remote(
            stage,
            format!("{resource} reached {observed}, expected {expected}"),
        ))
    }
}

/// Waits for a server to move from `from` to `expected`. Still being in
/// `from` after the budget is a timeout; any other status is a failure.
pub async fn await_server(
    session: &dyn CloudSession,
    id: &str,
    name: &str,
    from: ResourceStatus,
    expected: ResourceStatus,
    max_wait: Duration,
) -> Result<(), OrchestratorError> {
    let observed = session
        .wait_server(id, from, max_wait)
        .await
        .map_err(|e| OrchestratorError::remote(Stage::ServerWait, e))?;
    interpret(
        format!("server {name}"),
        Stage::ServerWait,
        from,
        expected,
        observed,
    )
}

/// Waits for a deleted server to reach `DELETED`, starting from the status
/// it had when the delete was issued.
pub async fn await_server_deleted(
    session: &dyn CloudSession,
    id: &str,
    name: &str,
    from: ResourceStatus,
    max_wait: Duration,
) -> Result<(), OrchestratorError> {
    let observed = session
        .wait_server(id, from, max_wait)
        .await
        .map_err(|e| OrchestratorError::remote(Stage::ServerDelete, e))?;
    interpret(
        format!("server {name}"),
        Stage::ServerDelete,
        from,
        ResourceStatus::Deleted,
        observed,
    )
}

/// Waits for a port to become active. Ports already active skip the poll.
pub async fn await_port(
    session: &dyn CloudSession,
    id: &str,
    max_wait: Duration,
) -> Result<(), OrchestratorError> {
    let port = session
        .get_port_details(id)
        .await
        .map_err(|e| OrchestratorError::remote(Stage::PortWait, e))?;
    if port.status == ResourceStatus::Active {
        return Ok(());
    }
    let observed = session
        .wait_port(id, port.status, max_wait)
        .await
        .map_err(|e| OrchestratorError::remote(Stage::PortWait, e))?;
    interpret(
        format!("port {id}"),
        Stage::PortWait,
        port.status,
        ResourceStatus::Active,
        observed,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_status_is_timeout() {
        let err = interpret(
            "server a".into(),
            Stage::ServerWait,
            ResourceStatus::Build,
            ResourceStatus::Active,
            ResourceStatus::Build,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::TimeoutWaitingForStatus {
                expected: ResourceStatus::Active,
                ..
            }
        ));
    }

    #[test]
    fn unexpected_terminal_status_is_failure() {
        let err = interpret(
            "server a".into(),
            Stage::ServerWait,
            ResourceStatus::Build,
            ResourceStatus::Active,
            ResourceStatus::Error,
        )
        .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::ServerWait));
        assert!(err.to_string().contains("reached ERROR"));
    }

    #[test]
    fn expected_status_is_ok() {
        assert!(
            interpret(
                "port p".into(),
                Stage::PortWait,
                ResourceStatus::Down,
                ResourceStatus::Active,
                ResourceStatus::Active,
            )
            .is_ok()
        );
    }
}
