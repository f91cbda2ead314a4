// Remote vehicle commands: submit once, then poll the status until the portal
// reports a terminal state. The submit response alone never counts as success.
// The legacy status protocol only knows SUCCESS, so a command that fails
// upstream polls until the caller's timeout or cancellation.

use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::api::resolve_vehicle;
use crate::config::StatusProtocol;
use crate::error::{MoparError, Result};
use crate::models::{CommandOutcome, RemoteCommand};
use crate::session::{Session, document};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

const COMPLETED_STATES: [&str; 2] = ["SUCCESS", "Successful"];
const FAILED_STATES: [&str; 4] = ["FAILED", "Failure", "INACTIVE", "Inactive"];

#[derive(Debug, Clone)]
pub struct PollOptions {
    pub interval: Duration,
    /// Upper bound on the whole polling phase. `None` polls until a terminal state.
    pub timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl PollOptions {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A submitted command, identified the way the status endpoint expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStatus {
    pub service_request_id: String,
    pub vehicle_id: String,
    pub command: RemoteCommand,
}

/// Maps a status string to a terminal outcome under the given protocol.
pub fn terminal_outcome(protocol: StatusProtocol, status: &str) -> Option<CommandOutcome> {
    if COMPLETED_STATES.contains(&status) {
        return Some(CommandOutcome::Completed);
    }
    match protocol {
        StatusProtocol::Current if FAILED_STATES.contains(&status) => Some(CommandOutcome::Failed),
        _ => None,
    }
}

impl Session {
    /// Sends `command` (a wire name such as `"LOCK"`) to `profile.vehicles[index]`.
    ///
    /// Unknown commands are rejected before anything goes over the wire. With
    /// `poll` set, waits for a terminal state; otherwise returns `Submitted`.
    pub async fn remote_command(
        &self,
        command: &str,
        index: usize,
        poll: Option<PollOptions>,
    ) -> Result<CommandOutcome> {
        let command: RemoteCommand = command.parse()?;
        self.send_command(command, index, poll).await
    }

    pub async fn send_command(
        &self,
        command: RemoteCommand,
        index: usize,
        poll: Option<PollOptions>,
    ) -> Result<CommandOutcome> {
        let status = self
            .call_authenticated(move |s| s.with_csrf_token(move |s| submit(s, command, index)))
            .await?;
        tracing::info!(
            %command,
            request_id = %status.service_request_id,
            "Remote command submitted"
        );

        match poll {
            Some(options) => self.await_completion(status, options).await,
            None => Ok(CommandOutcome::Submitted),
        }
    }

    pub async fn lock(&self, index: usize) -> Result<CommandOutcome> {
        self.send_command(RemoteCommand::Lock, index, Some(PollOptions::default()))
            .await
    }

    pub async fn unlock(&self, index: usize) -> Result<CommandOutcome> {
        self.send_command(RemoteCommand::Unlock, index, Some(PollOptions::default()))
            .await
    }

    pub async fn engine_on(&self, index: usize) -> Result<CommandOutcome> {
        self.send_command(RemoteCommand::EngineStart, index, Some(PollOptions::default()))
            .await
    }

    pub async fn engine_off(&self, index: usize) -> Result<CommandOutcome> {
        self.send_command(RemoteCommand::EngineStop, index, Some(PollOptions::default()))
            .await
    }

    pub async fn horn(&self, index: usize) -> Result<CommandOutcome> {
        self.send_command(RemoteCommand::HornLights, index, Some(PollOptions::default()))
            .await
    }

    async fn await_completion(
        &self,
        status: CommandStatus,
        options: PollOptions,
    ) -> Result<CommandOutcome> {
        let polling = self.poll_until_terminal(status, options.interval);
        let bounded = async {
            match options.timeout {
                Some(limit) => tokio::time::timeout(limit, polling)
                    .await
                    .map_err(|_| MoparError::PollTimeout(limit))?,
                None => polling.await,
            }
        };

        tokio::select! {
            biased;
            _ = options.cancel.cancelled() => {
                tracing::info!("Remote command polling cancelled");
                Err(MoparError::Cancelled)
            }
            outcome = bounded => outcome,
        }
    }

    async fn poll_until_terminal(
        &self,
        status: CommandStatus,
        interval: Duration,
    ) -> Result<CommandOutcome> {
        let mut attempt: u32 = 0;
        loop {
            tokio::time::sleep(interval).await;
            attempt += 1;
            tracing::info!(attempt, request_id = %status.service_request_id, "Polling for status");

            let outcome = self
                .call_authenticated(|s| query_status(s, &status))
                .await?;

            if let Some(outcome) = outcome {
                tracing::info!(?outcome, attempts = attempt, "Remote command finished");
                return Ok(outcome);
            }
        }
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn command_url(session: &Session, command: RemoteCommand) -> &str {
    let config = session.config();
    match command {
        RemoteCommand::Lock | RemoteCommand::Unlock => &config.lock_url,
        RemoteCommand::EngineStart | RemoteCommand::EngineStop => &config.engine_url,
        RemoteCommand::HornLights => &config.alarm_url,
    }
}

async fn submit(session: &Session, command: RemoteCommand, index: usize) -> Result<CommandStatus> {
    let vehicle = resolve_vehicle(session, index).await?;
    let kind = session.config().command_identifier;
    let vehicle_id = vehicle.identifier(kind).to_string();

    let body = session
        .post(command_url(session, command))
        .form(&[
            ("pin", session.credentials().pin.as_str()),
            (kind.param(), vehicle_id.as_str()),
            ("action", command.wire_name()),
        ])
        .send()
        .await?
        .text()
        .await?;
    let response = document(&body)?;

    let service_request_id = response
        .get("serviceRequestId")
        .and_then(text)
        .ok_or_else(|| MoparError::Protocol("command response has no serviceRequestId".into()))?;

    Ok(CommandStatus {
        service_request_id,
        vehicle_id,
        command,
    })
}

async fn query_status(session: &Session, status: &CommandStatus) -> Result<Option<CommandOutcome>> {
    let config = session.config();
    let url = match config.status_protocol {
        StatusProtocol::Legacy => command_url(session, status.command),
        StatusProtocol::Current => config.status_url.as_str(),
    };

    let body = session
        .get(url)
        .query(&[
            ("remoteServiceRequestID", status.service_request_id.as_str()),
            (config.command_identifier.param(), status.vehicle_id.as_str()),
        ])
        .send()
        .await?
        .text()
        .await?;
    let response = document(&body)?;

    let state = response
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| MoparError::Protocol("status response has no status field".into()))?;
    tracing::debug!(state, "Remote command status");
    Ok(terminal_outcome(config.status_protocol, state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_protocol_only_terminates_on_success() {
        assert_eq!(terminal_outcome(StatusProtocol::Legacy, "SUCCESS"), Some(CommandOutcome::Completed));
        assert_eq!(terminal_outcome(StatusProtocol::Legacy, "FAILED"), None);
        assert_eq!(terminal_outcome(StatusProtocol::Legacy, "INACTIVE"), None);
        assert_eq!(terminal_outcome(StatusProtocol::Legacy, "PENDING"), None);
    }

    #[test]
    fn current_protocol_reports_failure() {
        assert_eq!(terminal_outcome(StatusProtocol::Current, "Successful"), Some(CommandOutcome::Completed));
        assert_eq!(terminal_outcome(StatusProtocol::Current, "Inactive"), Some(CommandOutcome::Failed));
        assert_eq!(terminal_outcome(StatusProtocol::Current, "FAILED"), Some(CommandOutcome::Failed));
        assert_eq!(terminal_outcome(StatusProtocol::Current, "InProgress"), None);
    }

    #[test]
    fn default_poll_interval_is_three_seconds() {
        let options = PollOptions::default();
        assert_eq!(options.interval, Duration::from_secs(3));
        assert!(options.timeout.is_none());
        assert!(!options.cancel.is_cancelled());
    }
}
