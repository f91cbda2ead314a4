// Data structures exchanged with the portal and returned to callers

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::VehicleIdentifier;
use crate::error::{MoparError, Result};

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub pin: String,
    pub cookie_path: PathBuf,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        pin: impl Into<String>,
        cookie_path: impl AsRef<Path>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            pin: pin.into(),
            cookie_path: cookie_path.as_ref().to_path_buf(),
        }
    }
}

// Never print the password or PIN
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("pin", &"<redacted>")
            .field("cookie_path", &self.cookie_path)
            .finish()
    }
}

/// The slice of a profile vehicle record the client relies on.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Vehicle {
    pub uuid: String,
    pub vin: String,
}

impl Vehicle {
    pub fn identifier(&self, kind: VehicleIdentifier) -> &str {
        match kind {
            VehicleIdentifier::Vin => &self.vin,
            VehicleIdentifier::Uuid => &self.uuid,
        }
    }

    /// Looks up `profile.vehicles[index]`, rejecting out-of-range indices.
    pub fn from_profile(profile: &Value, index: usize) -> Result<Self> {
        let vehicles = vehicles(profile)?;
        let record = vehicles.get(index).ok_or_else(|| {
            MoparError::Validation(format!(
                "vehicle does not exist: index {index}, profile has {}",
                vehicles.len()
            ))
        })?;
        serde_json::from_value(record.clone())
            .map_err(|e| MoparError::Protocol(format!("malformed vehicle record: {e}")))
    }
}

pub(crate) fn vehicles(profile: &Value) -> Result<&Vec<Value>> {
    profile
        .get("vehicles")
        .and_then(Value::as_array)
        .ok_or_else(|| MoparError::Protocol("profile has no vehicles list".into()))
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Summary {
    pub user: UserSummary,
    pub vehicles: Vec<VehicleSummary>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserSummary {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VehicleSummary {
    pub vin: String,
    pub year: String,
    pub make: String,
    pub model: String,
    pub odometer: Value,
}

/// Commands the portal accepts. The wire name is what gets posted as `action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteCommand {
    Lock,
    Unlock,
    EngineStart,
    EngineStop,
    HornLights,
}

impl RemoteCommand {
    pub const ALL: [RemoteCommand; 5] = [
        RemoteCommand::Lock,
        RemoteCommand::Unlock,
        RemoteCommand::EngineStart,
        RemoteCommand::EngineStop,
        RemoteCommand::HornLights,
    ];

    pub fn wire_name(self) -> &'static str {
        match self {
            RemoteCommand::Lock => "LOCK",
            RemoteCommand::Unlock => "UNLOCK",
            RemoteCommand::EngineStart => "START",
            RemoteCommand::EngineStop => "STOP",
            RemoteCommand::HornLights => "HORN_LIGHT",
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for RemoteCommand {
    type Err = MoparError;

    fn from_str(s: &str) -> Result<Self> {
        RemoteCommand::ALL
            .into_iter()
            .find(|command| command.wire_name() == s)
            .ok_or_else(|| MoparError::Validation(format!("unsupported command: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandOutcome {
    /// Sent without waiting for confirmation.
    Submitted,
    Completed,
    Failed,
}
