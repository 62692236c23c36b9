//! Hub wire schema.
//!
//! Payloads are UTF-8 JSON with PascalCase field names; the names are the
//! interoperability contract with the hub's device registry and command
//! dispatcher and must not change.
//!
//! Inbound bytes are decoded into a [`RemoteCommand`] exactly once, here.
//! Nothing past this module sees an untyped payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::config::DeviceProfile;
use crate::error::CommandError;

/// The one remote command the device advertises.
pub const LEVEL_COMMAND_NAME: &str = "LevelCommand";
/// Its single string parameter.
pub const LEVEL_PARAM_NAME: &str = "Level";

// ───────────────────────────────────────────────────────────────
// Telemetry
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    #[serde(rename = "DeviceId")]
    pub device_id: String,
    #[serde(rename = "Weight")]
    pub weight: f64,
    /// Sampling time; local only, not part of the wire record.
    #[serde(skip)]
    pub timestamp_ms: u64,
}

impl TelemetryRecord {
    pub fn new(device_id: &str, weight: f64, timestamp_ms: u64) -> Self {
        Self {
            device_id: device_id.to_string(),
            weight,
            timestamp_ms,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Device descriptor
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceProperties {
    #[serde(rename = "DeviceID")]
    pub device_id: String,
    pub hub_enabled_state: bool,
    pub created_time: Option<String>,
    pub device_state: String,
    pub updated_time: Option<String>,
    pub manufacturer: String,
    pub model_number: String,
    pub serial_number: String,
    pub firmware_version: String,
    pub platform: String,
    pub processor: String,
    #[serde(rename = "InstalledRAM")]
    pub installed_ram: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommandParameterSpec {
    pub name: String,
    #[serde(rename = "Type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommandSpec {
    pub name: String,
    pub parameters: Vec<CommandParameterSpec>,
}

/// Static identity and capability record, sent once per connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceDescriptor {
    pub device_properties: DeviceProperties,
    pub commands: Vec<CommandSpec>,
    pub is_simulated_device: bool,
    pub version: String,
    pub object_type: String,
}

impl DeviceDescriptor {
    pub fn new(device_id: &str, profile: &DeviceProfile) -> Self {
        let level_command = CommandSpec {
            name: LEVEL_COMMAND_NAME.into(),
            parameters: vec![CommandParameterSpec {
                name: LEVEL_PARAM_NAME.into(),
                kind: "String".into(),
            }],
        };

        Self {
            device_properties: DeviceProperties {
                device_id: device_id.to_string(),
                hub_enabled_state: true,
                created_time: None,
                device_state: "normal".into(),
                updated_time: None,
                manufacturer: profile.manufacturer.clone(),
                model_number: profile.model_number.clone(),
                serial_number: profile.serial_number.clone(),
                firmware_version: profile.firmware_version.clone(),
                platform: profile.platform.clone(),
                processor: profile.processor.clone(),
                installed_ram: profile.installed_ram.clone(),
                latitude: profile.latitude,
                longitude: profile.longitude,
            },
            commands: vec![level_command],
            is_simulated_device: profile.simulated,
            version: "1.0".into(),
            object_type: "DeviceInfo".into(),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Inbound command
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCommand {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(
        rename = "Parameters",
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub parameters: BTreeMap<String, String>,
}

fn null_as_empty<'de, D>(de: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, String>>::deserialize(de)?.unwrap_or_default())
}

impl RemoteCommand {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parameters: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_parameter(mut self, key: &str, value: &str) -> Self {
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// Decode one inbound payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, CommandError> {
        let text = core::str::from_utf8(bytes).map_err(|_| CommandError::InvalidUtf8)?;
        serde_json::from_str(text).map_err(|e| match e.classify() {
            serde_json::error::Category::Data => CommandError::InvalidShape,
            _ => CommandError::InvalidJson,
        })
    }
}

/// Serialise any outbound record to its wire bytes.
pub fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(record)
}
