//! Link configuration

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::errors::{BlelinkError, Result};
use crate::types::parse_target_uuid;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Target identifiers and driver sizing for a link
///
/// Identifiers are kept as the strings the user typed (full UUID or 16-bit
/// alias) and parsed on demand with [`parse_target_uuid`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Service holding the message characteristic
    #[serde(deserialize_with = "deserialize_target")]
    pub service_uuid: Option<String>,
    /// Characteristic used for writes and notifications
    #[serde(deserialize_with = "deserialize_target")]
    pub characteristic_uuid: Option<String>,
    /// Capacity of the request queue feeding the link task
    pub request_buffer: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            service_uuid: None,
            characteristic_uuid: None,
            request_buffer: 32,
        }
    }
}

impl LinkConfig {
    /// Create a configuration with no targets
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the service identifier
    pub fn with_service_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.service_uuid = Some(uuid.into());
        self
    }

    /// Set the characteristic identifier
    pub fn with_characteristic_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.characteristic_uuid = Some(uuid.into());
        self
    }

    /// Set the request queue capacity
    pub fn with_request_buffer(mut self, size: usize) -> Self {
        self.request_buffer = size;
        self
    }

    /// Parsed `(service, characteristic)` pair, `None` unless both are set
    pub fn targets(&self) -> Result<Option<(Uuid, Uuid)>> {
        match (&self.service_uuid, &self.characteristic_uuid) {
            (Some(service), Some(characteristic)) => Ok(Some((
                parse_target_uuid(service)?,
                parse_target_uuid(characteristic)?,
            ))),
            _ => Ok(None),
        }
    }

    /// Parsed targets, failing when either is missing
    pub fn require_targets(&self) -> Result<(Uuid, Uuid)> {
        self.targets()?.ok_or(BlelinkError::TargetNotConfigured)
    }

    /// Check identifiers parse and sizes are usable
    pub fn validate(&self) -> Result<()> {
        if self.request_buffer == 0 {
            return Err(BlelinkError::Config(
                "request_buffer must be greater than 0".to_string(),
            ));
        }
        if let Some(service) = &self.service_uuid {
            parse_target_uuid(service)?;
        }
        if let Some(characteristic) = &self.characteristic_uuid {
            parse_target_uuid(characteristic)?;
        }
        Ok(())
    }
}

/// Aliases such as `1234` arrive as integers from TOML and environment layers
///
/// An alias such as `1e10` is read as a float by those layers and its digits
/// are gone by the time it reaches us; it must be quoted.
#[derive(Deserialize)]
#[serde(untagged)]
enum TargetText {
    Text(String),
    Number(u64),
    Float(f64),
}

fn deserialize_target<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<TargetText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(TargetText::Text(text)) => Ok(Some(text)),
        Some(TargetText::Number(number)) => Ok(Some(number.to_string())),
        Some(TargetText::Float(number)) => Err(D::Error::custom(format!(
            "identifier {} was read as a number; quote it, e.g. \"1e10\"",
            number
        ))),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
