//! Engine configuration.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::dst::DstPolicy;
use crate::error::{FreeBusyError, Result};

/// Knobs for a free-busy computation. Every field has a default, so a JSON
/// document only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Zone in which floating times, DATE values and naive query bounds are
    /// interpreted.
    pub floating_timezone: Tz,
    /// Upper bound on recurrence instances produced per component.
    pub max_instances: u16,
    /// How local times inside DST transitions resolve.
    pub dst_policy: DstPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            floating_timezone: Tz::UTC,
            max_instances: 500,
            dst_policy: DstPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| FreeBusyError::InvalidInput(format!("configuration: {e}")))
    }

    #[must_use]
    pub fn with_floating_timezone(mut self, tz: Tz) -> Self {
        self.floating_timezone = tz;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{"floating_timezone":"Europe/Paris"}"#).unwrap();
        assert_eq!(config.floating_timezone, chrono_tz::Europe::Paris);
        assert_eq!(config.max_instances, 500);
        assert_eq!(config.dst_policy, DstPolicy::Earliest);
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        assert!(EngineConfig::from_json(r#"{"floating_timezone":"Mars/Olympus"}"#).is_err());
    }
}
