// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of VoltION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// System-wide operating modes for the battery site
/// This enum defines every mode the decision engine is allowed to select
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
    /// Reserve-biased mode: hold charge for outage protection
    Backup,
    /// Consume stored solar for house load, minimal grid interaction
    #[default]
    SelfConsumption,
    /// Vendor-managed time-based control (tariff aware)
    Autonomous,
    /// Maximum reserve ahead of severe weather
    StormWatch,
}

impl OperationMode {
    /// Get human-readable name for the mode
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Backup => "Backup",
            Self::SelfConsumption => "Self-Consumption",
            Self::Autonomous => "Autonomous",
            Self::StormWatch => "Storm Watch",
        }
    }

    /// Get the wire value the vendor API expects (snake_case)
    pub fn api_value(&self) -> &'static str {
        match self {
            Self::Backup => "backup",
            Self::SelfConsumption => "self_consumption",
            Self::Autonomous => "autonomous",
            Self::StormWatch => "storm_watch",
        }
    }

    /// List all supported operating modes
    pub fn all() -> &'static [OperationMode] {
        &[
            Self::Backup,
            Self::SelfConsumption,
            Self::Autonomous,
            Self::StormWatch,
        ]
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for OperationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "backup" => Ok(Self::Backup),
            "self_consumption" => Ok(Self::SelfConsumption),
            "autonomous" => Ok(Self::Autonomous),
            "storm_watch" => Ok(Self::StormWatch),
            _ => Err(anyhow::anyhow!(
                "Unknown operating mode: '{}'. Supported modes: {}",
                s,
                Self::all()
                    .iter()
                    .map(|m| m.api_value())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_value_round_trip() {
        for mode in OperationMode::all() {
            let parsed: OperationMode = mode.api_value().parse().unwrap();
            assert_eq!(parsed, *mode);
        }
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!("time_based_control".parse::<OperationMode>().is_err());
    }

    #[test]
    fn test_serde_uses_wire_values() {
        let json = serde_json::to_string(&OperationMode::StormWatch).unwrap();
        assert_eq!(json, "\"storm_watch\"");
        let back: OperationMode = serde_json::from_str("\"self_consumption\"").unwrap();
        assert_eq!(back, OperationMode::SelfConsumption);
    }
}
