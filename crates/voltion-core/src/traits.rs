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

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::DeviceError;
use voltion_types::{ModeChangeEvent, OperationMode};

/// Snapshot of the physical system as reported by the vendor API
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceState {
    /// Battery state of charge (0-100%)
    pub battery_pct: f32,

    /// Operating mode the device reports it is running
    pub mode: OperationMode,

    /// When the vendor observed this state
    pub observed_at: DateTime<Utc>,
}

/// Generic device control surface for the battery site
/// The engine uses this trait and never knows about vendor API details
#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// Read the current battery percentage and operating mode
    async fn get_state(&self) -> Result<DeviceState, DeviceError>;

    /// Apply a new operating mode, optionally together with a backup
    /// reserve floor (percent)
    async fn set_mode(
        &self,
        mode: OperationMode,
        reserve_pct: Option<f32>,
    ) -> Result<(), DeviceError>;

    /// Get client name for logging
    fn name(&self) -> &str;
}

/// Outbound alerting sink for decision events
///
/// Failures are logged by the engine and never fed back into its control
/// flow.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Report a confirmed mode change
    async fn notify_mode_change(&self, event: &ModeChangeEvent) -> anyhow::Result<()>;

    /// Report an authentication failure that needs operator action
    async fn notify_auth_failure(&self, detail: &str) -> anyhow::Result<()>;

    /// Get notifier name for logging
    fn name(&self) -> &str;
}
