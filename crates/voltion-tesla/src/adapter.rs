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

use crate::client::TeslaClient;
use crate::errors::{TeslaError, TeslaResult};
use async_trait::async_trait;
use chrono::Utc;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use voltion_core::errors::DeviceError;
use voltion_core::traits::{DeviceClient, DeviceState};
use voltion_types::OperationMode;

/// Bridges the Owner API onto the engine's device interface
///
/// Bound to a single energy site; use [`TeslaDeviceAdapter::discover`] to
/// resolve the site id from the account's product list.
#[derive(Debug, Clone)]
pub struct TeslaDeviceAdapter {
    client: Arc<TeslaClient>,
    site_id: u64,
}

impl TeslaDeviceAdapter {
    pub fn new(client: Arc<TeslaClient>, site_id: u64) -> Self {
        Self { client, site_id }
    }

    /// Find the account's battery site and bind to it
    pub async fn discover(client: Arc<TeslaClient>) -> TeslaResult<Self> {
        let site = client.find_battery_site().await?;
        Ok(Self::new(client, site.energy_site_id))
    }

    pub fn site_id(&self) -> u64 {
        self.site_id
    }

    /// Refuse to drive a site whose grid settings would make mode switching
    /// counterproductive (exporting the battery or never charging from grid).
    pub async fn verify_site_config(&self) -> TeslaResult<()> {
        let info = self.client.site_info(self.site_id).await?;
        let components = &info.components;

        if components.customer_preferred_export_rule.as_deref() != Some("battery_ok") {
            return Err(TeslaError::UnsafeSiteConfig(format!(
                "customer_preferred_export_rule is {:?}, expected \"battery_ok\"",
                components.customer_preferred_export_rule
            )));
        }
        if components.disallow_charge_from_grid_with_solar_installed {
            return Err(TeslaError::UnsafeSiteConfig(
                "grid charging is disabled on this site".to_string(),
            ));
        }

        info!(
            "Site {} ({}) passed configuration check",
            self.site_id,
            info.site_name.as_deref().unwrap_or("unnamed")
        );
        Ok(())
    }

    fn map_error(e: TeslaError) -> DeviceError {
        match e {
            TeslaError::AuthenticationFailed => {
                DeviceError::Auth("Owner API rejected the access token".to_string())
            }
            other => DeviceError::Transient(other.to_string()),
        }
    }
}

#[async_trait]
impl DeviceClient for TeslaDeviceAdapter {
    async fn get_state(&self) -> Result<DeviceState, DeviceError> {
        let live = self
            .client
            .live_status(self.site_id)
            .await
            .map_err(Self::map_error)?;
        let info = self
            .client
            .site_info(self.site_id)
            .await
            .map_err(Self::map_error)?;

        if !live.percentage_charged.is_finite() {
            return Err(DeviceError::Transient(format!(
                "implausible battery reading: {}",
                live.percentage_charged
            )));
        }

        // Vendor readings occasionally land a hair outside 0-100
        let battery_pct = live.percentage_charged.clamp(0.0, 100.0);
        if battery_pct != live.percentage_charged {
            warn!(
                "Clamped out-of-range battery reading {:.2}% to {:.2}%",
                live.percentage_charged, battery_pct
            );
        }

        let mode = match info.default_real_mode.as_deref() {
            Some(raw) => OperationMode::from_str(raw).unwrap_or_else(|_| {
                warn!("Unknown operating mode '{}' reported by site", raw);
                OperationMode::SelfConsumption
            }),
            None => {
                warn!("Site did not report an operating mode");
                OperationMode::SelfConsumption
            }
        };

        Ok(DeviceState {
            battery_pct,
            mode,
            observed_at: live.timestamp.unwrap_or_else(Utc::now),
        })
    }

    async fn set_mode(
        &self,
        mode: OperationMode,
        reserve_pct: Option<f32>,
    ) -> Result<(), DeviceError> {
        self.client
            .set_operation_mode(self.site_id, mode)
            .await
            .map_err(Self::map_error)?;

        if let Some(reserve) = reserve_pct {
            self.client
                .set_backup_reserve(self.site_id, reserve)
                .await
                .map_err(Self::map_error)?;
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "tesla-powerwall"
    }
}
