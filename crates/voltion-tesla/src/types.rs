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

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Envelope every Owner API payload arrives in
#[derive(Debug, Clone, Deserialize)]
pub struct OwnerApiResponse<T> {
    pub response: T,
}

/// Battery product entry from `api/1/products`
#[derive(Debug, Clone, Deserialize)]
pub struct EnergySite {
    pub energy_site_id: u64,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub site_name: Option<String>,
}

/// Grid interaction switches from the site configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteComponents {
    #[serde(default)]
    pub customer_preferred_export_rule: Option<String>,

    #[serde(default)]
    pub disallow_charge_from_grid_with_solar_installed: bool,
}

/// Site configuration from `api/1/energy_sites/{id}/site_info`
#[derive(Debug, Clone, Deserialize)]
pub struct SiteInfo {
    #[serde(default)]
    pub site_name: Option<String>,

    #[serde(default)]
    pub backup_reserve_percent: Option<f32>,

    /// Operating mode the site is configured for (wire value)
    #[serde(default)]
    pub default_real_mode: Option<String>,

    #[serde(default)]
    pub components: SiteComponents,
}

/// Live site status from `api/1/energy_sites/{id}/live_status`
#[derive(Debug, Clone, Deserialize)]
pub struct LiveStatus {
    pub percentage_charged: f32,

    /// Vendor-side observation time
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Acknowledgement body for mode/reserve commands
#[derive(Debug, Clone, Deserialize)]
pub struct CommandResponse {
    #[serde(default)]
    pub message: Option<String>,
}
