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

use anyhow::{Context, Result, bail};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};
use voltion_core::EngineConfig;
use voltion_types::decision::{DecisionPoint, DecisionTable};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Device connection settings
    pub device: DeviceSettings,

    /// Engine tuning settings
    #[serde(default)]
    pub engine: EngineSettings,

    /// Ordered decision rule table
    #[serde(rename = "decision_point")]
    pub decision_points: Vec<DecisionPoint>,

    /// Email notification settings (log-only when absent)
    #[serde(default)]
    pub notifications: Option<EmailSettings>,

    /// System settings
    #[serde(default)]
    pub system: SystemSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSettings {
    /// Energy site id; discovered from the account when not set
    #[serde(default)]
    pub site_id: Option<u64>,

    /// Environment variable holding the Owner API access token
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// IANA timezone the decision windows are expressed in
    pub timezone: String,

    /// Trailing window for gradient estimation (minutes)
    pub gradient_window_minutes: i64,

    /// How long battery samples are retained (minutes)
    pub history_retention_minutes: i64,

    /// Trailing-stop drawdown below the high-water-mark (percent)
    pub trailing_stop_drawdown_pct: f32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let defaults = EngineConfig::default();
        Self {
            timezone: "UTC".to_string(),
            gradient_window_minutes: defaults.gradient_window_minutes,
            history_retention_minutes: defaults.history_retention_minutes,
            trailing_stop_drawdown_pct: defaults.trailing_stop_drawdown_pct,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailSettings {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_address: String,
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
    pub admin_recipients: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SystemSettings {
    /// Seconds between engine cycles
    pub poll_interval_secs: u64,

    /// Where engine state is persisted between runs
    pub state_path: String,

    /// Consecutive failed cycles before a loud warning
    pub failure_warning_threshold: u32,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 300,
            state_path: voltion_core::persistence::DEFAULT_STATE_PATH.to_string(),
            failure_warning_threshold: 3,
        }
    }
}

fn default_token_env() -> String {
    "TESLA_ACCESS_TOKEN".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_use_tls() -> bool {
    true
}

impl AppConfig {
    /// Load and validate configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(Path::new(path))
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: Self =
            toml::from_str(&content).with_context(|| "Failed to parse config TOML")?;
        config.validate()?;
        info!(
            "Loaded configuration from {}: {} decision points",
            path,
            config.decision_points.len()
        );
        Ok(config)
    }

    /// Validate configuration; a malformed decision table is fatal
    pub fn validate(&self) -> Result<()> {
        self.build_table()?;
        self.timezone()?;

        if self.device.token_env.is_empty() {
            bail!("device.token_env must name an environment variable");
        }
        if self.system.poll_interval_secs < 10 {
            bail!("system.poll_interval_secs must be at least 10 seconds");
        }
        if self.system.poll_interval_secs > 3600 {
            warn!(
                "system.poll_interval_secs is very high ({}s), consider reducing",
                self.system.poll_interval_secs
            );
        }
        if self.engine.gradient_window_minutes <= 0 {
            bail!("engine.gradient_window_minutes must be positive");
        }
        if self.engine.history_retention_minutes <= 0 {
            bail!("engine.history_retention_minutes must be positive");
        }
        if self.engine.trailing_stop_drawdown_pct < 0.0
            || self.engine.trailing_stop_drawdown_pct > 100.0
        {
            bail!("engine.trailing_stop_drawdown_pct must be between 0 and 100");
        }

        if let Some(email) = &self.notifications {
            if email.smtp_host.is_empty() {
                bail!("notifications.smtp_host must be set");
            }
            if email.admin_recipients.is_empty() {
                bail!("notifications.admin_recipients must contain at least one address");
            }
        }

        Ok(())
    }

    /// Build the validated decision table
    pub fn build_table(&self) -> Result<DecisionTable> {
        DecisionTable::new(self.decision_points.clone())
            .context("Invalid [[decision_point]] table")
    }

    /// Parse the configured timezone
    pub fn timezone(&self) -> Result<Tz> {
        self.engine
            .timezone
            .parse::<Tz>()
            .map_err(|_| anyhow::anyhow!("Unknown timezone: {}", self.engine.timezone))
    }

    /// Convert the engine section to the engine's config type
    pub fn engine_config(&self) -> Result<EngineConfig> {
        Ok(EngineConfig {
            timezone: self.timezone()?,
            gradient_window_minutes: self.engine.gradient_window_minutes,
            history_retention_minutes: self.engine.history_retention_minutes,
            trailing_stop_drawdown_pct: self.engine.trailing_stop_drawdown_pct,
        })
    }
}
