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
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::mode::OperationMode;

/// Decision event emitted after a confirmed mode change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeChangeEvent {
    /// When the change was confirmed
    pub occurred_at: DateTime<Utc>,

    /// Mode the site was running before the change
    pub old_mode: OperationMode,

    /// Mode the site is running now
    pub new_mode: OperationMode,

    /// Justification from the matched decision point
    pub reason: String,

    /// Battery percentage at decision time
    pub battery_pct: f32,
}

impl fmt::Display for ModeChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "At {:.1}%: {} -> {} ({})",
            self.battery_pct, self.old_mode, self.new_mode, self.reason
        )
    }
}
