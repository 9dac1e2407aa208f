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

use thiserror::Error;
use voltion_types::HistoryError;

/// Device client error taxonomy
///
/// Transient failures skip the cycle and are retried naturally at the next
/// scheduled invocation; auth failures additionally raise an operator alert
/// because they need out-of-band re-authentication.
#[derive(Error, Debug, Clone)]
pub enum DeviceError {
    #[error("transient device failure: {0}")]
    Transient(String),

    #[error("device authentication failed: {0}")]
    Auth(String),
}

impl DeviceError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// A failed engine cycle
///
/// Never fatal: the driver logs the failure and invokes the next cycle on
/// schedule.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("device unavailable: {0}")]
    Device(#[from] DeviceError),

    #[error("sample rejected: {0}")]
    History(#[from] HistoryError),

    #[error("failed to persist engine state: {0}")]
    Persistence(#[source] anyhow::Error),
}
