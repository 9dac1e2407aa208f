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

pub mod battery;
pub mod decision;
pub mod event;
pub mod mode;

// Re-export common types for convenience
pub use battery::{BatteryHistory, BatterySample, HistoryError};
pub use decision::{DecisionPoint, DecisionState, DecisionTable, TableError};
pub use event::ModeChangeEvent;
pub use mode::OperationMode;
