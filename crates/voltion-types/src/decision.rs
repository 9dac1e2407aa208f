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
use thiserror::Error;

use crate::mode::OperationMode;

/// Minutes in a day; decision windows are non-wrapping within 0-1439
pub const MINUTES_PER_DAY: u16 = 1440;

/// Decision table validation errors (fatal at load time)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("decision point {index} ('{reason}'): window {time_start}-{time_end} is invalid, time_start must be before time_end and both within 0-1439")]
    InvalidWindow {
        index: usize,
        reason: String,
        time_start: u16,
        time_end: u16,
    },

    #[error("decision point {index} ('{reason}'): {field} {value} is outside the valid range 0-100")]
    PercentOutOfRange {
        index: usize,
        reason: String,
        field: &'static str,
        value: String,
    },

    #[error("decision table is empty")]
    Empty,
}

/// A single declarative rule mapping a time window and battery/gradient
/// condition to a target operating mode
///
/// Rules are evaluated in declared order; the first match wins, so
/// operators control precedence purely by ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPoint {
    /// Window start, minutes since local midnight (inclusive)
    pub time_start: u16,

    /// Window end, minutes since local midnight (exclusive, non-wrapping)
    pub time_end: u16,

    /// Battery percentage threshold the directional comparison runs against
    pub pct_thresh: f32,

    /// Optional gradient condition (%/hour), same comparison direction as
    /// `pct_thresh`; an undefined gradient never satisfies it
    #[serde(default)]
    pub pct_gradient_per_hr: Option<f32>,

    /// Comparison direction: true = trigger at or above the threshold,
    /// false = trigger at or below it
    pub iff_higher: bool,

    /// Target operating mode when this rule matches
    pub op_mode: OperationMode,

    /// Backup reserve floor applied together with the mode change
    pub pct_min: f32,

    /// Hold the mode with high-water-mark hysteresis instead of dropping
    /// out the moment the raw percentage dips below the threshold
    #[serde(default)]
    pub trailing_stop: bool,

    /// Operator-facing justification, carried into mode-change events
    pub reason: String,
}

impl DecisionPoint {
    /// Check whether `minute_of_day` falls inside this rule's window
    pub fn window_contains(&self, minute_of_day: u16) -> bool {
        self.time_start <= minute_of_day && minute_of_day < self.time_end
    }

    /// Directional comparison used for both the percentage and gradient
    /// conditions
    pub fn compare(&self, value: f32, threshold: f32) -> bool {
        if self.iff_higher {
            value >= threshold
        } else {
            value <= threshold
        }
    }

    fn validate(&self, index: usize) -> Result<(), TableError> {
        if self.time_start >= self.time_end || self.time_end > MINUTES_PER_DAY - 1 {
            return Err(TableError::InvalidWindow {
                index,
                reason: self.reason.clone(),
                time_start: self.time_start,
                time_end: self.time_end,
            });
        }

        for (field, value) in [("pct_thresh", self.pct_thresh), ("pct_min", self.pct_min)] {
            if !(0.0..=100.0).contains(&value) || !value.is_finite() {
                return Err(TableError::PercentOutOfRange {
                    index,
                    reason: self.reason.clone(),
                    field,
                    value: value.to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Ordered, validated collection of decision points
///
/// Immutable configuration: loaded once at startup, rejected before the
/// engine runs if any rule is malformed. Rule ids are declared indexes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTable {
    points: Vec<DecisionPoint>,
}

impl DecisionTable {
    /// Build a table from rules in declared order, validating every rule
    pub fn new(points: Vec<DecisionPoint>) -> Result<Self, TableError> {
        if points.is_empty() {
            return Err(TableError::Empty);
        }
        for (index, point) in points.iter().enumerate() {
            point.validate(index)?;
        }
        Ok(Self { points })
    }

    /// Rules in declared (priority) order
    pub fn points(&self) -> &[DecisionPoint] {
        &self.points
    }

    /// Look up a rule by its declared index
    pub fn rule(&self, id: usize) -> Option<&DecisionPoint> {
        self.points.get(id)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Currently active mode plus the hysteresis bookkeeping that must survive
/// process restarts
///
/// Mutated exclusively by the engine after a mode change is confirmed by
/// the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionState {
    /// Mode the engine believes the site is running
    pub current_mode: OperationMode,

    /// Declared index of the rule that selected the current mode
    pub active_rule: Option<usize>,

    /// Highest percentage observed since the active trailing-stop rule
    /// took effect; reset to the post-transition percentage on change
    pub high_water_mark_pct: f32,

    /// When the engine last changed the mode
    pub last_transition_at: Option<DateTime<Utc>>,
}

impl Default for DecisionState {
    fn default() -> Self {
        Self {
            current_mode: OperationMode::default(),
            active_rule: None,
            high_water_mark_pct: 0.0,
            last_transition_at: None,
        }
    }
}

impl DecisionState {
    /// Record a confirmed transition into `mode` selected by `rule_id`
    pub fn record_transition(
        &mut self,
        mode: OperationMode,
        rule_id: usize,
        battery_pct: f32,
        at: DateTime<Utc>,
    ) {
        self.current_mode = mode;
        self.active_rule = Some(rule_id);
        self.high_water_mark_pct = battery_pct;
        self.last_transition_at = Some(at);
    }

    /// Raise the high-water-mark if the battery climbed above it
    pub fn observe_percentage(&mut self, battery_pct: f32) {
        if battery_pct > self.high_water_mark_pct {
            self.high_water_mark_pct = battery_pct;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(time_start: u16, time_end: u16) -> DecisionPoint {
        DecisionPoint {
            time_start,
            time_end,
            pct_thresh: 50.0,
            pct_gradient_per_hr: None,
            iff_higher: true,
            op_mode: OperationMode::Backup,
            pct_min: 30.0,
            trailing_stop: false,
            reason: "test rule".to_string(),
        }
    }

    #[test]
    fn test_valid_table_accepted() {
        let table = DecisionTable::new(vec![rule(480, 720), rule(0, 1439)]).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rule(1).unwrap().time_end, 1439);
    }

    #[test]
    fn test_empty_table_rejected() {
        assert_eq!(DecisionTable::new(vec![]), Err(TableError::Empty));
    }

    #[test]
    fn test_inverted_window_rejected() {
        let err = DecisionTable::new(vec![rule(720, 480)]).unwrap_err();
        assert!(matches!(err, TableError::InvalidWindow { index: 0, .. }));
    }

    #[test]
    fn test_wrapping_window_rejected() {
        // Windows may not wrap past midnight
        let err = DecisionTable::new(vec![rule(1380, 1440)]).unwrap_err();
        assert!(matches!(err, TableError::InvalidWindow { .. }));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let mut bad = rule(0, 60);
        bad.pct_thresh = 130.0;
        let err = DecisionTable::new(vec![rule(0, 60), bad]).unwrap_err();
        assert!(matches!(
            err,
            TableError::PercentOutOfRange {
                index: 1,
                field: "pct_thresh",
                ..
            }
        ));
    }

    #[test]
    fn test_window_containment_half_open() {
        let r = rule(480, 720);
        assert!(!r.window_contains(479));
        assert!(r.window_contains(480));
        assert!(r.window_contains(719));
        assert!(!r.window_contains(720));
    }

    #[test]
    fn test_compare_direction() {
        let mut r = rule(0, 60);
        assert!(r.compare(50.0, 50.0));
        assert!(r.compare(51.0, 50.0));
        assert!(!r.compare(49.0, 50.0));

        r.iff_higher = false;
        assert!(r.compare(50.0, 50.0));
        assert!(r.compare(49.0, 50.0));
        assert!(!r.compare(51.0, 50.0));
    }

    #[test]
    fn test_state_transition_resets_high_water_mark() {
        let mut state = DecisionState::default();
        state.observe_percentage(90.0);
        assert_eq!(state.high_water_mark_pct, 90.0);

        state.record_transition(OperationMode::Backup, 2, 75.0, Utc::now());
        assert_eq!(state.current_mode, OperationMode::Backup);
        assert_eq!(state.active_rule, Some(2));
        assert_eq!(state.high_water_mark_pct, 75.0);
        assert!(state.last_transition_at.is_some());

        // Lower observations never lower the mark
        state.observe_percentage(60.0);
        assert_eq!(state.high_water_mark_pct, 75.0);
    }
}
