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

//! Power-mode decision engine.
//!
//! One cycle: read the device, append the sample, derive the gradient,
//! evaluate the decision table with trailing-stop hysteresis, apply the
//! mode change when one is due, and persist everything.

use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::{CycleError, DeviceError};
use crate::persistence::{PersistedState, StateStore};
use crate::traits::{DeviceClient, Notifier};
use voltion_types::{
    BatteryHistory, BatterySample, DecisionState, DecisionTable, ModeChangeEvent, OperationMode,
    battery::DEFAULT_RETENTION_MINUTES,
};

/// Engine tuning knobs shared by every rule
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// IANA timezone the decision windows are expressed in
    pub timezone: Tz,

    /// Trailing window used for gradient estimation (minutes)
    pub gradient_window_minutes: i64,

    /// How long battery samples are retained (minutes)
    pub history_retention_minutes: i64,

    /// Trailing-stop drawdown: demotion out of a trailing-stop rule is
    /// only permitted once the percentage falls this far below the
    /// high-water-mark
    pub trailing_stop_drawdown_pct: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            gradient_window_minutes: 45,
            history_retention_minutes: DEFAULT_RETENTION_MINUTES,
            trailing_stop_drawdown_pct: 5.0,
        }
    }
}

/// Inputs to one table evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationInput {
    /// Minutes since local midnight
    pub minute_of_day: u16,

    /// Current battery percentage
    pub battery_pct: f32,

    /// Gradient in %/hour, `None` when undefined
    pub gradient: Option<f32>,
}

/// Result of one engine cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Candidate mode equals the current mode, or no rule matched
    NoChange {
        battery_pct: f32,
        mode: OperationMode,
    },

    /// Mode change confirmed by the device and recorded
    ModeChanged(ModeChangeEvent),

    /// The device rejected the mode command twice; state untouched,
    /// retried at the next scheduled cycle
    CommandFailed {
        attempted: OperationMode,
        battery_pct: f32,
    },
}

/// First decision point whose window, threshold and gradient conditions
/// all hold, in declared order
fn first_match(table: &DecisionTable, input: EvaluationInput) -> Option<usize> {
    table.points().iter().position(|point| {
        if !point.window_contains(input.minute_of_day) {
            return false;
        }
        if !point.compare(input.battery_pct, point.pct_thresh) {
            return false;
        }
        match point.pct_gradient_per_hr {
            // An undefined gradient never satisfies a gradient condition
            Some(threshold) => input
                .gradient
                .is_some_and(|gradient| point.compare(gradient, threshold)),
            None => true,
        }
    })
}

/// Select the candidate rule for this cycle, applying trailing-stop
/// retention on top of the raw first-match scan
///
/// While the active rule carries `trailing_stop`, a demotion is suppressed
/// as long as its window still holds and the percentage has not fallen
/// more than `drawdown` below the high-water-mark; the rule is treated as
/// still matching even though the raw percentage dipped below its
/// threshold. A different-mode rule declared above the active one is never
/// suppressed: declared order stays the sole precedence control.
pub fn select_candidate(
    table: &DecisionTable,
    input: EvaluationInput,
    state: &DecisionState,
    drawdown: f32,
) -> Option<usize> {
    let raw = first_match(table, input);

    if let Some(active_id) = state.active_rule
        && let Some(active) = table.rule(active_id)
        && active.trailing_stop
        && active.op_mode == state.current_mode
    {
        let demoting = raw.is_none_or(|id| {
            id > active_id
                && table
                    .rule(id)
                    .is_none_or(|rule| rule.op_mode != state.current_mode)
        });

        if demoting
            && active.window_contains(input.minute_of_day)
            && input.battery_pct >= state.high_water_mark_pct - drawdown
        {
            debug!(
                "Trailing stop holds rule {}: {:.1}% within {:.1}% of high-water-mark {:.1}%",
                active_id, input.battery_pct, drawdown, state.high_water_mark_pct
            );
            return Some(active_id);
        }
    }

    raw
}

/// The decision engine: owns battery history and decision state, borrows
/// the device, notifier and persistence collaborators
///
/// Cycles take `&mut self`, so a host embedding the engine serializes
/// them by construction; there is no partially-applied mode change.
pub struct DecisionEngine {
    table: DecisionTable,
    config: EngineConfig,
    device: Arc<dyn DeviceClient>,
    notifier: Arc<dyn Notifier>,
    store: StateStore,
    history: BatteryHistory,
    state: DecisionState,
}

impl std::fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionEngine")
            .field("rules", &self.table.len())
            .field("state", &self.state)
            .field("samples", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl DecisionEngine {
    /// Build an engine, restoring persisted history and state
    ///
    /// A corrupt state file is non-fatal: the engine warns and starts
    /// from an empty history and default state.
    pub fn new(
        table: DecisionTable,
        config: EngineConfig,
        device: Arc<dyn DeviceClient>,
        notifier: Arc<dyn Notifier>,
        store: StateStore,
    ) -> Self {
        let (history, state) = match store.load() {
            Ok(Some(persisted)) => (persisted.history, persisted.state),
            Ok(None) => (
                BatteryHistory::new(config.history_retention_minutes),
                DecisionState::default(),
            ),
            Err(error) => {
                warn!(
                    "Persisted engine state unreadable, starting empty: {:#}",
                    error
                );
                (
                    BatteryHistory::new(config.history_retention_minutes),
                    DecisionState::default(),
                )
            }
        };

        info!(
            "Decision engine ready: {} rules, {} retained samples, mode={}, device={}",
            table.len(),
            history.len(),
            state.current_mode,
            device.name()
        );

        Self {
            table,
            config,
            device,
            notifier,
            store,
            history,
            state,
        }
    }

    /// Current decision state
    pub fn state(&self) -> &DecisionState {
        &self.state
    }

    /// Retained battery history
    pub fn history(&self) -> &BatteryHistory {
        &self.history
    }

    /// Run one cycle at the current wall-clock time
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle as of `now`
    ///
    /// Aborts without mutating history or state when the device read
    /// fails; persists history and state on every other path, including
    /// no-ops.
    pub async fn run_cycle_at(&mut self, now: DateTime<Utc>) -> Result<CycleOutcome, CycleError> {
        let device_state = match self.device.get_state().await {
            Ok(state) => state,
            Err(error) => {
                if error.is_auth() {
                    self.alert_auth_failure(&error).await;
                }
                return Err(error.into());
            }
        };

        let sample = BatterySample::new(device_state.observed_at, device_state.battery_pct)?;
        self.history.append(sample)?;

        let gradient = self
            .history
            .gradient(Duration::minutes(self.config.gradient_window_minutes));

        let local = now.with_timezone(&self.config.timezone);
        let minute_of_day = (local.hour() * 60 + local.minute()) as u16;
        let input = EvaluationInput {
            minute_of_day,
            battery_pct: device_state.battery_pct,
            gradient,
        };

        debug!(
            "Evaluating {} rules: minute={}, pct={:.2}%, gradient={:?}",
            self.table.len(),
            minute_of_day,
            device_state.battery_pct,
            gradient
        );

        let candidate = select_candidate(
            &self.table,
            input,
            &self.state,
            self.config.trailing_stop_drawdown_pct,
        );

        // Track the peak while the trailing-stop rule stays in charge
        if let Some(id) = candidate
            && self.state.active_rule == Some(id)
            && self.table.rule(id).is_some_and(|rule| rule.trailing_stop)
        {
            self.state.observe_percentage(device_state.battery_pct);
        }

        let outcome = match candidate {
            None => {
                debug!("No decision point matched, retaining {}", self.state.current_mode);
                CycleOutcome::NoChange {
                    battery_pct: device_state.battery_pct,
                    mode: self.state.current_mode,
                }
            }
            // Candidate ids come from this table's scan, the lookup holds
            Some(rule_id) => match self.table.rule(rule_id).cloned() {
                None => {
                    warn!("Candidate rule {} missing from table, skipping", rule_id);
                    CycleOutcome::NoChange {
                        battery_pct: device_state.battery_pct,
                        mode: self.state.current_mode,
                    }
                }
                Some(rule) if rule.op_mode == self.state.current_mode => {
                    debug!(
                        "Rule {} ('{}') matched, already in {}",
                        rule_id, rule.reason, rule.op_mode
                    );
                    CycleOutcome::NoChange {
                        battery_pct: device_state.battery_pct,
                        mode: self.state.current_mode,
                    }
                }
                Some(rule) => {
                    self.apply_mode_change(rule_id, &rule, device_state.battery_pct, now)
                        .await
                }
            },
        };

        self.store
            .save(&PersistedState {
                history: self.history.clone(),
                state: self.state.clone(),
            })
            .map_err(CycleError::Persistence)?;

        Ok(outcome)
    }

    /// Command the device into a new mode; one immediate retry, state and
    /// event only on confirmed success
    async fn apply_mode_change(
        &mut self,
        rule_id: usize,
        rule: &voltion_types::DecisionPoint,
        battery_pct: f32,
        now: DateTime<Utc>,
    ) -> CycleOutcome {
        let old_mode = self.state.current_mode;
        let reserve = Some(rule.pct_min);

        info!(
            "Rule {} ('{}') matched at {:.2}%: {} -> {} (reserve {:.0}%)",
            rule_id, rule.reason, battery_pct, old_mode, rule.op_mode, rule.pct_min
        );

        let mut result = self.device.set_mode(rule.op_mode, reserve).await;
        if let Err(error) = &result {
            warn!("Mode command failed, retrying once: {}", error);
            result = self.device.set_mode(rule.op_mode, reserve).await;
        }

        match result {
            Ok(()) => {
                self.state
                    .record_transition(rule.op_mode, rule_id, battery_pct, now);

                let event = ModeChangeEvent {
                    occurred_at: now,
                    old_mode,
                    new_mode: rule.op_mode,
                    reason: rule.reason.clone(),
                    battery_pct,
                };

                info!("Mode change confirmed: {}", event);
                if let Err(error) = self.notifier.notify_mode_change(&event).await {
                    warn!("Notifier {} failed: {:#}", self.notifier.name(), error);
                }

                CycleOutcome::ModeChanged(event)
            }
            Err(error) => {
                warn!(
                    "Mode command failed twice, keeping {} until next cycle: {}",
                    old_mode, error
                );
                if error.is_auth() {
                    self.alert_auth_failure(&error).await;
                }
                CycleOutcome::CommandFailed {
                    attempted: rule.op_mode,
                    battery_pct,
                }
            }
        }
    }

    async fn alert_auth_failure(&self, error: &DeviceError) {
        warn!("Device authentication failed: {}", error);
        if let Err(notify_error) = self.notifier.notify_auth_failure(&error.to_string()).await {
            warn!(
                "Notifier {} failed to raise auth alert: {:#}",
                self.notifier.name(),
                notify_error
            );
        }
    }
}
