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

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

/// Default retention window for battery samples (24 hours)
pub const DEFAULT_RETENTION_MINUTES: i64 = 1440;

/// Errors raised by battery history bookkeeping
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HistoryError {
    #[error("sample at {recorded_at} is not after the latest recorded sample at {latest}")]
    OutOfOrderSample {
        latest: DateTime<Utc>,
        recorded_at: DateTime<Utc>,
    },

    #[error("battery percentage {0} is outside the valid range 0-100")]
    PercentageOutOfRange(f32),
}

/// A single state-of-charge reading, immutable once recorded
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatterySample {
    /// When the reading was taken
    pub recorded_at: DateTime<Utc>,

    /// Battery state of charge (0-100%)
    pub percentage: f32,
}

impl BatterySample {
    /// Create a sample, rejecting percentages outside 0-100
    pub fn new(recorded_at: DateTime<Utc>, percentage: f32) -> Result<Self, HistoryError> {
        if !(0.0..=100.0).contains(&percentage) || !percentage.is_finite() {
            return Err(HistoryError::PercentageOutOfRange(percentage));
        }
        Ok(Self {
            recorded_at,
            percentage,
        })
    }
}

/// Time-bounded record of state-of-charge samples (oldest first)
///
/// Timestamps are strictly increasing; samples older than the retention
/// window behind the newest sample are pruned on every append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatteryHistory {
    samples: VecDeque<BatterySample>,

    /// Retention window in minutes
    retention_minutes: i64,
}

impl Default for BatteryHistory {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_MINUTES)
    }
}

impl BatteryHistory {
    /// Create an empty history with the given retention window
    pub fn new(retention_minutes: i64) -> Self {
        Self {
            samples: VecDeque::new(),
            retention_minutes: retention_minutes.max(1),
        }
    }

    /// Append a sample, enforcing strictly increasing timestamps
    ///
    /// Prunes samples that have fallen out of the retention window.
    pub fn append(&mut self, sample: BatterySample) -> Result<(), HistoryError> {
        if let Some(latest) = self.samples.back()
            && sample.recorded_at <= latest.recorded_at
        {
            return Err(HistoryError::OutOfOrderSample {
                latest: latest.recorded_at,
                recorded_at: sample.recorded_at,
            });
        }

        self.samples.push_back(sample);

        let cutoff = sample.recorded_at - Duration::minutes(self.retention_minutes);
        while let Some(front) = self.samples.front() {
            if front.recorded_at < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }

        Ok(())
    }

    /// Instantaneous gradient in %/hour over the trailing `window`
    ///
    /// Uses the earliest and latest sample inside the window, anchored at
    /// the newest sample. Returns `None` when fewer than two samples
    /// qualify; callers must treat that as "gradient condition not
    /// satisfied", never as zero.
    pub fn gradient(&self, window: Duration) -> Option<f32> {
        let last = self.samples.back()?;
        let cutoff = last.recorded_at - window;

        let first = self.samples.iter().find(|s| s.recorded_at >= cutoff)?;
        if first.recorded_at == last.recorded_at {
            return None;
        }

        let hours = (last.recorded_at - first.recorded_at).num_seconds() as f32 / 3600.0;
        Some((last.percentage - first.percentage) / hours)
    }

    /// Linear extrapolation of the state of charge `minutes_ahead` from now
    ///
    /// Clamped to 0-100. Falls back to the current percentage when the
    /// gradient is undefined; returns `None` only for an empty history.
    pub fn extrapolate(&self, minutes_ahead: i64, window: Duration) -> Option<f32> {
        let current = self.samples.back()?.percentage;
        let projected = match self.gradient(window) {
            Some(gradient) => current + gradient * (minutes_ahead as f32 / 60.0),
            None => current,
        };
        Some(projected.clamp(0.0, 100.0))
    }

    /// Most recent sample, if any
    pub fn latest(&self) -> Option<&BatterySample> {
        self.samples.back()
    }

    /// All retained samples, oldest first
    pub fn samples(&self) -> &VecDeque<BatterySample> {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn history_with(samples: &[(i64, f32)]) -> BatteryHistory {
        let mut history = BatteryHistory::default();
        for (minute, pct) in samples {
            history
                .append(BatterySample::new(at(*minute), *pct).unwrap())
                .unwrap();
        }
        history
    }

    #[test]
    fn test_append_rejects_out_of_order() {
        let mut history = history_with(&[(0, 50.0), (30, 52.0)]);

        let stale = BatterySample::new(at(30), 53.0).unwrap();
        assert!(matches!(
            history.append(stale),
            Err(HistoryError::OutOfOrderSample { .. })
        ));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_sample_percentage_range() {
        assert!(BatterySample::new(at(0), -0.1).is_err());
        assert!(BatterySample::new(at(0), 100.1).is_err());
        assert!(BatterySample::new(at(0), 0.0).is_ok());
        assert!(BatterySample::new(at(0), 100.0).is_ok());
    }

    #[test]
    fn test_retention_prunes_old_samples() {
        let mut history = BatteryHistory::new(60);
        for minute in [0, 30, 61, 90] {
            history
                .append(BatterySample::new(at(minute), 50.0).unwrap())
                .unwrap();
        }

        // 90-minute newest sample keeps only samples at >= minute 30
        assert_eq!(history.len(), 3);
        assert_eq!(history.samples().front().unwrap().recorded_at, at(30));
    }

    #[test]
    fn test_gradient_two_sample_window() {
        let history = history_with(&[(0, 80.0), (30, 83.0)]);

        // +3% over 30 minutes = 6%/hr
        let gradient = history.gradient(Duration::minutes(60)).unwrap();
        assert!((gradient - 6.0).abs() < 0.001);
    }

    #[test]
    fn test_gradient_uses_earliest_in_window_only() {
        let history = history_with(&[(0, 10.0), (40, 80.0), (60, 82.0)]);

        // 30-minute window excludes the first two samples' big jump
        let gradient = history.gradient(Duration::minutes(30)).unwrap();
        assert!((gradient - 6.0).abs() < 0.001);
    }

    #[test]
    fn test_gradient_undefined_not_zero() {
        let empty = BatteryHistory::default();
        assert_eq!(empty.gradient(Duration::minutes(60)), None);

        let single = history_with(&[(0, 50.0)]);
        assert_eq!(single.gradient(Duration::minutes(60)), None);

        // Two samples, but only one inside the window
        let sparse = history_with(&[(0, 50.0), (120, 60.0)]);
        assert_eq!(sparse.gradient(Duration::minutes(30)), None);
    }

    #[test]
    fn test_extrapolate_follows_gradient_sign() {
        let rising = history_with(&[(0, 80.0), (30, 83.0)]);
        let falling = history_with(&[(0, 83.0), (30, 80.0)]);
        let window = Duration::minutes(60);

        assert!(rising.extrapolate(30, window).unwrap() > 83.0);
        assert!(falling.extrapolate(30, window).unwrap() < 80.0);
    }

    #[test]
    fn test_extrapolate_clamps_to_valid_range() {
        let rising = history_with(&[(0, 90.0), (30, 99.0)]);
        let falling = history_with(&[(0, 12.0), (30, 3.0)]);
        let window = Duration::minutes(60);

        assert_eq!(rising.extrapolate(120, window).unwrap(), 100.0);
        assert_eq!(falling.extrapolate(120, window).unwrap(), 0.0);
    }

    #[test]
    fn test_extrapolate_without_gradient_returns_current() {
        let single = history_with(&[(0, 42.5)]);
        assert_eq!(
            single.extrapolate(60, Duration::minutes(60)).unwrap(),
            42.5
        );
        assert_eq!(
            BatteryHistory::default().extrapolate(60, Duration::minutes(60)),
            None
        );
    }

    #[test]
    fn test_serde_round_trip_preserves_order() {
        let history = history_with(&[(0, 50.0), (30, 52.0), (60, 55.5)]);

        let json = serde_json::to_string(&history).unwrap();
        let back: BatteryHistory = serde_json::from_str(&json).unwrap();

        assert_eq!(back.len(), 3);
        let samples: Vec<_> = back.samples().iter().copied().collect();
        assert_eq!(samples, history.samples().iter().copied().collect::<Vec<_>>());
    }
}
