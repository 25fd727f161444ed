//! Fitness trajectory analysis
//!
//! Samples the trailing daily load series into weekly snapshots and derives
//! trend labels plus phase-readiness flags over a rolling 4-week window.
//! Everything here is recomputed on every run; nothing is mutated in place.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::models::{DailyFitness, WellnessRecord};

/// ---------------------------------------------------------------------------
/// Thresholds
/// ---------------------------------------------------------------------------

/// Mean weekly CTL delta >= this counts as building
const CTL_BUILDING_DELTA: f64 = 3.0;

/// eFTP deltas inside this band count as stable, in W/week
const EFTP_STABLE_BAND: f64 = 1.0;

/// Absolute CTL floors for readiness flags
const BASE_COMPLETE_CTL: f64 = 40.0;
const SPECIALTY_READY_CTL: f64 = 50.0;
const TAPER_READY_CTL: f64 = 60.0;

/// Fraction of weeks with positive CTL delta required for base work
const BASE_CONSISTENCY_FLOOR: f64 = 0.6;

/// eFTP is on track when within this many watts of target
const EFTP_TARGET_BAND: f64 = 5.0;
const EFTP_TARGET_PROGRESS: f64 = 0.9;

/// ---------------------------------------------------------------------------
/// Trend Labels
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
  Building,
  Stable,
  Declining,
}

/// Whether the athlete's recovery can absorb more load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryTrend {
  Sustainable,
  Neutral,
  Unsustainable,
  Unknown,
}

/// ---------------------------------------------------------------------------
/// Trajectory
/// ---------------------------------------------------------------------------

/// One snapshot per 7-day boundary, most recent first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklySnapshot {
  pub date: chrono::NaiveDate,
  pub ctl: Option<f64>,
  pub eftp: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitnessTrajectory {
  /// Up to 4 weekly snapshots, newest first
  pub snapshots: Vec<WeeklySnapshot>,
  /// Week-over-week CTL deltas, newest first
  pub weekly_ctl_deltas: Vec<f64>,
  pub ctl_trend: Trend,
  /// Fraction of sampled weeks with positive CTL delta
  pub consistency: f64,

  pub eftp_trend: Trend,
  /// None when there is no eFTP data or no target to compare against
  pub eftp_on_track: Option<bool>,

  pub recovery_trend: RecoveryTrend,

  pub base_complete: bool,
  pub build_complete: bool,
  pub ready_for_specialty: bool,
  pub ready_for_taper: bool,
}

impl FitnessTrajectory {
  /// Trajectory for an athlete with no usable load history.
  pub fn insufficient() -> Self {
    Self {
      snapshots: Vec::new(),
      weekly_ctl_deltas: Vec::new(),
      ctl_trend: Trend::Stable,
      consistency: 0.0,
      eftp_trend: Trend::Stable,
      eftp_on_track: None,
      recovery_trend: RecoveryTrend::Unknown,
      base_complete: false,
      build_complete: false,
      ready_for_specialty: false,
      ready_for_taper: false,
    }
  }
}

/// ---------------------------------------------------------------------------
/// Analysis
/// ---------------------------------------------------------------------------

/// Analyze the trailing daily series (any order) and wellness window
/// (newest first). `target_eftp` is the athlete's goal threshold, if set.
pub fn analyze(
  series: &[DailyFitness],
  wellness: &[WellnessRecord],
  target_eftp: Option<f64>,
) -> FitnessTrajectory {
  let snapshots = sample_weekly(series);

  if snapshots.len() < 2 {
    let mut trajectory = FitnessTrajectory::insufficient();
    trajectory.snapshots = snapshots;
    trajectory.recovery_trend = recovery_trend(wellness);
    return trajectory;
  }

  // Deltas between adjacent snapshots, newest first
  let weekly_ctl_deltas: Vec<f64> = snapshots
    .windows(2)
    .filter_map(|pair| match (pair[0].ctl, pair[1].ctl) {
      (Some(newer), Some(older)) => Some(newer - older),
      _ => None,
    })
    .collect();

  let ctl_trend = match mean(&weekly_ctl_deltas) {
    Some(m) if m >= CTL_BUILDING_DELTA => Trend::Building,
    Some(m) if m >= 0.0 => Trend::Stable,
    Some(_) => Trend::Declining,
    None => Trend::Stable,
  };

  let consistency = if weekly_ctl_deltas.is_empty() {
    0.0
  } else {
    weekly_ctl_deltas.iter().filter(|d| **d > 0.0).count() as f64
      / weekly_ctl_deltas.len() as f64
  };

  let eftp_deltas: Vec<f64> = snapshots
    .windows(2)
    .filter_map(|pair| match (pair[0].eftp, pair[1].eftp) {
      (Some(newer), Some(older)) => Some(newer - older),
      _ => None,
    })
    .collect();

  // Missing eFTP data degrades to stable, never an error
  let eftp_trend = match mean(&eftp_deltas) {
    Some(m) if m > EFTP_STABLE_BAND => Trend::Building,
    Some(m) if m >= -EFTP_STABLE_BAND => Trend::Stable,
    Some(_) => Trend::Declining,
    None => Trend::Stable,
  };

  let current_eftp = snapshots.first().and_then(|s| s.eftp);
  let eftp_on_track = match (current_eftp, target_eftp) {
    (Some(current), Some(target)) if target > 0.0 => {
      Some(current >= target - EFTP_TARGET_BAND || current / target >= EFTP_TARGET_PROGRESS)
    }
    _ => None,
  };

  let recovery = recovery_trend(wellness);
  let current_ctl = snapshots.first().and_then(|s| s.ctl).unwrap_or(0.0);

  let base_complete = current_ctl >= BASE_COMPLETE_CTL
    && ctl_trend != Trend::Declining
    && consistency >= BASE_CONSISTENCY_FLOOR;

  // Without a target there is nothing to have completed
  let build_complete = eftp_on_track.unwrap_or(false);

  let ready_for_specialty = base_complete
    && current_ctl >= SPECIALTY_READY_CTL
    && recovery == RecoveryTrend::Sustainable;

  let ready_for_taper = build_complete && current_ctl >= TAPER_READY_CTL;

  FitnessTrajectory {
    snapshots,
    weekly_ctl_deltas,
    ctl_trend,
    consistency,
    eftp_trend,
    eftp_on_track,
    recovery_trend: recovery,
    base_complete,
    build_complete,
    ready_for_specialty,
    ready_for_taper,
  }
}

/// Sample one snapshot per 7-day boundary walking back from the newest day.
/// Weeks with no data inside a +/-3 day window around the boundary are
/// skipped rather than fabricated.
fn sample_weekly(series: &[DailyFitness]) -> Vec<WeeklySnapshot> {
  let Some(newest) = series.iter().max_by_key(|d| d.date) else {
    return Vec::new();
  };

  let mut snapshots = Vec::new();

  for week in 0..4 {
    let boundary = newest.date - Duration::days(week * 7);
    let nearest = series
      .iter()
      .filter(|d| (d.date - boundary).num_days().abs() <= 3)
      .filter(|d| d.ctl.is_some() || d.eftp.is_some())
      .min_by_key(|d| (d.date - boundary).num_days().abs());

    if let Some(day) = nearest {
      snapshots.push(WeeklySnapshot {
        date: day.date,
        ctl: day.ctl,
        eftp: day.eftp,
      });
    }
  }

  snapshots
}

/// Recovery sustainability, preferring recovery-score averages and falling
/// back to HRV deviation when no score exists.
fn recovery_trend(wellness: &[WellnessRecord]) -> RecoveryTrend {
  let week: Vec<&WellnessRecord> = wellness.iter().take(7).collect();

  let scores: Vec<f64> = week.iter().filter_map(|r| r.recovery_score).collect();
  if !scores.is_empty() {
    let avg = scores.iter().sum::<f64>() / scores.len() as f64;
    return if avg >= 60.0 {
      RecoveryTrend::Sustainable
    } else if avg < 45.0 {
      RecoveryTrend::Unsustainable
    } else {
      RecoveryTrend::Neutral
    };
  }

  // HRV fallback: recent 3-day average vs the trailing window
  let hrv: Vec<f64> = week.iter().filter_map(|r| r.hrv).collect();
  if hrv.len() >= 4 {
    let recent = hrv[..3].iter().sum::<f64>() / 3.0;
    let baseline = hrv.iter().sum::<f64>() / hrv.len() as f64;
    if baseline > 0.0 {
      let deviation_pct = (recent - baseline) / baseline * 100.0;
      return if deviation_pct >= -5.0 {
        RecoveryTrend::Sustainable
      } else if deviation_pct <= -10.0 {
        RecoveryTrend::Unsustainable
      } else {
        RecoveryTrend::Neutral
      };
    }
  }

  RecoveryTrend::Unknown
}

fn mean(values: &[f64]) -> Option<f64> {
  if values.is_empty() {
    None
  } else {
    Some(values.iter().sum::<f64>() / values.len() as f64)
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
