//! Wellness aggregation
//!
//! Collapses a window of raw daily physiological records into one classified
//! summary. The wearable feed, when configured, is merged in first because it
//! syncs earlier in the morning than the fitness service.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{RecoverySample, WellnessRecord};

/// ---------------------------------------------------------------------------
/// Thresholds
/// ---------------------------------------------------------------------------

/// Recovery score >= this is Green
const RECOVERY_GREEN_FLOOR: f64 = 66.0;
/// Recovery score below this is Red
const RECOVERY_RED_CEILING: f64 = 34.0;

/// HRV deviation from 7-day baseline, in percent
const HRV_ABOVE_BASELINE_PCT: f64 = 5.0;
const HRV_BELOW_BASELINE_PCT: f64 = -10.0;

/// Sleep-hour buckets
const SLEEP_EXCELLENT_HOURS: f64 = 8.0;
const SLEEP_ADEQUATE_HOURS: f64 = 7.0;
const SLEEP_POOR_HOURS: f64 = 6.0;

/// Nightly sleep target used for debt accounting
const SLEEP_TARGET_HOURS: f64 = 8.0;

/// ---------------------------------------------------------------------------
/// Classified Statuses
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
  Green,
  Yellow,
  Red,
  Unknown,
}

impl RecoveryStatus {
  /// Multiplicative fatigue discount for consumers that want a continuous
  /// signal rather than a discrete status.
  pub fn intensity_modifier(&self) -> f64 {
    match self {
      Self::Green => 1.0,
      Self::Yellow => 0.85,
      Self::Red => 0.6,
      Self::Unknown => 0.9,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepStatus {
  Excellent,
  Adequate,
  Poor,
  Insufficient,
  Unknown,
}

/// ---------------------------------------------------------------------------
/// Wellness Summary
/// ---------------------------------------------------------------------------

/// One classified snapshot of the athlete's physiological state, derived from
/// the most recent record with any populated field plus 7-day averages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WellnessSummary {
  pub recovery_status: RecoveryStatus,
  pub sleep_status: SleepStatus,
  /// Fatigue discount in [0,1]; 1.0 = no discount
  pub intensity_modifier: f64,

  /// Date of the record the point-in-time fields came from. May be earlier
  /// than today when the wearable has not synced yet.
  pub source_date: Option<NaiveDate>,

  pub recovery_score: Option<f64>,
  pub hrv: Option<f64>,
  pub resting_hr: Option<i64>,
  pub sleep_hours: Option<f64>,

  // 7-day averages over populated values only
  pub hrv_avg_7d: Option<f64>,
  pub resting_hr_avg_7d: Option<f64>,
  pub sleep_avg_7d: Option<f64>,
  pub recovery_avg_7d: Option<f64>,

  /// Cumulative shortfall vs the nightly sleep target over the last 7 days
  pub sleep_debt_hours: f64,
}

impl WellnessSummary {
  /// Neutral summary for when no physiological data exists at all.
  pub fn unknown() -> Self {
    Self {
      recovery_status: RecoveryStatus::Unknown,
      sleep_status: SleepStatus::Unknown,
      intensity_modifier: RecoveryStatus::Unknown.intensity_modifier(),
      source_date: None,
      recovery_score: None,
      hrv: None,
      resting_hr: None,
      sleep_hours: None,
      hrv_avg_7d: None,
      resting_hr_avg_7d: None,
      sleep_avg_7d: None,
      recovery_avg_7d: None,
      sleep_debt_hours: 0.0,
    }
  }
}

/// ---------------------------------------------------------------------------
/// Aggregation
/// ---------------------------------------------------------------------------

/// Merge the wearable sample into its matching day, then summarize.
///
/// `records` must be ordered newest first. Today's record being empty is
/// normal (the fitness service syncs wellness late); the summary falls back
/// to the latest record that has any data rather than reporting "no data".
pub fn summarize(records: &[WellnessRecord], wearable: Option<&RecoverySample>) -> WellnessSummary {
  let merged = merge_wearable(records, wearable);

  let latest = merged.iter().find(|r| r.has_data());

  let week: Vec<&WellnessRecord> = merged.iter().take(7).collect();
  let hrv_avg_7d = average(week.iter().filter_map(|r| r.hrv));
  let resting_hr_avg_7d = average(week.iter().filter_map(|r| r.resting_hr.map(|v| v as f64)));
  let sleep_avg_7d = average(week.iter().filter_map(|r| r.sleep_hours).filter(|h| *h > 0.0));
  let recovery_avg_7d = average(week.iter().filter_map(|r| r.recovery_score));

  let sleep_debt_hours = week
    .iter()
    .filter_map(|r| r.sleep_hours)
    .filter(|h| *h > 0.0)
    .map(|h| (SLEEP_TARGET_HOURS - h).max(0.0))
    .sum();

  let Some(latest) = latest else {
    let mut summary = WellnessSummary::unknown();
    summary.sleep_debt_hours = sleep_debt_hours;
    return summary;
  };

  let recovery_status = classify_recovery(latest.recovery_score, latest.hrv, hrv_avg_7d);
  let sleep_status = classify_sleep(latest.sleep_hours);

  WellnessSummary {
    recovery_status,
    sleep_status,
    intensity_modifier: recovery_status.intensity_modifier(),
    source_date: Some(latest.date),
    recovery_score: latest.recovery_score,
    hrv: latest.hrv,
    resting_hr: latest.resting_hr,
    sleep_hours: latest.sleep_hours,
    hrv_avg_7d,
    resting_hr_avg_7d,
    sleep_avg_7d,
    recovery_avg_7d,
    sleep_debt_hours,
  }
}

/// Overlay the wearable reading onto the record for its day. Wearable fields
/// win; the record keeps anything the wearable does not provide.
fn merge_wearable(
  records: &[WellnessRecord],
  wearable: Option<&RecoverySample>,
) -> Vec<WellnessRecord> {
  let mut merged: Vec<WellnessRecord> = records.to_vec();

  let Some(sample) = wearable else {
    return merged;
  };

  match merged.iter_mut().find(|r| r.date == sample.date) {
    Some(day) => {
      if sample.recovery_score.is_some() {
        day.recovery_score = sample.recovery_score;
      }
      if sample.hrv.is_some() {
        day.hrv = sample.hrv;
      }
      if sample.resting_hr.is_some() {
        day.resting_hr = sample.resting_hr;
      }
      if sample.sleep_hours.is_some() {
        day.sleep_hours = sample.sleep_hours;
      }
    }
    None => {
      let mut day = WellnessRecord::empty(sample.date);
      day.recovery_score = sample.recovery_score;
      day.hrv = sample.hrv;
      day.resting_hr = sample.resting_hr;
      day.sleep_hours = sample.sleep_hours;
      // Keep newest-first ordering
      let pos = merged.iter().position(|r| r.date < day.date).unwrap_or(merged.len());
      merged.insert(pos, day);
    }
  }

  merged
}

/// Classification priority: direct recovery score, then HRV deviation from
/// baseline, then Unknown.
fn classify_recovery(
  recovery_score: Option<f64>,
  hrv: Option<f64>,
  hrv_avg_7d: Option<f64>,
) -> RecoveryStatus {
  if let Some(score) = recovery_score {
    return if score >= RECOVERY_GREEN_FLOOR {
      RecoveryStatus::Green
    } else if score < RECOVERY_RED_CEILING {
      RecoveryStatus::Red
    } else {
      RecoveryStatus::Yellow
    };
  }

  if let (Some(hrv), Some(baseline)) = (hrv, hrv_avg_7d) {
    if baseline > 0.0 {
      let deviation_pct = (hrv - baseline) / baseline * 100.0;
      return if deviation_pct >= HRV_ABOVE_BASELINE_PCT {
        RecoveryStatus::Green
      } else if deviation_pct <= HRV_BELOW_BASELINE_PCT {
        RecoveryStatus::Red
      } else {
        RecoveryStatus::Yellow
      };
    }
  }

  RecoveryStatus::Unknown
}

fn classify_sleep(sleep_hours: Option<f64>) -> SleepStatus {
  match sleep_hours {
    Some(h) if h >= SLEEP_EXCELLENT_HOURS => SleepStatus::Excellent,
    Some(h) if h >= SLEEP_ADEQUATE_HOURS => SleepStatus::Adequate,
    Some(h) if h >= SLEEP_POOR_HOURS => SleepStatus::Poor,
    Some(h) if h > 0.0 => SleepStatus::Insufficient,
    _ => SleepStatus::Unknown,
  }
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
  let collected: Vec<f64> = values.collect();
  if collected.is_empty() {
    None
  } else {
    Some(collected.iter().sum::<f64>() / collected.len() as f64)
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
