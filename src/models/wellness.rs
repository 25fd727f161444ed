use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One calendar day of raw physiological data, as fetched from the fitness
/// service (or merged from the wearable feed). Immutable once fetched;
/// re-fetched on every run, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WellnessRecord {
  pub date: NaiveDate,
  pub sleep_hours: Option<f64>,
  /// 1-5, higher is better
  pub sleep_quality: Option<i64>,
  pub resting_hr: Option<i64>,
  /// rMSSD in milliseconds
  pub hrv: Option<f64>,
  /// 0-100 composite recovery score, absent when the wearable has not synced
  pub recovery_score: Option<f64>,
  /// 1-5 subjective scales, lower is better
  pub soreness: Option<i64>,
  pub fatigue: Option<i64>,
  pub stress: Option<i64>,
  pub mood: Option<i64>,
}

impl WellnessRecord {
  pub fn empty(date: NaiveDate) -> Self {
    Self {
      date,
      sleep_hours: None,
      sleep_quality: None,
      resting_hr: None,
      hrv: None,
      recovery_score: None,
      soreness: None,
      fatigue: None,
      stress: None,
      mood: None,
    }
  }

  /// True when any physiological field is populated. A synced day with
  /// zero-hour sleep does not count.
  pub fn has_data(&self) -> bool {
    self.sleep_hours.is_some_and(|h| h > 0.0)
      || self.hrv.is_some()
      || self.recovery_score.is_some()
  }
}

/// Same-day reading from the wearable-recovery service, fresher than the
/// primary fitness-service sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverySample {
  pub date: NaiveDate,
  pub recovery_score: Option<f64>,
  pub hrv: Option<f64>,
  pub resting_hr: Option<i64>,
  pub sleep_hours: Option<f64>,
}
