use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One day of modelled training-load state from the fitness service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyFitness {
  pub date: NaiveDate,
  /// Chronic training load (~42-day EWMA of daily stress)
  pub ctl: Option<f64>,
  /// Acute training load (~7-day EWMA)
  pub atl: Option<f64>,
  /// Estimated functional threshold power
  pub eftp: Option<f64>,
}

/// Current training-load snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitnessMetrics {
  pub ctl: Option<f64>,
  pub atl: Option<f64>,
  pub tsb: Option<f64>,
  /// Week-over-week delta of CTL
  pub ramp_rate: Option<f64>,
}

impl FitnessMetrics {
  /// TSB is always derived, never supplied independently.
  pub fn from_parts(ctl: Option<f64>, atl: Option<f64>, ramp_rate: Option<f64>) -> Self {
    let tsb = match (ctl, atl) {
      (Some(c), Some(a)) => Some(c - a),
      _ => None,
    };
    Self { ctl, atl, tsb, ramp_rate }
  }

  /// Build the snapshot from a trailing daily series (newest entry wins).
  /// Ramp rate compares the newest CTL to the CTL seven days earlier.
  pub fn from_series(series: &[DailyFitness]) -> Self {
    let latest = series.iter().max_by_key(|d| d.date);

    let (ctl, atl, ramp) = match latest {
      Some(today) => {
        let week_ago = today.date - chrono::Duration::days(7);
        let prior = series
          .iter()
          .filter(|d| d.date <= week_ago && d.ctl.is_some())
          .max_by_key(|d| d.date);

        let ramp = match (today.ctl, prior.and_then(|p| p.ctl)) {
          (Some(now), Some(then)) => Some(now - then),
          _ => None,
        };

        (today.ctl, today.atl, ramp)
      }
      None => (None, None, None),
    };

    Self::from_parts(ctl, atl, ramp)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn day(date: &str, ctl: f64, atl: f64) -> DailyFitness {
    DailyFitness {
      date: date.parse().unwrap(),
      ctl: Some(ctl),
      atl: Some(atl),
      eftp: None,
    }
  }

  #[test]
  fn test_tsb_is_ctl_minus_atl() {
    let m = FitnessMetrics::from_parts(Some(50.0), Some(70.0), None);
    assert_eq!(m.tsb, Some(-20.0));
  }

  #[test]
  fn test_tsb_absent_when_either_side_missing() {
    let m = FitnessMetrics::from_parts(Some(50.0), None, None);
    assert!(m.tsb.is_none());
  }

  #[test]
  fn test_ramp_rate_from_series() {
    let series = vec![
      day("2024-03-01", 40.0, 45.0),
      day("2024-03-08", 44.0, 50.0),
    ];
    let m = FitnessMetrics::from_series(&series);
    assert_eq!(m.ctl, Some(44.0));
    assert_eq!(m.ramp_rate, Some(4.0));
    assert_eq!(m.tsb, Some(-6.0));
  }

  #[test]
  fn test_empty_series() {
    let m = FitnessMetrics::from_series(&[]);
    assert!(m.ctl.is_none());
    assert!(m.tsb.is_none());
    assert!(m.ramp_rate.is_none());
  }
}
