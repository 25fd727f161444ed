//! Independent training-risk detectors
//!
//! Five stateless detectors, each a pure function of its own trailing data
//! window. None reads another's output; reconciliation happens downstream in
//! the report. Partial or missing weeks are treated as zero activity, never
//! as an error.

use serde::{Deserialize, Serialize};

use crate::models::WellnessRecord;
use crate::wellness::RecoveryStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
  Low,
  Medium,
  High,
  Critical,
}

/// ---------------------------------------------------------------------------
/// Deload Need
/// ---------------------------------------------------------------------------

/// Weeks counted as loaded only when they beat max(target, this floor)
const HIGH_LOAD_TSS_FLOOR: f64 = 100.0;
/// A week under max(0.7 x baseline, this floor) counts as a deload
const DELOAD_TSS_FLOOR: f64 = 70.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeloadAdvisory {
  pub needed: bool,
  pub severity: Option<Severity>,
  /// Consecutive weeks at or above the deload threshold, newest backward
  pub weeks_without_deload: usize,
  pub score: u32,
  pub reasons: Vec<String>,
  pub recommendation: String,
}

/// Score the need for a recovery week from 4 trailing weekly TSS totals
/// (newest first) plus the current load state.
///
/// A week counts as "high load" only when its total exceeds the explicit
/// weekly target (floored at 100 TSS); the earlier average-derived rule is
/// not used. Deloads are weeks under 70% of that baseline.
pub fn deload_need(
  weekly_totals: &[f64],
  target_weekly_tss: Option<f64>,
  ramp_rate: Option<f64>,
  tsb: Option<f64>,
  sleep_debt_hours: f64,
) -> DeloadAdvisory {
  let baseline = target_weekly_tss.unwrap_or(0.0).max(HIGH_LOAD_TSS_FLOOR);
  let deload_threshold = (0.7 * baseline).max(DELOAD_TSS_FLOOR);

  let weeks_without_deload = weekly_totals
    .iter()
    .take_while(|total| **total >= deload_threshold)
    .count();

  let weeks_above_target = weekly_totals
    .iter()
    .take(4)
    .filter(|total| **total > baseline)
    .count();

  let mut score = 0u32;
  let mut reasons = Vec::new();

  if weeks_without_deload >= 4 {
    score += 2;
    reasons.push(format!("{} weeks without a recovery week", weeks_without_deload));
  } else if weeks_without_deload >= 3 {
    score += 1;
    reasons.push(format!("{} weeks without a recovery week", weeks_without_deload));
  }

  if let Some(ramp) = ramp_rate {
    if ramp > 5.0 {
      score += 2;
      reasons.push(format!("Ramp rate {:.1} CTL/week is high", ramp));
    } else if ramp > 3.0 {
      score += 1;
      reasons.push(format!("Ramp rate {:.1} CTL/week is elevated", ramp));
    }
  }

  if let Some(tsb) = tsb {
    if tsb < -30.0 {
      score += 2;
      reasons.push(format!("TSB {:.0} shows deep fatigue", tsb));
    } else if tsb < -20.0 {
      score += 1;
      reasons.push(format!("TSB {:.0} shows accumulated fatigue", tsb));
    }
  }

  if weeks_above_target >= 3 {
    score += 1;
    reasons.push(format!("{} of the last 4 weeks exceeded the weekly target", weeks_above_target));
  }

  if sleep_debt_hours >= 5.0 {
    score += 3;
    reasons.push(format!("{:.1}h sleep debt this week", sleep_debt_hours));
  } else if sleep_debt_hours >= 3.0 {
    score += 2;
    reasons.push(format!("{:.1}h sleep debt this week", sleep_debt_hours));
  } else if sleep_debt_hours >= 1.5 {
    score += 1;
    reasons.push(format!("{:.1}h sleep debt this week", sleep_debt_hours));
  }

  let severity = if score >= 4 {
    Some(Severity::High)
  } else if score >= 2 && weeks_without_deload >= 3 {
    Some(Severity::Medium)
  } else if score >= 1 && weeks_without_deload >= 4 {
    Some(Severity::Low)
  } else {
    None
  };

  let recommendation = match severity {
    Some(Severity::High) => {
      "Schedule a deload week now: cut volume 40-50% and drop structured intensity".to_string()
    }
    Some(_) => "Plan a deload week within the next 7-10 days".to_string(),
    None => "No deload needed yet".to_string(),
  };

  DeloadAdvisory {
    needed: severity.is_some(),
    severity,
    weeks_without_deload,
    score,
    reasons,
    recommendation,
  }
}

/// ---------------------------------------------------------------------------
/// Ramp-Rate Warning
/// ---------------------------------------------------------------------------

const RAMP_CRITICAL_DELTA: f64 = 7.0;
const RAMP_WARNING_DELTA: f64 = 5.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RampRateAdvisory {
  pub detected: bool,
  pub severity: Option<Severity>,
  pub consecutive_critical_weeks: usize,
  pub consecutive_elevated_weeks: usize,
  pub reasons: Vec<String>,
  pub recommendation: String,
}

/// Inspect trailing weekly CTL deltas (newest first) for sustained
/// over-building. This counts its own streaks; it does not share state with
/// the deload detector.
pub fn ramp_rate_warning(weekly_ctl_deltas: &[f64]) -> RampRateAdvisory {
  let consecutive_critical_weeks = weekly_ctl_deltas
    .iter()
    .take_while(|d| **d > RAMP_CRITICAL_DELTA)
    .count();

  let consecutive_elevated_weeks = weekly_ctl_deltas
    .iter()
    .take_while(|d| **d > RAMP_WARNING_DELTA)
    .count();

  let (severity, reasons) = if consecutive_critical_weeks >= 2 {
    (
      Some(Severity::Critical),
      vec![format!(
        "CTL has climbed more than {:.0}/week for {} straight weeks",
        RAMP_CRITICAL_DELTA, consecutive_critical_weeks
      )],
    )
  } else if consecutive_elevated_weeks >= 3 {
    (
      Some(Severity::High),
      vec![format!(
        "CTL has climbed more than {:.0}/week for {} straight weeks",
        RAMP_WARNING_DELTA, consecutive_elevated_weeks
      )],
    )
  } else if consecutive_elevated_weeks >= 2 {
    (
      Some(Severity::Medium),
      vec![format!(
        "CTL has climbed more than {:.0}/week for {} straight weeks",
        RAMP_WARNING_DELTA, consecutive_elevated_weeks
      )],
    )
  } else {
    (None, Vec::new())
  };

  let recommendation = match severity {
    Some(Severity::Critical) => "Cut back immediately: this ramp rate is not sustainable".to_string(),
    Some(_) => "Hold volume flat this week to let the ramp settle".to_string(),
    None => "Ramp rate is within safe bounds".to_string(),
  };

  RampRateAdvisory {
    detected: severity.is_some(),
    severity,
    consecutive_critical_weeks,
    consecutive_elevated_weeks,
    reasons,
    recommendation,
  }
}

/// ---------------------------------------------------------------------------
/// Volume Jump
/// ---------------------------------------------------------------------------

const VOLUME_JUMP_HIGH_PCT: f64 = 30.0;
const VOLUME_JUMP_MEDIUM_PCT: f64 = 20.0;
const VOLUME_JUMP_LOW_PCT: f64 = 15.0;
const VOLUME_DROP_ILLNESS_PCT: f64 = -30.0;
const VOLUME_DROP_PRIOR_FLOOR: f64 = 100.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeJumpAdvisory {
  pub detected: bool,
  pub severity: Option<Severity>,
  /// None when the prior week had no recorded load
  pub percent_change: Option<f64>,
  /// A sharp drop after a loaded week reads as illness, not as volume risk
  pub possible_illness: bool,
  pub reasons: Vec<String>,
  pub recommendation: String,
}

/// Compare the most recently completed calendar week against the one before
/// it. Missing weeks arrive here as 0.0 totals.
pub fn volume_jump(last_week_tss: f64, prior_week_tss: f64) -> VolumeJumpAdvisory {
  let percent_change = if prior_week_tss > 0.0 {
    Some((last_week_tss - prior_week_tss) / prior_week_tss * 100.0)
  } else {
    None
  };

  let mut possible_illness = false;
  let mut reasons = Vec::new();

  let severity = match percent_change {
    Some(pct) if pct > VOLUME_JUMP_HIGH_PCT => {
      reasons.push(format!("Weekly load jumped {:.0}% week-over-week", pct));
      Some(Severity::High)
    }
    Some(pct) if pct > VOLUME_JUMP_MEDIUM_PCT => {
      reasons.push(format!("Weekly load jumped {:.0}% week-over-week", pct));
      Some(Severity::Medium)
    }
    Some(pct) if pct > VOLUME_JUMP_LOW_PCT => {
      reasons.push(format!("Weekly load rose {:.0}% week-over-week", pct));
      Some(Severity::Low)
    }
    Some(pct) if pct < VOLUME_DROP_ILLNESS_PCT && prior_week_tss > VOLUME_DROP_PRIOR_FLOOR => {
      possible_illness = true;
      reasons.push(format!(
        "Weekly load fell {:.0}% after a loaded week; check for illness or interruption",
        pct.abs()
      ));
      None
    }
    _ => None,
  };

  let recommendation = if severity.is_some() {
    "Absorb before adding: repeat this volume rather than increasing again".to_string()
  } else if possible_illness {
    "Confirm the athlete is healthy before resuming planned load".to_string()
  } else {
    "Week-over-week volume change is fine".to_string()
  };

  VolumeJumpAdvisory {
    detected: severity.is_some(),
    severity,
    percent_change,
    possible_illness,
    reasons,
    recommendation,
  }
}

/// ---------------------------------------------------------------------------
/// Illness Pattern
/// ---------------------------------------------------------------------------

const RHR_ELEVATED_BPM: f64 = 5.0;
const RHR_SPIKED_BPM: f64 = 8.0;
const HRV_SUPPRESSED_PCT: f64 = -12.0;
const SLEEP_DISRUPTED_HOURS: f64 = 6.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IllnessAdvisory {
  pub detected: bool,
  pub severity: Option<Severity>,
  pub reasons: Vec<String>,
  pub recommendation: String,
}

/// Look for the classic pre-illness signature: elevated resting heart rate,
/// suppressed HRV, and disrupted sleep, each measured against the athlete's
/// own 7-day baseline. Records are newest first.
pub fn illness_pattern(records: &[WellnessRecord]) -> IllnessAdvisory {
  let Some(today) = records.iter().find(|r| r.has_data()) else {
    return IllnessAdvisory {
      detected: false,
      severity: None,
      reasons: Vec::new(),
      recommendation: "No wellness data to screen".to_string(),
    };
  };

  // Baselines exclude the day being screened
  let baseline: Vec<&WellnessRecord> =
    records.iter().filter(|r| r.date < today.date).take(7).collect();

  let rhr_baseline = mean(baseline.iter().filter_map(|r| r.resting_hr.map(|v| v as f64)));
  let hrv_baseline = mean(baseline.iter().filter_map(|r| r.hrv));
  let sleep_baseline = mean(baseline.iter().filter_map(|r| r.sleep_hours).filter(|h| *h > 0.0));

  let mut score = 0u32;
  let mut reasons = Vec::new();

  if let (Some(rhr), Some(base)) = (today.resting_hr.map(|v| v as f64), rhr_baseline) {
    if rhr >= base + RHR_SPIKED_BPM {
      score += 2;
      reasons.push(format!("Resting HR {:.0} is {:.0} over baseline", rhr, rhr - base));
    } else if rhr >= base + RHR_ELEVATED_BPM {
      score += 1;
      reasons.push(format!("Resting HR {:.0} is {:.0} over baseline", rhr, rhr - base));
    }
  }

  if let (Some(hrv), Some(base)) = (today.hrv, hrv_baseline) {
    if base > 0.0 {
      let deviation_pct = (hrv - base) / base * 100.0;
      if deviation_pct <= HRV_SUPPRESSED_PCT {
        score += 1;
        reasons.push(format!("HRV is {:.0}% below baseline", deviation_pct.abs()));
      }
    }
  }

  if let Some(sleep) = today.sleep_hours.filter(|h| *h > 0.0) {
    let disrupted = sleep < SLEEP_DISRUPTED_HOURS
      && sleep_baseline.is_some_and(|base| base >= SLEEP_DISRUPTED_HOURS + 0.5);
    if disrupted {
      score += 1;
      reasons.push(format!("Sleep fell to {:.1}h against a normal baseline", sleep));
    }
  }

  let severity = if score >= 3 {
    Some(Severity::High)
  } else if score >= 2 {
    Some(Severity::Medium)
  } else {
    None
  };

  let recommendation = match severity {
    Some(Severity::High) => "Rest today: multiple signals point toward illness".to_string(),
    Some(_) => "Keep today easy and re-check tomorrow morning".to_string(),
    None => "No illness pattern detected".to_string(),
  };

  IllnessAdvisory {
    detected: severity.is_some(),
    severity,
    reasons,
    recommendation,
  }
}

/// ---------------------------------------------------------------------------
/// FTP Retest Suggestion
/// ---------------------------------------------------------------------------

const RETEST_INTERVAL_DAYS: i64 = 42;
const RETEST_OVERDUE_DAYS: i64 = 70;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpRetestAdvisory {
  pub suggested: bool,
  pub days_since_test: Option<i64>,
  pub reasons: Vec<String>,
  pub recommendation: String,
}

/// Suggest a threshold retest only when the athlete is due AND fresh enough
/// for the result to mean anything: positive TSB, non-red recovery, and not
/// inside the final taper.
pub fn ftp_retest(
  days_since_test: Option<i64>,
  tsb: Option<f64>,
  recovery: RecoveryStatus,
  weeks_out: Option<i64>,
) -> FtpRetestAdvisory {
  let due = match days_since_test {
    Some(days) => days >= RETEST_INTERVAL_DAYS,
    None => true,
  };

  let fresh = tsb.is_some_and(|t| t > 0.0);
  let recovered = recovery != RecoveryStatus::Red;
  let outside_taper = weeks_out.map_or(true, |w| w > 2 || w < 0);

  let suggested = due && fresh && recovered && outside_taper;

  let mut reasons = Vec::new();
  if suggested {
    match days_since_test {
      Some(days) if days >= RETEST_OVERDUE_DAYS => {
        reasons.push(format!("Last threshold test was {} days ago; zones are likely stale", days))
      }
      Some(days) => reasons.push(format!("Last threshold test was {} days ago", days)),
      None => reasons.push("No threshold test on record".to_string()),
    }
    reasons.push("Form is positive and recovery allows a hard effort".to_string());
  }

  let recommendation = if suggested {
    "Schedule a threshold test in the next few days while form is positive".to_string()
  } else {
    "No retest needed right now".to_string()
  };

  FtpRetestAdvisory {
    suggested,
    days_since_test,
    reasons,
    recommendation,
  }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
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
