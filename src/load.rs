//! Weekly load targeting
//!
//! Maps {current CTL, phase, weeks to goal} to a recommended weekly and
//! daily training-stress range. The deterministic table is always computed;
//! the advisor may refine the range but a rejected response costs nothing.

use serde::{Deserialize, Serialize};

use crate::advisor::{request, resolve, Advisor};
use crate::phase::Phase;

/// ---------------------------------------------------------------------------
/// Ramp Bands
/// ---------------------------------------------------------------------------

const RAMP_MAINTAIN_MAX: f64 = 3.0;
const RAMP_BUILD_MAX: f64 = 5.0;
const RAMP_AGGRESSIVE_MAX: f64 = 7.0;

/// CTL gain caps for the fallback target
const MAX_CTL_GAIN: f64 = 40.0;
const MAX_CTL_GAIN_FRACTION: f64 = 0.25;
const CTL_GAIN_PER_WEEK: f64 = 5.0;
const MIN_CTL_GAIN_LONG_HORIZON: f64 = 10.0;

/// Reduction multipliers
const TAPER_REDUCTION: f64 = 0.5;
const RECOVER_REDUCTION: f64 = 0.6;

/// TSB below this forces the Recover override regardless of phase
const RECOVER_TSB_FLOOR: f64 = -25.0;

const WEEKLY_RANGE_SPREAD: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadLabel {
  Maintain,
  Build,
  Aggressive,
  Caution,
  Recover,
}

/// ---------------------------------------------------------------------------
/// Load Targets
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadTargets {
  pub current_ctl: f64,
  pub target_ctl: f64,
  /// CTL per week needed to reach the target in time
  pub required_ramp: f64,
  pub label: LoadLabel,
  pub weekly_tss_low: f64,
  pub weekly_tss_high: f64,
  pub daily_tss_low: f64,
  pub daily_tss_high: f64,
  pub warning: Option<String>,
  pub reasoning: Vec<String>,
  pub ai_enhanced: bool,
}

/// Shape the advisor must return to refine the weekly range.
#[derive(Debug, Clone, Deserialize)]
pub struct LoadAdvice {
  pub weekly_tss_low: f64,
  pub weekly_tss_high: f64,
  pub reasoning: String,
}

/// ---------------------------------------------------------------------------
/// Deterministic Table
/// ---------------------------------------------------------------------------

/// Pure fallback: always computed, used whenever the advisor is missing or
/// returns an unusable range.
pub fn fallback_targets(
  ctl: Option<f64>,
  tsb: Option<f64>,
  weeks_out: Option<i64>,
  phase: Phase,
) -> LoadTargets {
  let current = ctl.unwrap_or(0.0).max(0.0);
  let mut reasoning = Vec::new();

  let (target_ctl, required_ramp) = match weeks_out {
    Some(weeks) if weeks > 0 => {
      let gain = (weeks as f64 * CTL_GAIN_PER_WEEK)
        .min(MAX_CTL_GAIN)
        .min(current * MAX_CTL_GAIN_FRACTION);
      let mut target = current + gain;
      if weeks > 3 {
        target = target.max(current + MIN_CTL_GAIN_LONG_HORIZON);
      }
      let ramp = (target - current) / (weeks - 2).max(1) as f64;
      reasoning.push(format!(
        "Target CTL {:.0} in {} weeks needs {:.1}/week",
        target, weeks, ramp
      ));
      (target, ramp)
    }
    // No goal on the calendar (or it has passed): hold fitness steady
    _ => {
      reasoning.push("No upcoming goal; hold current load".to_string());
      (current, 0.0)
    }
  };

  let (mut label, mut warning) = if required_ramp <= RAMP_MAINTAIN_MAX {
    (LoadLabel::Maintain, None)
  } else if required_ramp <= RAMP_BUILD_MAX {
    (LoadLabel::Build, None)
  } else if required_ramp <= RAMP_AGGRESSIVE_MAX {
    (
      LoadLabel::Aggressive,
      Some("Required ramp is aggressive; watch recovery closely".to_string()),
    )
  } else {
    (
      LoadLabel::Caution,
      Some("Required ramp exceeds safe build rates; the goal timeline is tight".to_string()),
    )
  };

  // Sustained-CTL approximation: a steady week costs ~7x CTL in stress
  let mut weekly_mid = (current + required_ramp) * 7.0;

  if matches!(phase, Phase::Taper | Phase::RaceWeek) {
    weekly_mid *= TAPER_REDUCTION;
    reasoning.push("Taper reduction applied to weekly target".to_string());
  }

  // Deep-fatigue override wins over everything else
  if tsb.is_some_and(|t| t < RECOVER_TSB_FLOOR) {
    let recover_mid = (current + required_ramp) * 7.0 * RECOVER_REDUCTION;
    weekly_mid = weekly_mid.min(recover_mid);
    label = LoadLabel::Recover;
    warning = Some(format!(
      "TSB {:.0} is deeply negative; recover before resuming planned load",
      tsb.unwrap_or(0.0)
    ));
    reasoning.push("Recovery override: weekly load cut until form rebounds".to_string());
  }

  let weekly_tss_low = weekly_mid * (1.0 - WEEKLY_RANGE_SPREAD);
  let weekly_tss_high = weekly_mid * (1.0 + WEEKLY_RANGE_SPREAD);

  LoadTargets {
    current_ctl: current,
    target_ctl,
    required_ramp,
    label,
    weekly_tss_low,
    weekly_tss_high,
    daily_tss_low: weekly_tss_low / 7.0,
    daily_tss_high: weekly_tss_high / 7.0,
    warning,
    reasoning,
    ai_enhanced: false,
  }
}

/// ---------------------------------------------------------------------------
/// Advisor Refinement
/// ---------------------------------------------------------------------------

/// Advise weekly load. The fallback range is computed first; the advisor may
/// tighten it. Responses with inverted, negative, or wildly out-of-band
/// ranges are discarded.
pub async fn advise(
  ctl: Option<f64>,
  tsb: Option<f64>,
  weeks_out: Option<i64>,
  phase: Phase,
  advisor: Option<&dyn Advisor>,
) -> LoadTargets {
  let fallback = fallback_targets(ctl, tsb, weeks_out, phase);

  let resolved = resolve(fallback.clone(), async {
    let advisor = advisor?;
    let context = serde_json::json!({
      "current_ctl": fallback.current_ctl,
      "target_ctl": fallback.target_ctl,
      "required_ramp_per_week": fallback.required_ramp,
      "tsb": tsb,
      "phase": phase,
      "weeks_to_goal": weeks_out,
      "rule_based_weekly_range": [fallback.weekly_tss_low, fallback.weekly_tss_high],
    });
    let user_message = format!(
      "Recommend this athlete's weekly training-stress range.\n\nSIGNALS:\n{}\n\n\
       Respond with valid JSON: {{\"weekly_tss_low\": number, \"weekly_tss_high\": number, \
       \"reasoning\": \"...\"}}",
      context
    );
    let advice: LoadAdvice = request(advisor, &user_message, 512).await?;

    if !advice.weekly_tss_low.is_finite() || !advice.weekly_tss_high.is_finite() {
      return None;
    }
    if advice.weekly_tss_low < 0.0 || advice.weekly_tss_high < advice.weekly_tss_low {
      return None;
    }
    // Anything more than double the rule-based ceiling is not credible
    if advice.weekly_tss_high > fallback.weekly_tss_high * 2.0 + 100.0 {
      return None;
    }

    let mut refined = fallback.clone();
    refined.weekly_tss_low = advice.weekly_tss_low;
    refined.weekly_tss_high = advice.weekly_tss_high;
    refined.daily_tss_low = advice.weekly_tss_low / 7.0;
    refined.daily_tss_high = advice.weekly_tss_high / 7.0;
    refined.reasoning.push(advice.reasoning);
    refined.ai_enhanced = true;
    Some(refined)
  })
  .await;

  resolved.value
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
