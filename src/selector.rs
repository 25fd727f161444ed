//! Workout type selection
//!
//! The terminal aggregator: merges phase, form, recovery, event proximity,
//! recent-type history, and the adaptive adjustment into one workout
//! recommendation. The advisor picks from a closed catalog; anything it
//! returns outside that catalog is discarded and the rule-based path takes
//! over. The rule-based path never calls the advisor and never fails.

use serde::{Deserialize, Serialize};

use crate::advisor::{request, resolve, Advisor};
use crate::models::EventCategory;
use crate::phase::Phase;
use crate::wellness::RecoveryStatus;

/// ---------------------------------------------------------------------------
/// Caps
/// ---------------------------------------------------------------------------

const DEFAULT_INTENSITY_CAP: u8 = 3;
const TSB_CAP_FLOOR: f64 = -15.0;
/// Adjustments at or below this (a returning-athlete discount) cap intensity
const ADJUSTMENT_CAP_PCT: f64 = -20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sport {
  Ride,
  Run,
}

impl Sport {
  pub fn parse(raw: &str) -> Option<Self> {
    match raw.to_lowercase().as_str() {
      "ride" | "bike" | "cycling" => Some(Self::Ride),
      "run" | "running" => Some(Self::Run),
      _ => None,
    }
  }
}

/// ---------------------------------------------------------------------------
/// Workout Catalog
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize)]
pub struct WorkoutType {
  pub key: &'static str,
  pub sport: Sport,
  /// Nominal intensity 1-5
  pub intensity: u8,
  pub description: &'static str,
}

/// The closed set of workout types the engine may recommend. Advisor
/// responses are validated against the keys here.
pub const CATALOG: &[WorkoutType] = &[
  WorkoutType {
    key: "recovery_spin",
    sport: Sport::Ride,
    intensity: 1,
    description: "Very easy spin, high cadence, no pressure on the pedals",
  },
  WorkoutType {
    key: "endurance",
    sport: Sport::Ride,
    intensity: 2,
    description: "Steady zone 2 aerobic riding",
  },
  WorkoutType {
    key: "tempo",
    sport: Sport::Ride,
    intensity: 3,
    description: "Sustained zone 3 blocks, comfortably hard",
  },
  WorkoutType {
    key: "sweet_spot",
    sport: Sport::Ride,
    intensity: 4,
    description: "Blocks at 88-94% of threshold",
  },
  WorkoutType {
    key: "threshold",
    sport: Sport::Ride,
    intensity: 4,
    description: "Intervals at or just under FTP",
  },
  WorkoutType {
    key: "vo2max",
    sport: Sport::Ride,
    intensity: 5,
    description: "Short hard intervals well above threshold",
  },
  WorkoutType {
    key: "easy_run",
    sport: Sport::Run,
    intensity: 2,
    description: "Conversational-pace running",
  },
  WorkoutType {
    key: "tempo_run",
    sport: Sport::Run,
    intensity: 3,
    description: "Sustained comfortably-hard running",
  },
  WorkoutType {
    key: "run_intervals",
    sport: Sport::Run,
    intensity: 5,
    description: "Hard repeats with jog recoveries",
  },
  WorkoutType {
    key: "long_run",
    sport: Sport::Run,
    intensity: 3,
    description: "Extended steady run for durability",
  },
];

pub fn catalog_lookup(key: &str) -> Option<&'static WorkoutType> {
  CATALOG.iter().find(|w| w.key == key)
}

fn easiest_for(sport: Sport) -> &'static WorkoutType {
  CATALOG
    .iter()
    .filter(|w| w.sport == sport)
    .min_by_key(|w| w.intensity)
    .unwrap_or(&CATALOG[0])
}

/// ---------------------------------------------------------------------------
/// Decision Types
/// ---------------------------------------------------------------------------

/// Everything the selector needs, passed by value from the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionContext {
  pub phase: Phase,
  pub sport: Sport,
  pub ctl: Option<f64>,
  pub tsb: Option<f64>,
  pub recovery: RecoveryStatus,
  pub intensity_modifier: f64,
  pub event_tomorrow: Option<EventCategory>,
  pub event_yesterday: Option<EventCategory>,
  /// Workout types of recent days, newest first
  pub recent_types: Vec<String>,
  /// Combined adaptive adjustment, percent
  pub adjustment_pct: f64,
  /// Available training window in minutes
  pub available_minutes: (u32, u32),
}

/// Terminal artifact of the daily pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutDecision {
  pub workout_type: String,
  /// 1-5
  pub max_intensity: u8,
  pub is_rest_day: bool,
  pub reason: String,
  pub advisor_enhanced: bool,
}

/// Shape the advisor must return.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkoutAdvice {
  pub workout_type: String,
  pub intensity: u8,
  pub should_train: bool,
  pub reason: String,
}

/// ---------------------------------------------------------------------------
/// Rule-Based Path
/// ---------------------------------------------------------------------------

/// The intensity ceiling for today, before any type is chosen. Every input
/// can only lower it.
pub fn intensity_cap(ctx: &SelectionContext) -> u8 {
  let mut cap = DEFAULT_INTENSITY_CAP;

  if let Some(event) = ctx.event_tomorrow {
    if event.is_race() {
      // Lowest-priority races leave a little room for openers
      cap = cap.min(if event == EventCategory::RaceC { 3 } else { 2 });
    }
  }

  if ctx.tsb.is_some_and(|t| t < TSB_CAP_FLOOR) {
    cap = cap.min(2);
  }

  if ctx.recovery == RecoveryStatus::Red {
    cap = cap.min(2);
  }

  if ctx.adjustment_pct <= ADJUSTMENT_CAP_PCT {
    cap = cap.min(2);
  }

  cap
}

/// Conservative rule-based selection. Never consults the advisor.
pub fn fallback_decision(ctx: &SelectionContext) -> WorkoutDecision {
  if ctx.event_yesterday.is_some_and(|e| e.is_race()) {
    return WorkoutDecision {
      workout_type: "rest".to_string(),
      max_intensity: 1,
      is_rest_day: true,
      reason: "Raced yesterday; full rest to absorb the effort".to_string(),
      advisor_enhanced: false,
    };
  }

  let cap = intensity_cap(ctx);

  let chosen = if cap <= 2 {
    easiest_for(ctx.sport)
  } else {
    phase_default(ctx.phase, ctx.sport)
  };

  let chosen = vary(chosen, &ctx.recent_types, cap);

  let reason = if cap <= 2 {
    format!(
      "Capped at intensity {} (tsb {:?}, recovery {:?}); keeping it easy",
      cap, ctx.tsb, ctx.recovery
    )
  } else {
    format!("{:?}-phase staple within today's intensity ceiling", ctx.phase)
  };

  WorkoutDecision {
    workout_type: chosen.key.to_string(),
    max_intensity: cap.min(chosen.intensity).max(1),
    is_rest_day: false,
    reason,
    advisor_enhanced: false,
  }
}

fn phase_default(phase: Phase, sport: Sport) -> &'static WorkoutType {
  let key = match (phase, sport) {
    (Phase::Base, Sport::Ride) => "tempo",
    (Phase::Base, Sport::Run) => "easy_run",
    (Phase::Build, Sport::Ride) => "sweet_spot",
    (Phase::Build, Sport::Run) => "tempo_run",
    (_, Sport::Ride) => "endurance",
    (_, Sport::Run) => "tempo_run",
  };
  catalog_lookup(key).unwrap_or_else(|| easiest_for(sport))
}

/// Avoid prescribing the same type three days running: if the pick matches
/// the last two days, substitute another type of the same sport at or under
/// the cap.
fn vary(pick: &'static WorkoutType, recent: &[String], cap: u8) -> &'static WorkoutType {
  let repeated = recent.len() >= 2 && recent[..2].iter().all(|t| t == pick.key);
  if !repeated {
    return pick;
  }

  CATALOG
    .iter()
    .filter(|w| w.sport == pick.sport && w.key != pick.key && w.intensity <= cap)
    .max_by_key(|w| w.intensity)
    .unwrap_or(pick)
}

/// ---------------------------------------------------------------------------
/// Advisor Path
/// ---------------------------------------------------------------------------

/// Decide today's workout. The rule-based decision is computed first and
/// survives any advisor problem untouched.
pub async fn decide(ctx: &SelectionContext, advisor: Option<&dyn Advisor>) -> WorkoutDecision {
  let fallback = fallback_decision(ctx);

  // Post-race rest is not negotiable
  if fallback.is_rest_day {
    return fallback;
  }

  let cap = intensity_cap(ctx);

  let resolved = resolve(fallback, async {
    let advisor = advisor?;
    let options: Vec<&str> = CATALOG
      .iter()
      .filter(|w| w.sport == ctx.sport)
      .map(|w| w.key)
      .collect();

    let context = serde_json::json!({
      "phase": ctx.phase,
      "ctl": ctx.ctl,
      "tsb": ctx.tsb,
      "recovery_status": ctx.recovery,
      "intensity_modifier": ctx.intensity_modifier,
      "race_tomorrow": ctx.event_tomorrow.map(|e| format!("{:?}", e)),
      "race_yesterday": ctx.event_yesterday.map(|e| format!("{:?}", e)),
      "recent_workout_types": ctx.recent_types,
      "intensity_adjustment_pct": ctx.adjustment_pct,
      "available_minutes": ctx.available_minutes,
      "workout_options": options,
    });

    let user_message = format!(
      "Choose today's workout for this athlete.\n\nSIGNALS:\n{}\n\n\
       Pick workout_type from workout_options only. Respond with valid JSON: \
       {{\"workout_type\": \"...\", \"intensity\": 1-5, \"should_train\": true|false, \
       \"reason\": \"...\"}}",
      context
    );

    let advice: WorkoutAdvice = request(advisor, &user_message, 768).await?;

    if !advice.should_train {
      return Some(WorkoutDecision {
        workout_type: "rest".to_string(),
        max_intensity: 1,
        is_rest_day: true,
        reason: advice.reason,
        advisor_enhanced: true,
      });
    }

    // Outside the catalog or out of range: discard entirely
    let chosen = catalog_lookup(&advice.workout_type)?;
    if chosen.sport != ctx.sport || !(1..=5).contains(&advice.intensity) {
      return None;
    }

    Some(WorkoutDecision {
      workout_type: chosen.key.to_string(),
      // Advisor enthusiasm still respects today's ceiling
      max_intensity: advice.intensity.min(cap),
      is_rest_day: false,
      reason: advice.reason,
      advisor_enhanced: true,
    })
  })
  .await;

  resolved.value
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::{selection_context, ScriptedAdvisor};

  #[test]
  fn test_default_cap_is_three() {
    let ctx = selection_context();
    assert_eq!(intensity_cap(&ctx), 3);
  }

  #[test]
  fn test_negative_tsb_caps_at_two() {
    // Scenario: ctl=50, atl=70 -> tsb=-20
    let mut ctx = selection_context();
    ctx.ctl = Some(50.0);
    ctx.tsb = Some(-20.0);

    for phase in [Phase::Base, Phase::Build, Phase::Specialty, Phase::Taper, Phase::RaceWeek] {
      ctx.phase = phase;
      let decision = fallback_decision(&ctx);
      assert!(decision.max_intensity <= 2, "phase {:?}", phase);
    }
  }

  #[test]
  fn test_race_tomorrow_caps_by_priority() {
    let mut ctx = selection_context();

    ctx.event_tomorrow = Some(EventCategory::RaceA);
    let a_cap = intensity_cap(&ctx);

    ctx.event_tomorrow = Some(EventCategory::RaceC);
    let c_cap = intensity_cap(&ctx);

    assert_eq!(a_cap, 2);
    assert_eq!(c_cap, 3);
    assert!(a_cap <= c_cap);
  }

  #[test]
  fn test_cap_monotone_in_tsb_and_recovery() {
    let mut ctx = selection_context();

    let mut last_cap = u8::MAX;
    for tsb in [5.0, -10.0, -16.0, -30.0] {
      ctx.tsb = Some(tsb);
      let cap = intensity_cap(&ctx);
      assert!(cap <= last_cap);
      last_cap = cap;
    }

    ctx.tsb = Some(5.0);
    ctx.recovery = RecoveryStatus::Red;
    assert!(intensity_cap(&ctx) <= 2);
  }

  #[test]
  fn test_red_recovery_picks_easiest_type() {
    let mut ctx = selection_context();
    ctx.recovery = RecoveryStatus::Red;

    let decision = fallback_decision(&ctx);
    assert_eq!(decision.workout_type, "recovery_spin");
    assert!(!decision.is_rest_day);
  }

  #[test]
  fn test_phase_defaults() {
    let mut ctx = selection_context();

    ctx.phase = Phase::Base;
    assert_eq!(fallback_decision(&ctx).workout_type, "tempo");

    ctx.phase = Phase::Build;
    assert_eq!(fallback_decision(&ctx).workout_type, "sweet_spot");

    ctx.phase = Phase::Specialty;
    assert_eq!(fallback_decision(&ctx).workout_type, "endurance");

    ctx.sport = Sport::Run;
    ctx.phase = Phase::Build;
    assert_eq!(fallback_decision(&ctx).workout_type, "tempo_run");
  }

  #[test]
  fn test_race_yesterday_is_rest_day() {
    let mut ctx = selection_context();
    ctx.event_yesterday = Some(EventCategory::RaceB);

    let decision = fallback_decision(&ctx);
    assert!(decision.is_rest_day);
  }

  #[test]
  fn test_variety_breaks_three_day_repeats() {
    let mut ctx = selection_context();
    ctx.phase = Phase::Build;
    ctx.recent_types = vec!["sweet_spot".to_string(), "sweet_spot".to_string()];

    let decision = fallback_decision(&ctx);
    assert_ne!(decision.workout_type, "sweet_spot");
  }

  #[test]
  fn test_returning_athlete_adjustment_caps_intensity() {
    let mut ctx = selection_context();
    ctx.adjustment_pct = -28.0;

    let decision = fallback_decision(&ctx);
    assert!(decision.max_intensity <= 2);
  }

  #[tokio::test]
  async fn test_advisor_valid_choice_accepted() {
    let ctx = selection_context();
    let advisor = ScriptedAdvisor::with_response(
      r#"{"workout_type": "tempo", "intensity": 3, "should_train": true, "reason": "solid aerobic day"}"#,
    );

    let decision = decide(&ctx, Some(&advisor)).await;
    assert!(decision.advisor_enhanced);
    assert_eq!(decision.workout_type, "tempo");
    assert_eq!(decision.max_intensity, 3);
  }

  #[tokio::test]
  async fn test_advisor_unknown_type_discarded_entirely() {
    let ctx = selection_context();
    let advisor = ScriptedAdvisor::with_response(
      r#"{"workout_type": "zone_9_death_ride", "intensity": 3, "should_train": true, "reason": "..."}"#,
    );

    let decision = decide(&ctx, Some(&advisor)).await;
    assert!(!decision.advisor_enhanced);
    assert!(catalog_lookup(&decision.workout_type).is_some());
  }

  #[tokio::test]
  async fn test_advisor_intensity_clamped_to_cap() {
    let mut ctx = selection_context();
    ctx.tsb = Some(-20.0); // cap 2
    let advisor = ScriptedAdvisor::with_response(
      r#"{"workout_type": "vo2max", "intensity": 5, "should_train": true, "reason": "feeling spicy"}"#,
    );

    let decision = decide(&ctx, Some(&advisor)).await;
    assert!(decision.max_intensity <= 2);
  }

  #[tokio::test]
  async fn test_advisor_rest_call_respected() {
    let ctx = selection_context();
    let advisor = ScriptedAdvisor::with_response(
      r#"{"workout_type": "endurance", "intensity": 1, "should_train": false, "reason": "cooked"}"#,
    );

    let decision = decide(&ctx, Some(&advisor)).await;
    assert!(decision.is_rest_day);
    assert!(decision.advisor_enhanced);
  }

  #[tokio::test]
  async fn test_no_advisor_yields_valid_decision() {
    let ctx = selection_context();
    let decision = decide(&ctx, None).await;

    assert!(!decision.advisor_enhanced);
    assert!(catalog_lookup(&decision.workout_type).is_some());
    assert!((1..=5).contains(&decision.max_intensity));
  }

  #[tokio::test]
  async fn test_idempotent_for_identical_context() {
    let ctx = selection_context();
    let first = decide(&ctx, None).await;
    let second = decide(&ctx, None).await;

    assert_eq!(first.workout_type, second.workout_type);
    assert_eq!(first.max_intensity, second.max_intensity);
    assert_eq!(first.is_rest_day, second.is_rest_day);
  }
}
