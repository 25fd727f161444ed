//! Periodization phase state machine
//!
//! The deterministic phase is a pure function of weeks-to-goal. Trajectory
//! readiness flags may justify an early or late transition, and the advisor
//! may override the displayed phase, but the calendar phase is always
//! computed first and retained as the audit trail. This module never fails;
//! advisor problems degrade to the deterministic result.

use serde::{Deserialize, Serialize};

use crate::advisor::{request, resolve, Advisor, Resolved};
use crate::models::Confidence;
use crate::trajectory::{FitnessTrajectory, RecoveryTrend, Trend};

/// ---------------------------------------------------------------------------
/// Phase Thresholds (weeks to goal event)
/// ---------------------------------------------------------------------------

const RACE_WEEK_MAX: i64 = 1;
const TAPER_MAX: i64 = 3;
const SPECIALTY_MAX: i64 = 8;
const BUILD_MAX: i64 = 16;

/// Readiness flags may pull Build forward only this close to the goal
const EARLY_BUILD_MAX_WEEKS: i64 = 12;
const EARLY_SPECIALTY_MAX_WEEKS: i64 = 10;
const EARLY_TAPER_MAX_WEEKS: i64 = 4;

/// ---------------------------------------------------------------------------
/// Phases
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  Base,
  Build,
  Specialty,
  Taper,
  RaceWeek,
}

impl Phase {
  pub fn focus(&self) -> &'static str {
    match self {
      Self::Base => "Aerobic base, durability, and consistent volume",
      Self::Build => "Threshold development and sustained power",
      Self::Specialty => "Race-specific intensity and event demands",
      Self::Taper => "Shed fatigue while keeping intensity touches",
      Self::RaceWeek => "Execution: stay sharp, stay fresh",
    }
  }

  fn parse(label: &str) -> Option<Self> {
    match label.to_lowercase().replace([' ', '-'], "_").as_str() {
      "base" => Some(Self::Base),
      "build" => Some(Self::Build),
      "specialty" | "speciality" => Some(Self::Specialty),
      "taper" => Some(Self::Taper),
      "race_week" | "raceweek" | "race" => Some(Self::RaceWeek),
      _ => None,
    }
  }
}

/// Pure, total mapping from calendar distance to phase. `None` means no goal
/// event on the calendar; negative values mean the goal has passed. Both
/// land in Base.
pub fn phase_for_weeks_out(weeks_out: Option<i64>) -> Phase {
  match weeks_out {
    Some(w) if w < 0 => Phase::Base,
    Some(w) if w <= RACE_WEEK_MAX => Phase::RaceWeek,
    Some(w) if w <= TAPER_MAX => Phase::Taper,
    Some(w) if w <= SPECIALTY_MAX => Phase::Specialty,
    Some(w) if w <= BUILD_MAX => Phase::Build,
    _ => Phase::Base,
  }
}

/// Days to goal converted to signed weeks, rounded up.
pub fn weeks_out_from_days(days_to_goal: i64) -> i64 {
  if days_to_goal >= 0 {
    (days_to_goal + 6) / 7
  } else {
    days_to_goal / 7
  }
}

/// ---------------------------------------------------------------------------
/// Transition Readiness
/// ---------------------------------------------------------------------------

/// A recommended early/late transition, grounded in trajectory flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionAdvice {
  pub to: Phase,
  pub reason: String,
}

/// Check whether trajectory readiness justifies moving off the calendar
/// phase. Returns at most one recommendation; the calendar phase stays the
/// floor either way.
pub fn check_transition_readiness(
  calendar_phase: Phase,
  weeks_out: Option<i64>,
  trajectory: &FitnessTrajectory,
) -> Option<TransitionAdvice> {
  let weeks = weeks_out?;

  match calendar_phase {
    Phase::Base if trajectory.base_complete && weeks <= EARLY_BUILD_MAX_WEEKS => {
      Some(TransitionAdvice {
        to: Phase::Build,
        reason: "Base work is complete and the goal is close enough to start building".into(),
      })
    }
    Phase::Build
      if trajectory.recovery_trend == RecoveryTrend::Unsustainable
        && trajectory.ctl_trend == Trend::Declining =>
    {
      Some(TransitionAdvice {
        to: Phase::Base,
        reason: "Recovery is unsustainable and fitness is declining; step back to base load".into(),
      })
    }
    Phase::Build if trajectory.ready_for_specialty && weeks <= EARLY_SPECIALTY_MAX_WEEKS => {
      Some(TransitionAdvice {
        to: Phase::Specialty,
        reason: "Build targets are met; start race-specific work early".into(),
      })
    }
    Phase::Specialty if trajectory.ready_for_taper && weeks <= EARLY_TAPER_MAX_WEEKS => {
      Some(TransitionAdvice {
        to: Phase::Taper,
        reason: "Fitness targets are met; extra taper time beats extra load".into(),
      })
    }
    _ => None,
  }
}

/// ---------------------------------------------------------------------------
/// Phase Assessment
/// ---------------------------------------------------------------------------

/// Advisor override record, kept alongside the deterministic result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseOverride {
  pub reasoning: String,
  pub confidence: Confidence,
  /// True when the advisor's phase differs from the deterministic one
  pub overridden: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseAssessment {
  /// Displayed phase, after readiness adjustment and any advisor override
  pub phase: Phase,
  /// Calendar phase: the deterministic floor, never discarded
  pub deterministic_phase: Phase,
  pub weeks_out: Option<i64>,
  pub focus: String,
  pub reasoning: Vec<String>,
  /// Readiness-driven transition notes
  pub adjustments: Vec<String>,
  pub confidence: Confidence,
  pub ai_enhanced: bool,
  pub advisor: Option<PhaseOverride>,
}

/// Shape the advisor must return for a phase override.
#[derive(Debug, Clone, Deserialize)]
pub struct PhaseAdvice {
  pub phase: String,
  pub reasoning: String,
  #[serde(default)]
  pub confidence: Option<String>,
}

fn parse_confidence(raw: Option<&str>) -> Confidence {
  match raw.map(str::to_lowercase).as_deref() {
    Some("high") => Confidence::High,
    Some("low") => Confidence::Low,
    _ => Confidence::Medium,
  }
}

/// Assess the current phase. Total: every failure path lands on the
/// deterministic calendar phase.
pub async fn assess(
  weeks_out: Option<i64>,
  trajectory: &FitnessTrajectory,
  advisor: Option<&dyn Advisor>,
) -> PhaseAssessment {
  let deterministic = phase_for_weeks_out(weeks_out);

  let mut reasoning = vec![match weeks_out {
    Some(w) if w >= 0 => format!("{} weeks to goal event", w),
    Some(_) => "Goal event has passed".to_string(),
    None => "No goal event on the calendar".to_string(),
  }];

  let mut adjustments = Vec::new();
  let mut effective = deterministic;

  if let Some(advice) = check_transition_readiness(deterministic, weeks_out, trajectory) {
    adjustments.push(advice.reason.clone());
    effective = advice.to;
  }

  let resolved = resolve((effective, None), async {
    let advisor = advisor?;
    let context = serde_json::json!({
      "weeks_to_goal": weeks_out,
      "calendar_phase": deterministic,
      "ctl_trend": trajectory.ctl_trend,
      "consistency": trajectory.consistency,
      "recovery_trend": trajectory.recovery_trend,
      "base_complete": trajectory.base_complete,
      "build_complete": trajectory.build_complete,
    });
    let user_message = format!(
      "Given these signals, confirm or override the training phase.\n\nSIGNALS:\n{}\n\n\
       Respond with valid JSON: {{\"phase\": \"base|build|specialty|taper|race_week\", \
       \"reasoning\": \"...\", \"confidence\": \"low|medium|high\"}}",
      context
    );
    let advice: PhaseAdvice = request(advisor, &user_message, 512).await?;
    let phase = Phase::parse(&advice.phase)?;
    Some((phase, Some(advice)))
  })
  .await;

  let Resolved { value: (phase, advice), ai_enhanced } = resolved;

  match advice {
    Some(advice) if ai_enhanced => {
      let overridden = phase != effective;
      let confidence = parse_confidence(advice.confidence.as_deref());
      reasoning.push(advice.reasoning.clone());
      PhaseAssessment {
        phase,
        deterministic_phase: deterministic,
        weeks_out,
        focus: phase.focus().to_string(),
        reasoning,
        adjustments,
        confidence,
        ai_enhanced: true,
        advisor: Some(PhaseOverride {
          reasoning: advice.reasoning,
          confidence,
          overridden,
        }),
      }
    }
    _ => PhaseAssessment {
      phase: effective,
      deterministic_phase: deterministic,
      weeks_out,
      focus: effective.focus().to_string(),
      reasoning,
      adjustments,
      confidence: Confidence::High,
      ai_enhanced: false,
      advisor: None,
    },
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::ScriptedAdvisor;
  use crate::trajectory::FitnessTrajectory;

  #[test]
  fn test_phase_thresholds_are_total_and_ordered() {
    assert_eq!(phase_for_weeks_out(None), Phase::Base);
    assert_eq!(phase_for_weeks_out(Some(-2)), Phase::Base);
    assert_eq!(phase_for_weeks_out(Some(0)), Phase::RaceWeek);
    assert_eq!(phase_for_weeks_out(Some(1)), Phase::RaceWeek);
    assert_eq!(phase_for_weeks_out(Some(2)), Phase::Taper);
    assert_eq!(phase_for_weeks_out(Some(3)), Phase::Taper);
    assert_eq!(phase_for_weeks_out(Some(4)), Phase::Specialty);
    assert_eq!(phase_for_weeks_out(Some(8)), Phase::Specialty);
    assert_eq!(phase_for_weeks_out(Some(9)), Phase::Build);
    assert_eq!(phase_for_weeks_out(Some(16)), Phase::Build);
    assert_eq!(phase_for_weeks_out(Some(17)), Phase::Base);
    assert_eq!(phase_for_weeks_out(Some(40)), Phase::Base);
  }

  #[test]
  fn test_phase_is_pure() {
    for w in -5..50 {
      assert_eq!(phase_for_weeks_out(Some(w)), phase_for_weeks_out(Some(w)));
    }
  }

  #[test]
  fn test_weeks_out_rounds_up() {
    assert_eq!(weeks_out_from_days(0), 0);
    assert_eq!(weeks_out_from_days(1), 1);
    assert_eq!(weeks_out_from_days(7), 1);
    assert_eq!(weeks_out_from_days(8), 2);
    assert_eq!(weeks_out_from_days(-3), 0);
    assert_eq!(weeks_out_from_days(-8), -1);
  }

  fn ready_trajectory() -> FitnessTrajectory {
    let mut t = FitnessTrajectory::insufficient();
    t.base_complete = true;
    t.ctl_trend = Trend::Building;
    t.recovery_trend = RecoveryTrend::Sustainable;
    t
  }

  #[test]
  fn test_early_build_recommendation() {
    let advice = check_transition_readiness(Phase::Base, Some(11), &ready_trajectory());
    assert_eq!(advice.unwrap().to, Phase::Build);

    // Too far out: stay in base even when ready
    assert!(check_transition_readiness(Phase::Base, Some(20), &ready_trajectory()).is_none());
  }

  #[test]
  fn test_build_regression_when_recovery_unsustainable() {
    let mut t = FitnessTrajectory::insufficient();
    t.recovery_trend = RecoveryTrend::Unsustainable;
    t.ctl_trend = Trend::Declining;

    let advice = check_transition_readiness(Phase::Build, Some(10), &t);
    assert_eq!(advice.unwrap().to, Phase::Base);
  }

  #[tokio::test]
  async fn test_assess_without_advisor_is_deterministic() {
    let trajectory = FitnessTrajectory::insufficient();
    let assessment = assess(Some(10), &trajectory, None).await;

    assert_eq!(assessment.phase, Phase::Build);
    assert_eq!(assessment.deterministic_phase, Phase::Build);
    assert!(!assessment.ai_enhanced);
    assert!(assessment.advisor.is_none());
  }

  #[tokio::test]
  async fn test_advisor_override_keeps_deterministic_baseline() {
    let trajectory = FitnessTrajectory::insufficient();
    let advisor = ScriptedAdvisor::with_response(
      r#"{"phase": "specialty", "reasoning": "event demands need attention now", "confidence": "high"}"#,
    );

    let assessment = assess(Some(10), &trajectory, Some(&advisor)).await;

    assert_eq!(assessment.phase, Phase::Specialty);
    assert_eq!(assessment.deterministic_phase, Phase::Build);
    assert!(assessment.ai_enhanced);
    assert!(assessment.advisor.as_ref().unwrap().overridden);
  }

  #[tokio::test]
  async fn test_advisor_garbage_falls_back() {
    let trajectory = FitnessTrajectory::insufficient();
    let advisor = ScriptedAdvisor::with_response("sure, sounds like a build block to me!");

    let assessment = assess(Some(10), &trajectory, Some(&advisor)).await;

    assert_eq!(assessment.phase, Phase::Build);
    assert!(!assessment.ai_enhanced);
  }

  #[tokio::test]
  async fn test_advisor_unknown_phase_name_falls_back() {
    let trajectory = FitnessTrajectory::insufficient();
    let advisor =
      ScriptedAdvisor::with_response(r#"{"phase": "mega-block", "reasoning": "trust me"}"#);

    let assessment = assess(Some(10), &trajectory, Some(&advisor)).await;
    assert_eq!(assessment.phase, Phase::Build);
    assert!(!assessment.ai_enhanced);
  }
}
