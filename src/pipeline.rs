//! The daily decision pipeline
//!
//! One pass per invocation: fetch everything fresh from the collaborators
//! into a run-scoped `DecisionInputs`, then run the components strictly
//! downstream, passing data by value. Nothing here is cached across runs;
//! the inputs object is the only memoization and it dies with the run.
//!
//! Only the very first fetch may abort a run. Every later collaborator
//! problem degrades to an empty or neutral input with a warning.

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::advisor::Advisor;
use crate::detectors::{
  self, DeloadAdvisory, FtpRetestAdvisory, IllnessAdvisory, RampRateAdvisory, VolumeJumpAdvisory,
};
use crate::feedback::{self, AdaptiveFeedback};
use crate::intervals::{FitnessError, FitnessService};
use crate::load::{self, LoadTargets};
use crate::models::{
  Activity, CalendarEvent, DailyFitness, EventCategory, FitnessMetrics, RecoverySample,
  WellnessRecord,
};
use crate::phase::{self, PhaseAssessment};
use crate::selector::{self, SelectionContext, Sport, WorkoutDecision};
use crate::trajectory::{self, FitnessTrajectory};
use crate::wellness::{self, WellnessSummary};
use crate::whoop::RecoveryService;

/// Fetch windows, in days
const WELLNESS_WINDOW: i64 = 30;
const FITNESS_WINDOW: i64 = 42;
const ACTIVITY_WINDOW: i64 = 90;
const EVENT_LOOKBACK: i64 = 7;
const EVENT_LOOKAHEAD: i64 = 120;

/// Daily training window offered to the advisor, in minutes
const AVAILABLE_MINUTES: (u32, u32) = (45, 90);

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
  #[error("Fitness service unreachable: {0}")]
  FitnessUnavailable(#[from] FitnessError),

  #[error("Run ledger error: {0}")]
  Ledger(String),
}

/// ---------------------------------------------------------------------------
/// Run-Scoped Inputs
/// ---------------------------------------------------------------------------

/// Everything one run needs, fetched up front. Explicitly scoped to the
/// invocation: build it, decide from it, drop it.
#[derive(Debug, Clone)]
pub struct DecisionInputs {
  pub today: NaiveDate,
  /// Newest first
  pub wellness: Vec<WellnessRecord>,
  pub wearable: Option<RecoverySample>,
  pub fitness_series: Vec<DailyFitness>,
  pub activities: Vec<Activity>,
  pub events: Vec<CalendarEvent>,
  pub target_eftp: Option<f64>,
  pub sport: Sport,
}

/// Fetch all inputs. The first wellness fetch failing is the run's only
/// fatal error; everything after degrades to empty with a warning.
pub async fn gather(
  fitness: &dyn FitnessService,
  wearable: Option<&dyn RecoveryService>,
  today: NaiveDate,
  target_eftp: Option<f64>,
  sport: Sport,
) -> Result<DecisionInputs, PipelineError> {
  let wellness = fitness
    .wellness(today - Duration::days(WELLNESS_WINDOW), today)
    .await?;

  let fitness_series = fitness
    .daily_fitness(today - Duration::days(FITNESS_WINDOW), today)
    .await
    .unwrap_or_else(|e| {
      tracing::warn!(error = %e, "fitness series unavailable; continuing without it");
      Vec::new()
    });

  let activities = fitness
    .activities(today - Duration::days(ACTIVITY_WINDOW), today)
    .await
    .unwrap_or_else(|e| {
      tracing::warn!(error = %e, "activities unavailable; continuing without them");
      Vec::new()
    });

  let events = fitness
    .events(
      today - Duration::days(EVENT_LOOKBACK),
      today + Duration::days(EVENT_LOOKAHEAD),
    )
    .await
    .unwrap_or_else(|e| {
      tracing::warn!(error = %e, "calendar unavailable; continuing without it");
      Vec::new()
    });

  let wearable_sample = match wearable {
    Some(service) => match service.latest_recovery(today).await {
      Ok(sample) => sample,
      Err(e) => {
        tracing::warn!(error = %e, "wearable feed unavailable; using primary wellness only");
        None
      }
    },
    None => None,
  };

  Ok(DecisionInputs {
    today,
    wellness,
    wearable: wearable_sample,
    fitness_series,
    activities,
    events,
    target_eftp,
    sport,
  })
}

/// Whether today's recovery data has arrived from either source. The
/// scheduler polls hourly until this holds or the deadline hour passes.
pub fn recovery_data_ready(inputs: &DecisionInputs) -> bool {
  if inputs.wearable.is_some() {
    return true;
  }
  inputs
    .wellness
    .iter()
    .any(|r| r.date == inputs.today && r.has_data())
}

/// ---------------------------------------------------------------------------
/// Calendar Views
/// ---------------------------------------------------------------------------

/// The goal event: the nearest upcoming A-race, or the nearest upcoming race
/// of any priority when no A-race is scheduled.
pub fn goal_event<'a>(events: &'a [CalendarEvent], today: NaiveDate) -> Option<&'a CalendarEvent> {
  let upcoming: Vec<&CalendarEvent> = events
    .iter()
    .filter(|e| e.category.is_race() && e.date >= today)
    .collect();

  upcoming
    .iter()
    .filter(|e| e.category == EventCategory::RaceA)
    .min_by_key(|e| e.date)
    .or_else(|| upcoming.iter().min_by_key(|e| e.date))
    .copied()
}

/// Highest-priority race on a specific day, if any.
fn race_on(events: &[CalendarEvent], date: NaiveDate) -> Option<EventCategory> {
  events
    .iter()
    .filter(|e| e.date == date && e.category.is_race())
    .min_by_key(|e| e.category.race_priority().unwrap_or(u8::MAX))
    .map(|e| e.category)
}

/// Trailing completed calendar weeks (Monday-based) as TSS totals, newest
/// first. The week containing `today` is excluded as incomplete; weeks with
/// no activities total zero.
pub fn weekly_totals(activities: &[Activity], today: NaiveDate, weeks: usize) -> Vec<f64> {
  let this_week_start = today - Duration::days(today.weekday().num_days_from_monday() as i64);

  (0..weeks)
    .map(|i| {
      let end = this_week_start - Duration::days(7 * i as i64);
      let start = end - Duration::days(7);
      activities
        .iter()
        .filter(|a| {
          let date = a.started_at.date_naive();
          date >= start && date < end
        })
        .filter_map(|a| a.training_load)
        .sum()
    })
    .collect()
}

/// Workout types of the engine's recent calendar placeholders, newest first.
/// Used only for variety; absence is fine.
fn recent_workout_types(events: &[CalendarEvent], today: NaiveDate) -> Vec<String> {
  let mut recent: Vec<&CalendarEvent> = events
    .iter()
    .filter(|e| e.category == EventCategory::Workout)
    .filter(|e| e.date < today && e.date >= today - Duration::days(4))
    .collect();
  recent.sort_by(|a, b| b.date.cmp(&a.date));

  recent
    .iter()
    .filter_map(|e| {
      let key = e.name.to_lowercase().replace(' ', "_");
      selector::catalog_lookup(&key).map(|w| w.key.to_string())
    })
    .collect()
}

fn days_since_threshold_test(activities: &[Activity], today: NaiveDate) -> Option<i64> {
  activities
    .iter()
    .filter(|a| a.is_threshold_test())
    .map(|a| (today - a.started_at.date_naive()).num_days())
    .filter(|d| *d >= 0)
    .min()
}

/// ---------------------------------------------------------------------------
/// The Decision
/// ---------------------------------------------------------------------------

/// All five detector outputs, side by side. Each is derived independently;
/// the report layer is the only place they meet.
#[derive(Debug, Clone, Serialize)]
pub struct Advisories {
  pub deload: DeloadAdvisory,
  pub ramp_rate: RampRateAdvisory,
  pub volume: VolumeJumpAdvisory,
  pub illness: IllnessAdvisory,
  pub ftp_retest: FtpRetestAdvisory,
}

/// Terminal artifact of a run, handed to the upload and notification
/// collaborators and recorded in the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct DailyDecision {
  pub date: NaiveDate,
  pub metrics: FitnessMetrics,
  pub wellness: WellnessSummary,
  pub trajectory: FitnessTrajectory,
  pub phase: PhaseAssessment,
  pub load: LoadTargets,
  pub advisories: Advisories,
  pub feedback: AdaptiveFeedback,
  pub workout: WorkoutDecision,
}

/// Run the pipeline over one set of inputs. Infallible: every component
/// degrades internally, and a failed advisor call in one component never
/// affects another's.
pub async fn decide(inputs: &DecisionInputs, advisor: Option<&dyn Advisor>) -> DailyDecision {
  let summary = wellness::summarize(&inputs.wellness, inputs.wearable.as_ref());
  let metrics = FitnessMetrics::from_series(&inputs.fitness_series);
  let trajectory = trajectory::analyze(&inputs.fitness_series, &inputs.wellness, inputs.target_eftp);

  let weeks_out = goal_event(&inputs.events, inputs.today)
    .map(|event| phase::weeks_out_from_days((event.date - inputs.today).num_days()));

  let phase_assessment = phase::assess(weeks_out, &trajectory, advisor).await;

  let load_targets = load::advise(
    metrics.ctl,
    metrics.tsb,
    weeks_out,
    phase_assessment.phase,
    advisor,
  )
  .await;

  let totals = weekly_totals(&inputs.activities, inputs.today, 4);
  let target_weekly = (load_targets.weekly_tss_low + load_targets.weekly_tss_high) / 2.0;

  let advisories = Advisories {
    deload: detectors::deload_need(
      &totals,
      Some(target_weekly),
      metrics.ramp_rate,
      metrics.tsb,
      summary.sleep_debt_hours,
    ),
    ramp_rate: detectors::ramp_rate_warning(&trajectory.weekly_ctl_deltas),
    volume: detectors::volume_jump(
      totals.first().copied().unwrap_or(0.0),
      totals.get(1).copied().unwrap_or(0.0),
    ),
    illness: detectors::illness_pattern(&inputs.wellness),
    ftp_retest: detectors::ftp_retest(
      days_since_threshold_test(&inputs.activities, inputs.today),
      metrics.tsb,
      summary.recovery_status,
      weeks_out,
    ),
  };

  let adaptive = feedback::analyze(&inputs.activities, inputs.today, summary.recovery_status);

  let context = SelectionContext {
    phase: phase_assessment.phase,
    sport: inputs.sport,
    ctl: metrics.ctl,
    tsb: metrics.tsb,
    recovery: summary.recovery_status,
    intensity_modifier: summary.intensity_modifier,
    event_tomorrow: race_on(&inputs.events, inputs.today + Duration::days(1)),
    event_yesterday: race_on(&inputs.events, inputs.today - Duration::days(1)),
    recent_types: recent_workout_types(&inputs.events, inputs.today),
    adjustment_pct: adaptive.intensity_adjustment_pct,
    available_minutes: AVAILABLE_MINUTES,
  };

  let workout = selector::decide(&context, advisor).await;

  DailyDecision {
    date: inputs.today,
    metrics,
    wellness: summary,
    trajectory,
    phase: phase_assessment,
    load: load_targets,
    advisories,
    feedback: adaptive,
    workout,
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::EventCategory;
  use crate::test_utils::{
    activity_with_load, fitness_day, selection_context, wellness_window, MockFitnessService,
    MockRecoveryService, ScriptedAdvisor,
  };

  fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
  }

  fn race(date_str: &str, category: EventCategory) -> CalendarEvent {
    CalendarEvent {
      id: Some(1),
      date: date(date_str),
      name: "race".to_string(),
      category,
      description: None,
    }
  }

  fn healthy_inputs(today: &str) -> DecisionInputs {
    let today = date(today);
    DecisionInputs {
      today,
      wellness: wellness_window(&today.to_string(), 7, |_, r| {
        r.recovery_score = Some(72.0);
        r.sleep_hours = Some(7.8);
        r.hrv = Some(60.0);
        r.resting_hr = Some(48);
      }),
      wearable: None,
      fitness_series: vec![
        fitness_day("2024-02-23", 44.0, 46.0),
        fitness_day("2024-03-01", 47.0, 50.0),
        fitness_day("2024-03-08", 50.0, 52.0),
      ],
      activities: vec![
        activity_with_load("2024-03-04", 80.0),
        activity_with_load("2024-03-02", 90.0),
        activity_with_load("2024-02-27", 85.0),
      ],
      events: vec![race("2024-05-12", EventCategory::RaceA)],
      target_eftp: None,
      sport: Sport::Ride,
    }
  }

  #[tokio::test]
  async fn test_gather_is_fatal_only_when_wellness_unreachable() {
    let service = MockFitnessService {
      wellness: None,
      fitness: Some(Vec::new()),
      activities: Some(Vec::new()),
      events: Some(Vec::new()),
      ..Default::default()
    };

    let result = gather(&service, None, date("2024-03-08"), None, Sport::Ride).await;
    assert!(result.is_err());
  }

  #[tokio::test]
  async fn test_gather_degrades_secondary_outages_to_empty() {
    let service = MockFitnessService {
      wellness: Some(Vec::new()),
      fitness: None,
      activities: None,
      events: None,
      ..Default::default()
    };

    let inputs = gather(&service, None, date("2024-03-08"), None, Sport::Ride)
      .await
      .unwrap();

    assert!(inputs.fitness_series.is_empty());
    assert!(inputs.activities.is_empty());
    assert!(inputs.events.is_empty());
  }

  #[tokio::test]
  async fn test_gather_merges_wearable_sample() {
    let service = MockFitnessService {
      wellness: Some(Vec::new()),
      fitness: Some(Vec::new()),
      activities: Some(Vec::new()),
      events: Some(Vec::new()),
      ..Default::default()
    };
    let recovery = MockRecoveryService {
      sample: Some(RecoverySample {
        date: date("2024-03-08"),
        recovery_score: Some(80.0),
        hrv: None,
        resting_hr: None,
        sleep_hours: None,
      }),
    };

    let inputs = gather(&service, Some(&recovery), date("2024-03-08"), None, Sport::Ride)
      .await
      .unwrap();

    assert!(inputs.wearable.is_some());
    assert!(recovery_data_ready(&inputs));
  }

  #[test]
  fn test_recovery_not_ready_when_today_empty() {
    let mut inputs = healthy_inputs("2024-03-08");
    // Strip today's record of data
    inputs.wellness[0].recovery_score = None;
    inputs.wellness[0].sleep_hours = None;
    inputs.wellness[0].hrv = None;

    assert!(!recovery_data_ready(&inputs));
  }

  #[test]
  fn test_weekly_totals_exclude_current_week() {
    // Friday 2024-03-08; current week starts Monday 2024-03-04
    let activities = vec![
      activity_with_load("2024-03-06", 500.0), // this week: excluded
      activity_with_load("2024-03-01", 80.0),  // last week
      activity_with_load("2024-02-27", 70.0),  // last week
      activity_with_load("2024-02-21", 60.0),  // two weeks back
    ];

    let totals = weekly_totals(&activities, date("2024-03-08"), 4);
    assert_eq!(totals.len(), 4);
    assert_eq!(totals[0], 150.0);
    assert_eq!(totals[1], 60.0);
    assert_eq!(totals[2], 0.0);
  }

  #[test]
  fn test_goal_event_prefers_a_race() {
    let events = vec![
      race("2024-03-20", EventCategory::RaceC),
      race("2024-05-12", EventCategory::RaceA),
      race("2024-03-01", EventCategory::RaceA), // past
    ];

    let goal = goal_event(&events, date("2024-03-08")).unwrap();
    assert_eq!(goal.date, date("2024-05-12"));
  }

  #[test]
  fn test_goal_event_falls_back_to_any_race() {
    let events = vec![race("2024-03-20", EventCategory::RaceB)];
    let goal = goal_event(&events, date("2024-03-08")).unwrap();
    assert_eq!(goal.date, date("2024-03-20"));
  }

  #[tokio::test]
  async fn test_decide_produces_valid_decision_without_advisor() {
    let inputs = healthy_inputs("2024-03-08");
    let decision = decide(&inputs, None).await;

    assert_eq!(decision.date, date("2024-03-08"));
    assert!(selector::catalog_lookup(&decision.workout.workout_type).is_some());
    assert!((1..=5).contains(&decision.workout.max_intensity));
    assert!(!decision.workout.advisor_enhanced);
    assert!(!decision.phase.ai_enhanced);
  }

  #[tokio::test]
  async fn test_decide_is_idempotent_for_identical_inputs() {
    let inputs = healthy_inputs("2024-03-08");

    let first = decide(&inputs, None).await;
    let second = decide(&inputs, None).await;

    assert_eq!(
      serde_json::to_value(&first).unwrap(),
      serde_json::to_value(&second).unwrap()
    );
  }

  #[tokio::test]
  async fn test_deep_fatigue_caps_intensity_regardless_of_phase() {
    // ctl=50, atl=70 -> tsb=-20
    let mut inputs = healthy_inputs("2024-03-08");
    inputs.fitness_series = vec![
      fitness_day("2024-03-01", 50.0, 55.0),
      fitness_day("2024-03-08", 50.0, 70.0),
    ];

    let decision = decide(&inputs, None).await;
    assert_eq!(decision.metrics.tsb, Some(-20.0));
    assert!(decision.workout.max_intensity <= 2);
  }

  #[tokio::test]
  async fn test_empty_wellness_yields_unknown_not_error() {
    // Scenario: wellness feed empty for 7 days
    let mut inputs = healthy_inputs("2024-03-08");
    inputs.wellness = wellness_window("2024-03-08", 7, |_, _| {});

    let decision = decide(&inputs, None).await;
    assert_eq!(
      decision.wellness.recovery_status,
      crate::wellness::RecoveryStatus::Unknown
    );
  }

  #[tokio::test]
  async fn test_advisor_failure_never_contaminates_other_components() {
    // First advisor call (phase) succeeds; later calls fail
    let inputs = healthy_inputs("2024-03-08");
    let advisor = ScriptedAdvisor::with_responses(&[
      r#"{"phase": "build", "reasoning": "solid base, time to push", "confidence": "high"}"#,
    ]);

    let decision = decide(&inputs, Some(&advisor)).await;

    assert!(decision.phase.ai_enhanced);
    assert!(!decision.load.ai_enhanced);
    assert!(!decision.workout.advisor_enhanced);
    assert!(selector::catalog_lookup(&decision.workout.workout_type).is_some());
  }

  #[tokio::test]
  async fn test_race_yesterday_forces_rest() {
    let mut inputs = healthy_inputs("2024-03-08");
    inputs.events.push(race("2024-03-07", EventCategory::RaceB));

    let decision = decide(&inputs, None).await;
    assert!(decision.workout.is_rest_day);
  }

  #[test]
  fn test_selection_context_factory_is_neutral() {
    let ctx = selection_context();
    assert_eq!(selector::intensity_cap(&ctx), 3);
  }
}
