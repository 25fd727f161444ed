//! Test utilities and helpers
//!
//! Common test infrastructure: in-memory database setup, mock data
//! factories for the domain models, scripted collaborator doubles, and
//! helper assertions.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use sqlx::SqlitePool;

use crate::advisor::{Advisor, AdvisorError};
use crate::intervals::{FitnessError, FitnessService};
use crate::models::{
  Activity, CalendarEvent, DailyFitness, PlannedWorkout, RecoverySample, WellnessRecord,
};
use crate::phase::Phase;
use crate::selector::{SelectionContext, Sport};
use crate::wellness::RecoveryStatus;
use crate::whoop::{RecoveryError, RecoveryService};

/// ---------------------------------------------------------------------------
/// Database Test Utilities
/// ---------------------------------------------------------------------------

/// Create an in-memory SQLite database for testing, with migrations applied.
///
/// Uses max_connections(1) to prevent multiple pool connections from creating
/// isolated in-memory databases, which would cause intermittent test failures
pub async fn setup_test_db() -> SqlitePool {
  let pool = sqlx::sqlite::SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .expect("Failed to create in-memory database");

  sqlx::migrate!("./migrations")
    .run(&pool)
    .await
    .expect("Failed to run migrations");

  pool
}

pub async fn teardown_test_db(pool: SqlitePool) {
  pool.close().await;
}

/// ---------------------------------------------------------------------------
/// Mock Data Factories
/// ---------------------------------------------------------------------------

pub fn wellness_record(date: &str) -> WellnessRecord {
  WellnessRecord::empty(date.parse().expect("valid date literal"))
}

/// A window of `days` records, newest first, starting at `newest`. The
/// closure customizes each record; index 0 is the newest day.
pub fn wellness_window(
  newest: &str,
  days: usize,
  customize: impl Fn(usize, &mut WellnessRecord),
) -> Vec<WellnessRecord> {
  let newest: NaiveDate = newest.parse().expect("valid date literal");
  (0..days)
    .map(|i| {
      let mut record = WellnessRecord::empty(newest - Duration::days(i as i64));
      customize(i, &mut record);
      record
    })
    .collect()
}

/// A daily fitness series of `days` entries starting at `start` (oldest
/// first). The closure maps day index to (ctl, eftp).
pub fn fitness_series(
  start: &str,
  days: usize,
  values: impl Fn(usize) -> (Option<f64>, Option<f64>),
) -> Vec<DailyFitness> {
  let start: NaiveDate = start.parse().expect("valid date literal");
  (0..days)
    .map(|i| {
      let (ctl, eftp) = values(i);
      DailyFitness {
        date: start + Duration::days(i as i64),
        ctl,
        atl: None,
        eftp,
      }
    })
    .collect()
}

pub fn fitness_day(date: &str, ctl: f64, atl: f64) -> DailyFitness {
  DailyFitness {
    date: date.parse().expect("valid date literal"),
    ctl: Some(ctl),
    atl: Some(atl),
    eftp: None,
  }
}

/// An activity on `date` carrying subjective feedback.
pub fn activity_with_feedback(
  date: &str,
  perceived_exertion: Option<f64>,
  feel: Option<i64>,
) -> Activity {
  let date: NaiveDate = date.parse().expect("valid date literal");
  Activity {
    id: format!("test_{}", date),
    name: Some("Morning Ride".to_string()),
    activity_type: "Ride".to_string(),
    started_at: date.and_hms_opt(8, 0, 0).expect("valid time").and_utc(),
    duration_seconds: Some(3600),
    training_load: Some(60.0),
    perceived_exertion,
    feel,
  }
}

/// An activity on `date` with a given training load and no feedback.
pub fn activity_with_load(date: &str, training_load: f64) -> Activity {
  let mut activity = activity_with_feedback(date, None, None);
  activity.training_load = Some(training_load);
  activity
}

/// A neutral selection context: base phase, healthy athlete, empty calendar.
pub fn selection_context() -> SelectionContext {
  SelectionContext {
    phase: Phase::Base,
    sport: Sport::Ride,
    ctl: Some(50.0),
    tsb: Some(0.0),
    recovery: RecoveryStatus::Green,
    intensity_modifier: 1.0,
    event_tomorrow: None,
    event_yesterday: None,
    recent_types: Vec::new(),
    adjustment_pct: 0.0,
    available_minutes: (45, 90),
  }
}

/// ---------------------------------------------------------------------------
/// Scripted Collaborators
/// ---------------------------------------------------------------------------

/// An advisor double that replays canned responses. With a single response
/// it repeats it for every call; with a queue it pops responses in order and
/// fails once exhausted.
pub struct ScriptedAdvisor {
  responses: Mutex<Vec<String>>,
  repeat: Option<String>,
  fail: bool,
}

impl ScriptedAdvisor {
  pub fn with_response(response: &str) -> Self {
    Self {
      responses: Mutex::new(Vec::new()),
      repeat: Some(response.to_string()),
      fail: false,
    }
  }

  pub fn with_responses(responses: &[&str]) -> Self {
    Self {
      responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
      repeat: None,
      fail: false,
    }
  }

  pub fn failing() -> Self {
    Self {
      responses: Mutex::new(Vec::new()),
      repeat: None,
      fail: true,
    }
  }
}

#[async_trait]
impl Advisor for ScriptedAdvisor {
  async fn complete(
    &self,
    _system_prompt: &str,
    _user_message: &str,
    _max_tokens: u32,
  ) -> Result<String, AdvisorError> {
    if self.fail {
      return Err(AdvisorError::Request("scripted failure".to_string()));
    }
    if let Some(next) = self.responses.lock().expect("advisor lock").pop() {
      return Ok(next);
    }
    match &self.repeat {
      Some(response) => Ok(response.clone()),
      None => Err(AdvisorError::Request("script exhausted".to_string())),
    }
  }
}

/// A fitness service backed by canned data. A `None` field simulates that
/// endpoint being unreachable.
#[derive(Default)]
pub struct MockFitnessService {
  pub wellness: Option<Vec<WellnessRecord>>,
  pub fitness: Option<Vec<DailyFitness>>,
  pub activities: Option<Vec<Activity>>,
  pub events: Option<Vec<CalendarEvent>>,
  pub uploaded: Mutex<Vec<PlannedWorkout>>,
}

impl MockFitnessService {
  fn scripted<T: Clone>(data: &Option<Vec<T>>) -> Result<Vec<T>, FitnessError> {
    data
      .clone()
      .ok_or_else(|| FitnessError::Request("scripted outage".to_string()))
  }
}

#[async_trait]
impl FitnessService for MockFitnessService {
  async fn activities(
    &self,
    _oldest: NaiveDate,
    _newest: NaiveDate,
  ) -> Result<Vec<Activity>, FitnessError> {
    Self::scripted(&self.activities)
  }

  async fn wellness(
    &self,
    _oldest: NaiveDate,
    _newest: NaiveDate,
  ) -> Result<Vec<WellnessRecord>, FitnessError> {
    Self::scripted(&self.wellness)
  }

  async fn daily_fitness(
    &self,
    _oldest: NaiveDate,
    _newest: NaiveDate,
  ) -> Result<Vec<DailyFitness>, FitnessError> {
    Self::scripted(&self.fitness)
  }

  async fn events(
    &self,
    _oldest: NaiveDate,
    _newest: NaiveDate,
  ) -> Result<Vec<CalendarEvent>, FitnessError> {
    Self::scripted(&self.events)
  }

  async fn upsert_planned_workout(&self, planned: &PlannedWorkout) -> Result<(), FitnessError> {
    self.uploaded.lock().expect("upload lock").push(planned.clone());
    Ok(())
  }

  async fn delete_planned_workout(&self, _event_id: i64) -> Result<(), FitnessError> {
    Ok(())
  }
}

/// A recovery service double with at most one sample.
#[derive(Default)]
pub struct MockRecoveryService {
  pub sample: Option<RecoverySample>,
}

#[async_trait]
impl RecoveryService for MockRecoveryService {
  async fn latest_recovery(
    &self,
    date: NaiveDate,
  ) -> Result<Option<RecoverySample>, RecoveryError> {
    Ok(self.sample.clone().filter(|s| s.date == date))
  }
}

/// ---------------------------------------------------------------------------
/// Test Macros
/// ---------------------------------------------------------------------------

/// Assert two floats are approximately equal within a tolerance
#[macro_export]
macro_rules! assert_approx_eq {
  ($left:expr, $right:expr, $tolerance:expr) => {
    let diff = ($left - $right).abs();
    assert!(
      diff < $tolerance,
      "Values not approximately equal: {} vs {} (diff: {}, tolerance: {})",
      $left,
      $right,
      diff,
      $tolerance
    );
  };
}

/// ---------------------------------------------------------------------------
/// Tests for Test Utilities
/// ---------------------------------------------------------------------------
