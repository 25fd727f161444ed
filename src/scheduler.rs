//! Run scheduling
//!
//! At most one successful decision per calendar day. A tick checks the run
//! ledger, gates on today's recovery data having arrived (until the
//! configured deadline hour), runs the pipeline, uploads the placeholder,
//! notifies, and only then marks the day complete. A failed tick leaves the
//! ledger unset so the next hourly tick retries.

use chrono::{Local, NaiveDate, Timelike};

use crate::advisor::Advisor;
use crate::db::RunLedger;
use crate::intervals::FitnessService;
use crate::models::PlannedWorkout;
use crate::notify::Notifier;
use crate::pipeline::{self, DailyDecision, PipelineError};
use crate::selector::Sport;
use crate::whoop::RecoveryService;

const TICK_INTERVAL_SECS: u64 = 3600;

/// What a single tick did.
#[derive(Debug)]
pub enum TickOutcome {
  /// A full run completed and was recorded
  Ran(Box<DailyDecision>),
  /// The ledger already holds today
  AlreadyRan,
  /// Recovery data has not arrived and the deadline hour has not passed
  NotReady,
}

/// Collaborators and knobs for a tick, wired once at startup.
pub struct Engine<'a> {
  pub fitness: &'a dyn FitnessService,
  pub wearable: Option<&'a dyn RecoveryService>,
  pub advisor: Option<&'a dyn Advisor>,
  pub ledger: &'a dyn RunLedger,
  pub notifier: &'a dyn Notifier,
  pub target_eftp: Option<f64>,
  pub sport: Sport,
  /// Local hour after which a run proceeds without fresh recovery data
  pub readiness_deadline_hour: u32,
}

impl Engine<'_> {
  /// Evaluate one scheduled tick for `today` at local hour `hour`.
  /// `force` skips both the ledger check and the readiness gate.
  pub async fn tick(
    &self,
    today: NaiveDate,
    hour: u32,
    force: bool,
  ) -> Result<TickOutcome, PipelineError> {
    if !force
      && self
        .ledger
        .has_run_on(today)
        .await
        .map_err(PipelineError::Ledger)?
    {
      return Ok(TickOutcome::AlreadyRan);
    }

    let inputs = pipeline::gather(
      self.fitness,
      self.wearable,
      today,
      self.target_eftp,
      self.sport,
    )
    .await?;

    if !force && !pipeline::recovery_data_ready(&inputs) && hour < self.readiness_deadline_hour {
      tracing::info!(hour, "today's recovery data has not arrived; will retry");
      return Ok(TickOutcome::NotReady);
    }

    let decision = pipeline::decide(&inputs, self.advisor).await;

    // Best effort: a calendar hiccup must not cost the day's report
    if !decision.workout.is_rest_day {
      let planned = PlannedWorkout {
        date: today,
        name: decision.workout.workout_type.clone(),
        description: decision.workout.reason.clone(),
      };
      if let Err(e) = self.fitness.upsert_planned_workout(&planned).await {
        tracing::warn!(error = %e, "failed to upload the planned workout");
      }
    }

    self.notifier.notify(&decision).await;

    let decision_json =
      serde_json::to_string(&decision).unwrap_or_else(|_| "{}".to_string());
    self
      .ledger
      .mark_complete(today, &decision_json)
      .await
      .map_err(PipelineError::Ledger)?;

    Ok(TickOutcome::Ran(Box::new(decision)))
  }

  /// Hourly loop. Runs forever; each failed or not-ready tick is retried on
  /// the next interval, and completed days short-circuit on the ledger.
  pub async fn run_daemon(&self) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(TICK_INTERVAL_SECS));

    loop {
      interval.tick().await;

      let now = Local::now();
      match self.tick(now.date_naive(), now.hour(), false).await {
        Ok(TickOutcome::Ran(decision)) => {
          tracing::info!(workout = %decision.workout.workout_type, "daily decision recorded");
        }
        Ok(TickOutcome::AlreadyRan) => {
          tracing::debug!("already ran today");
        }
        Ok(TickOutcome::NotReady) => {}
        Err(e) => {
          tracing::error!(error = %e, "tick failed; will retry next hour");
        }
      }
    }
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::{RunLedger, SqliteRunLedger};
  use crate::notify::LogNotifier;
  use crate::test_utils::{
    fitness_day, setup_test_db, wellness_window, MockFitnessService,
  };

  fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
  }

  fn healthy_service(today: &str) -> MockFitnessService {
    MockFitnessService {
      wellness: Some(wellness_window(today, 7, |_, r| {
        r.recovery_score = Some(70.0);
        r.sleep_hours = Some(7.5);
      })),
      fitness: Some(vec![
        fitness_day("2024-03-01", 48.0, 50.0),
        fitness_day("2024-03-08", 50.0, 52.0),
      ]),
      activities: Some(Vec::new()),
      events: Some(Vec::new()),
      ..Default::default()
    }
  }

  async fn engine_parts() -> (MockFitnessService, SqliteRunLedger) {
    let pool = setup_test_db().await;
    (healthy_service("2024-03-08"), SqliteRunLedger::new(pool))
  }

  #[tokio::test]
  async fn test_successful_tick_marks_ledger_and_uploads() {
    let (service, ledger) = engine_parts().await;
    let engine = Engine {
      fitness: &service,
      wearable: None,
      advisor: None,
      ledger: &ledger,
      notifier: &LogNotifier,
      target_eftp: None,
      sport: Sport::Ride,
      readiness_deadline_hour: 18,
    };

    let outcome = engine.tick(date("2024-03-08"), 9, false).await.unwrap();

    assert!(matches!(outcome, TickOutcome::Ran(_)));
    assert!(ledger.has_run_on(date("2024-03-08")).await.unwrap());
    assert_eq!(service.uploaded.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_second_tick_short_circuits() {
    let (service, ledger) = engine_parts().await;
    let engine = Engine {
      fitness: &service,
      wearable: None,
      advisor: None,
      ledger: &ledger,
      notifier: &LogNotifier,
      target_eftp: None,
      sport: Sport::Ride,
      readiness_deadline_hour: 18,
    };

    engine.tick(date("2024-03-08"), 9, false).await.unwrap();
    let second = engine.tick(date("2024-03-08"), 10, false).await.unwrap();

    assert!(matches!(second, TickOutcome::AlreadyRan));
    assert_eq!(service.uploaded.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_not_ready_before_deadline_leaves_ledger_unset() {
    let pool = setup_test_db().await;
    let ledger = SqliteRunLedger::new(pool);
    let mut service = healthy_service("2024-03-08");
    // No recovery data for today
    service.wellness = Some(wellness_window("2024-03-08", 7, |i, r| {
      if i > 0 {
        r.recovery_score = Some(70.0);
      }
    }));

    let engine = Engine {
      fitness: &service,
      wearable: None,
      advisor: None,
      ledger: &ledger,
      notifier: &LogNotifier,
      target_eftp: None,
      sport: Sport::Ride,
      readiness_deadline_hour: 18,
    };

    let outcome = engine.tick(date("2024-03-08"), 9, false).await.unwrap();
    assert!(matches!(outcome, TickOutcome::NotReady));
    assert!(!ledger.has_run_on(date("2024-03-08")).await.unwrap());

    // Past the deadline the run proceeds anyway
    let outcome = engine.tick(date("2024-03-08"), 19, false).await.unwrap();
    assert!(matches!(outcome, TickOutcome::Ran(_)));
  }

  #[tokio::test]
  async fn test_fatal_gather_leaves_ledger_unset() {
    let pool = setup_test_db().await;
    let ledger = SqliteRunLedger::new(pool);
    let service = MockFitnessService::default(); // every endpoint down

    let engine = Engine {
      fitness: &service,
      wearable: None,
      advisor: None,
      ledger: &ledger,
      notifier: &LogNotifier,
      target_eftp: None,
      sport: Sport::Ride,
      readiness_deadline_hour: 18,
    };

    assert!(engine.tick(date("2024-03-08"), 9, false).await.is_err());
    assert!(!ledger.has_run_on(date("2024-03-08")).await.unwrap());
  }

  #[tokio::test]
  async fn test_force_skips_ledger_and_readiness() {
    let (service, ledger) = engine_parts().await;
    let engine = Engine {
      fitness: &service,
      wearable: None,
      advisor: None,
      ledger: &ledger,
      notifier: &LogNotifier,
      target_eftp: None,
      sport: Sport::Ride,
      readiness_deadline_hour: 18,
    };

    engine.tick(date("2024-03-08"), 9, false).await.unwrap();
    let outcome = engine.tick(date("2024-03-08"), 9, true).await.unwrap();
    assert!(matches!(outcome, TickOutcome::Ran(_)));
  }
}
