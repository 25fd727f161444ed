use serde::{Deserialize, Serialize};

pub mod activity;
pub mod event;
pub mod fitness;
pub mod wellness;

pub use activity::Activity;
pub use event::{CalendarEvent, EventCategory, PlannedWorkout};
pub use fitness::{DailyFitness, FitnessMetrics};
pub use wellness::{RecoverySample, WellnessRecord};

/// How much weight downstream consumers should give a derived value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
  Low,
  Medium,
  High,
}
