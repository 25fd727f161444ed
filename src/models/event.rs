use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Event categories as the calendar collaborator reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
  RaceA,
  RaceB,
  RaceC,
  Workout,
  Note,
  Holiday,
}

impl EventCategory {
  pub fn is_race(&self) -> bool {
    matches!(self, Self::RaceA | Self::RaceB | Self::RaceC)
  }

  /// Priority rank for races: A = 0 (highest), C = 2 (lowest).
  pub fn race_priority(&self) -> Option<u8> {
    match self {
      Self::RaceA => Some(0),
      Self::RaceB => Some(1),
      Self::RaceC => Some(2),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
  pub id: Option<i64>,
  pub date: NaiveDate,
  pub name: String,
  pub category: EventCategory,
  pub description: Option<String>,
}

/// The single placeholder event the engine writes back to the calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedWorkout {
  pub date: NaiveDate,
  pub name: String,
  pub description: String,
}
