use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A completed activity from the fitness-tracking service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
  pub id: String,
  pub name: Option<String>,
  pub activity_type: String,
  pub started_at: DateTime<Utc>,
  pub duration_seconds: Option<i64>,
  /// Session training load (TSS or equivalent)
  pub training_load: Option<f64>,
  /// Subjective exertion 1-10
  pub perceived_exertion: Option<f64>,
  /// Subjective feel 1-5, lower is better
  pub feel: Option<i64>,
}

impl Activity {
  pub fn is_ride(&self) -> bool {
    self.activity_type.to_lowercase().contains("ride")
  }

  pub fn is_run(&self) -> bool {
    self.activity_type.to_lowercase().contains("run")
  }

  pub fn has_feedback(&self) -> bool {
    self.perceived_exertion.is_some() || self.feel.is_some()
  }

  /// Heuristic: the athlete logged this session as a threshold test.
  pub fn is_threshold_test(&self) -> bool {
    self
      .name
      .as_deref()
      .map(str::to_lowercase)
      .is_some_and(|n| n.contains("ftp") || n.contains("threshold test") || n.contains("ramp test"))
  }
}
