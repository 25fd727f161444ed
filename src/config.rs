//! Engine configuration, loaded from the environment.
//!
//! All collaborator credentials come from env vars (a `.env` file is loaded
//! at startup). The advisor and the wearable feed are optional; the fitness
//! service is required.

use std::env;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("Missing configuration: {0}")]
  Missing(String),

  #[error("Invalid configuration for {0}: {1}")]
  Invalid(String, String),
}

#[derive(Debug, Clone)]
pub struct Config {
  /// Fitness-tracking service (required)
  pub fitness_api_key: String,
  pub fitness_athlete_id: String,
  pub fitness_base_url: String,

  /// Generative advisor (optional; disabled when unset)
  pub advisor_api_key: Option<String>,

  /// Wearable-recovery feed (optional)
  pub wearable_token: Option<String>,
  pub wearable_base_url: String,

  /// Sqlite path for the run ledger
  pub database_url: String,

  /// Local hour after which a run proceeds even without fresh recovery data
  pub readiness_deadline_hour: u32,

  /// Primary sport for workout selection ("ride" or "run")
  pub primary_sport: String,

  /// Goal threshold power, if the athlete has set one
  pub target_eftp: Option<f64>,
}

impl Config {
  pub fn from_env() -> Result<Self, ConfigError> {
    let fitness_api_key = env::var("FITNESS_API_KEY")
      .map_err(|_| ConfigError::Missing("FITNESS_API_KEY".into()))?;
    let fitness_athlete_id = env::var("FITNESS_ATHLETE_ID")
      .map_err(|_| ConfigError::Missing("FITNESS_ATHLETE_ID".into()))?;

    let readiness_deadline_hour = match env::var("READINESS_DEADLINE_HOUR") {
      Ok(raw) => raw
        .parse::<u32>()
        .ok()
        .filter(|h| *h < 24)
        .ok_or_else(|| ConfigError::Invalid("READINESS_DEADLINE_HOUR".into(), raw))?,
      Err(_) => 18,
    };

    Ok(Self {
      fitness_api_key,
      fitness_athlete_id,
      fitness_base_url: env::var("FITNESS_BASE_URL")
        .unwrap_or_else(|_| "https://intervals.icu/api/v1".to_string()),
      advisor_api_key: env::var("ANTHROPIC_API_KEY").ok(),
      wearable_token: env::var("WEARABLE_ACCESS_TOKEN").ok(),
      wearable_base_url: env::var("WEARABLE_BASE_URL")
        .unwrap_or_else(|_| "https://api.prod.whoop.com/developer/v1".to_string()),
      database_url: env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://domestique.db?mode=rwc".to_string()),
      readiness_deadline_hour,
      primary_sport: env::var("PRIMARY_SPORT").unwrap_or_else(|_| "ride".to_string()),
      target_eftp: env::var("TARGET_EFTP").ok().and_then(|raw| raw.parse().ok()),
    })
  }

  pub fn advisor_enabled(&self) -> bool {
    self.advisor_api_key.is_some()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn test_from_env_requires_fitness_key() {
    temp_env::with_vars_unset(["FITNESS_API_KEY", "FITNESS_ATHLETE_ID"], || {
      let err = Config::from_env().unwrap_err();
      assert!(err.to_string().contains("FITNESS_API_KEY"));
    });
  }

  #[test]
  #[serial]
  fn test_from_env_defaults() {
    temp_env::with_vars(
      [
        ("FITNESS_API_KEY", Some("key")),
        ("FITNESS_ATHLETE_ID", Some("i12345")),
        ("ANTHROPIC_API_KEY", None),
        ("READINESS_DEADLINE_HOUR", None),
      ],
      || {
        let config = Config::from_env().unwrap();
        assert_eq!(config.readiness_deadline_hour, 18);
        assert!(!config.advisor_enabled());
        assert!(config.fitness_base_url.contains("intervals.icu"));
      },
    );
  }

  #[test]
  #[serial]
  fn test_from_env_rejects_bad_deadline() {
    temp_env::with_vars(
      [
        ("FITNESS_API_KEY", Some("key")),
        ("FITNESS_ATHLETE_ID", Some("i12345")),
        ("READINESS_DEADLINE_HOUR", Some("25")),
      ],
      || {
        assert!(Config::from_env().is_err());
      },
    );
  }
}
