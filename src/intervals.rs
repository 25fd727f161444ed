//! Fitness-tracking service client
//!
//! Read-only access to activities, daily wellness, modelled load, and the
//! race calendar, plus write access for the single generated-workout
//! placeholder. The wire shapes here are intervals.icu's; the rest of the
//! engine only sees the `FitnessService` trait and the domain models.
//!
//! Parsing is deliberately tolerant: a response that is not an array, or an
//! element that does not match the expected shape, degrades to an empty or
//! shorter result. Only transport and HTTP failures surface as errors.

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::models::{
  Activity, CalendarEvent, DailyFitness, EventCategory, PlannedWorkout, WellnessRecord,
};

const REQUEST_TIMEOUT_SECS: u64 = 20;

/// ---------------------------------------------------------------------------
/// Error Handling
/// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum FitnessError {
  #[error("HTTP request failed: {0}")]
  Request(String),

  #[error("Not authenticated with the fitness service")]
  NotAuthenticated,

  #[error("API error: {0}")]
  Api(String),

  #[error("Invalid base URL: {0}")]
  BadUrl(String),
}

impl From<reqwest::Error> for FitnessError {
  fn from(e: reqwest::Error) -> Self {
    FitnessError::Request(e.to_string())
  }
}

/// ---------------------------------------------------------------------------
/// Service Trait
/// ---------------------------------------------------------------------------

/// The engine's view of the fitness-tracking collaborator. All reads are
/// date-range filtered; all implementations must degrade malformed payloads
/// to empty results rather than failing.
#[async_trait]
pub trait FitnessService: Send + Sync {
  async fn activities(
    &self,
    oldest: NaiveDate,
    newest: NaiveDate,
  ) -> Result<Vec<Activity>, FitnessError>;

  async fn wellness(
    &self,
    oldest: NaiveDate,
    newest: NaiveDate,
  ) -> Result<Vec<WellnessRecord>, FitnessError>;

  async fn daily_fitness(
    &self,
    oldest: NaiveDate,
    newest: NaiveDate,
  ) -> Result<Vec<DailyFitness>, FitnessError>;

  async fn events(
    &self,
    oldest: NaiveDate,
    newest: NaiveDate,
  ) -> Result<Vec<CalendarEvent>, FitnessError>;

  /// Create or replace the engine's generated-workout placeholder for a day.
  async fn upsert_planned_workout(&self, planned: &PlannedWorkout) -> Result<(), FitnessError>;

  async fn delete_planned_workout(&self, event_id: i64) -> Result<(), FitnessError>;
}

/// ---------------------------------------------------------------------------
/// Wire Shapes
/// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ActivityDto {
  id: serde_json::Value,
  name: Option<String>,
  #[serde(rename = "type")]
  activity_type: Option<String>,
  start_date_local: Option<String>,
  moving_time: Option<i64>,
  icu_training_load: Option<f64>,
  icu_rpe: Option<f64>,
  feel: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SportInfoDto {
  eftp: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WellnessDto {
  /// The day, as YYYY-MM-DD
  id: String,
  ctl: Option<f64>,
  atl: Option<f64>,
  #[serde(rename = "sleepSecs")]
  sleep_secs: Option<f64>,
  #[serde(rename = "sleepQuality")]
  sleep_quality: Option<i64>,
  #[serde(rename = "restingHR")]
  resting_hr: Option<i64>,
  hrv: Option<f64>,
  readiness: Option<f64>,
  soreness: Option<i64>,
  fatigue: Option<i64>,
  stress: Option<i64>,
  mood: Option<i64>,
  #[serde(rename = "sportInfo", default)]
  sport_info: Vec<SportInfoDto>,
}

#[derive(Debug, Deserialize)]
struct EventDto {
  id: Option<i64>,
  start_date_local: Option<String>,
  category: Option<String>,
  name: Option<String>,
  description: Option<String>,
}

fn parse_event_category(raw: &str) -> EventCategory {
  match raw {
    "RACE_A" => EventCategory::RaceA,
    "RACE_B" => EventCategory::RaceB,
    "RACE_C" => EventCategory::RaceC,
    "WORKOUT" => EventCategory::Workout,
    "HOLIDAY" => EventCategory::Holiday,
    _ => EventCategory::Note,
  }
}

/// Local timestamps arrive without an offset; dates arrive bare.
fn parse_local_date(raw: &str) -> Option<NaiveDate> {
  if let Ok(date) = raw.parse::<NaiveDate>() {
    return Some(date);
  }
  NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
    .ok()
    .map(|dt| dt.date())
}

/// ---------------------------------------------------------------------------
/// Client
/// ---------------------------------------------------------------------------

pub struct IntervalsClient {
  client: Client,
  base_url: String,
  athlete_id: String,
  api_key: String,
}

impl IntervalsClient {
  pub fn new(base_url: &str, athlete_id: &str, api_key: &str) -> Result<Self, FitnessError> {
    let client = Client::builder()
      .timeout(StdDuration::from_secs(REQUEST_TIMEOUT_SECS))
      .build()
      .map_err(|e| FitnessError::Request(e.to_string()))?;

    Ok(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
      athlete_id: athlete_id.to_string(),
      api_key: api_key.to_string(),
    })
  }

  fn endpoint(
    &self,
    path: &str,
    oldest: Option<NaiveDate>,
    newest: Option<NaiveDate>,
  ) -> Result<Url, FitnessError> {
    let mut url = Url::parse(&format!(
      "{}/athlete/{}/{}",
      self.base_url, self.athlete_id, path
    ))
    .map_err(|e| FitnessError::BadUrl(e.to_string()))?;

    if let Some(oldest) = oldest {
      url.query_pairs_mut().append_pair("oldest", &oldest.to_string());
    }
    if let Some(newest) = newest {
      url.query_pairs_mut().append_pair("newest", &newest.to_string());
    }

    Ok(url)
  }

  /// Fetch a date-range endpoint and parse each array element tolerantly.
  /// Non-array payloads and unparseable elements are dropped, not fatal.
  async fn fetch_array<T: serde::de::DeserializeOwned>(
    &self,
    path: &str,
    oldest: NaiveDate,
    newest: NaiveDate,
  ) -> Result<Vec<T>, FitnessError> {
    let url = self.endpoint(path, Some(oldest), Some(newest))?;

    let response = self
      .client
      .get(url)
      .basic_auth("API_KEY", Some(&self.api_key))
      .send()
      .await?;

    if response.status() == reqwest::StatusCode::UNAUTHORIZED {
      return Err(FitnessError::NotAuthenticated);
    }
    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      return Err(FitnessError::Api(format!("HTTP {}: {}", status, body)));
    }

    let body = response.text().await?;
    let value: serde_json::Value = match serde_json::from_str(&body) {
      Ok(value) => value,
      Err(e) => {
        tracing::warn!(path, error = %e, "unparseable response body; treating as empty");
        return Ok(Vec::new());
      }
    };

    let Some(items) = value.as_array() else {
      tracing::warn!(path, "response was not an array; treating as empty");
      return Ok(Vec::new());
    };

    let parsed: Vec<T> = items
      .iter()
      .filter_map(|item| match serde_json::from_value(item.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
          tracing::warn!(path, error = %e, "skipping malformed element");
          None
        }
      })
      .collect();

    Ok(parsed)
  }

  async fn fetch_wellness_dtos(
    &self,
    oldest: NaiveDate,
    newest: NaiveDate,
  ) -> Result<Vec<WellnessDto>, FitnessError> {
    self.fetch_array("wellness", oldest, newest).await
  }
}

#[async_trait]
impl FitnessService for IntervalsClient {
  async fn activities(
    &self,
    oldest: NaiveDate,
    newest: NaiveDate,
  ) -> Result<Vec<Activity>, FitnessError> {
    let dtos: Vec<ActivityDto> = self.fetch_array("activities", oldest, newest).await?;

    let activities = dtos
      .into_iter()
      .filter_map(|dto| {
        let started_at = dto
          .start_date_local
          .as_deref()
          .and_then(|raw| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").ok())?
          .and_utc();

        Some(Activity {
          id: match dto.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
          },
          name: dto.name,
          activity_type: dto.activity_type.unwrap_or_else(|| "Unknown".to_string()),
          started_at,
          duration_seconds: dto.moving_time,
          training_load: dto.icu_training_load,
          perceived_exertion: dto.icu_rpe,
          feel: dto.feel,
        })
      })
      .collect();

    Ok(activities)
  }

  async fn wellness(
    &self,
    oldest: NaiveDate,
    newest: NaiveDate,
  ) -> Result<Vec<WellnessRecord>, FitnessError> {
    let dtos = self.fetch_wellness_dtos(oldest, newest).await?;

    let mut records: Vec<WellnessRecord> = dtos
      .into_iter()
      .filter_map(|dto| {
        let date = dto.id.parse::<NaiveDate>().ok()?;
        Some(WellnessRecord {
          date,
          sleep_hours: dto.sleep_secs.map(|s| s / 3600.0),
          sleep_quality: dto.sleep_quality,
          resting_hr: dto.resting_hr,
          hrv: dto.hrv,
          recovery_score: dto.readiness,
          soreness: dto.soreness,
          fatigue: dto.fatigue,
          stress: dto.stress,
          mood: dto.mood,
        })
      })
      .collect();

    // Consumers expect newest first
    records.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(records)
  }

  async fn daily_fitness(
    &self,
    oldest: NaiveDate,
    newest: NaiveDate,
  ) -> Result<Vec<DailyFitness>, FitnessError> {
    let dtos = self.fetch_wellness_dtos(oldest, newest).await?;

    let series = dtos
      .into_iter()
      .filter_map(|dto| {
        let date = dto.id.parse::<NaiveDate>().ok()?;
        Some(DailyFitness {
          date,
          ctl: dto.ctl,
          atl: dto.atl,
          eftp: dto.sport_info.iter().find_map(|s| s.eftp),
        })
      })
      .collect();

    Ok(series)
  }

  async fn events(
    &self,
    oldest: NaiveDate,
    newest: NaiveDate,
  ) -> Result<Vec<CalendarEvent>, FitnessError> {
    let dtos: Vec<EventDto> = self.fetch_array("events", oldest, newest).await?;

    let events = dtos
      .into_iter()
      .filter_map(|dto| {
        let date = dto.start_date_local.as_deref().and_then(parse_local_date)?;
        Some(CalendarEvent {
          id: dto.id,
          date,
          name: dto.name.unwrap_or_default(),
          category: parse_event_category(dto.category.as_deref().unwrap_or("")),
          description: dto.description,
        })
      })
      .collect();

    Ok(events)
  }

  async fn upsert_planned_workout(&self, planned: &PlannedWorkout) -> Result<(), FitnessError> {
    let url = self.endpoint("events", None, None)?;

    let body = serde_json::json!({
      "category": "WORKOUT",
      "start_date_local": format!("{}T00:00:00", planned.date),
      "name": planned.name,
      "description": planned.description,
    });

    let response = self
      .client
      .post(url)
      .basic_auth("API_KEY", Some(&self.api_key))
      .json(&body)
      .send()
      .await?;

    if response.status() == reqwest::StatusCode::UNAUTHORIZED {
      return Err(FitnessError::NotAuthenticated);
    }
    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      return Err(FitnessError::Api(format!("HTTP {}: {}", status, body)));
    }

    Ok(())
  }

  async fn delete_planned_workout(&self, event_id: i64) -> Result<(), FitnessError> {
    let url = Url::parse(&format!(
      "{}/athlete/{}/events/{}",
      self.base_url, self.athlete_id, event_id
    ))
    .map_err(|e| FitnessError::BadUrl(e.to_string()))?;

    let response = self
      .client
      .delete(url)
      .basic_auth("API_KEY", Some(&self.api_key))
      .send()
      .await?;

    if !response.status().is_success() {
      let status = response.status();
      return Err(FitnessError::Api(format!("HTTP {}", status)));
    }

    Ok(())
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
