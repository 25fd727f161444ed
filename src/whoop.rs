//! Wearable recovery integration
//!
//! Optional same-day recovery/sleep/HRV readings, fresher than the fitness
//! service's overnight sync. The Wellness Aggregator merges this source
//! preferentially when configured. Token refresh is handled outside the
//! engine; this client holds a static bearer token.

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::models::RecoverySample;

const REQUEST_TIMEOUT_SECS: u64 = 15;

/// ---------------------------------------------------------------------------
/// Error Handling
/// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
  #[error("HTTP request failed: {0}")]
  Request(String),

  #[error("Not authenticated with the recovery service")]
  NotAuthenticated,

  #[error("API error: {0}")]
  Api(String),
}

impl From<reqwest::Error> for RecoveryError {
  fn from(e: reqwest::Error) -> Self {
    RecoveryError::Request(e.to_string())
  }
}

/// ---------------------------------------------------------------------------
/// Service Trait
/// ---------------------------------------------------------------------------

/// The engine's view of the wearable collaborator. `Ok(None)` means "no
/// reading for that day yet", which the scheduler uses as its readiness
/// signal.
#[async_trait]
pub trait RecoveryService: Send + Sync {
  async fn latest_recovery(&self, date: NaiveDate)
    -> Result<Option<RecoverySample>, RecoveryError>;
}

/// ---------------------------------------------------------------------------
/// Wire Shapes
/// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RecoveryCollection {
  #[serde(default)]
  records: Vec<RecoveryRecordDto>,
}

#[derive(Debug, Deserialize)]
struct RecoveryRecordDto {
  created_at: Option<DateTime<Utc>>,
  score: Option<RecoveryScoreDto>,
}

#[derive(Debug, Deserialize)]
struct RecoveryScoreDto {
  recovery_score: Option<f64>,
  hrv_rmssd_milli: Option<f64>,
  resting_heart_rate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SleepCollection {
  #[serde(default)]
  records: Vec<SleepRecordDto>,
}

#[derive(Debug, Deserialize)]
struct SleepRecordDto {
  start: Option<DateTime<Utc>>,
  end: Option<DateTime<Utc>>,
}

/// ---------------------------------------------------------------------------
/// Client
/// ---------------------------------------------------------------------------

pub struct WhoopClient {
  client: Client,
  base_url: String,
  access_token: String,
}

impl WhoopClient {
  pub fn new(base_url: &str, access_token: &str) -> Result<Self, RecoveryError> {
    let client = Client::builder()
      .timeout(StdDuration::from_secs(REQUEST_TIMEOUT_SECS))
      .build()
      .map_err(|e| RecoveryError::Request(e.to_string()))?;

    Ok(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
      access_token: access_token.to_string(),
    })
  }

  async fn get_json<T: serde::de::DeserializeOwned>(
    &self,
    path: &str,
  ) -> Result<Option<T>, RecoveryError> {
    let response = self
      .client
      .get(format!("{}{}", self.base_url, path))
      .bearer_auth(&self.access_token)
      .send()
      .await?;

    if response.status() == reqwest::StatusCode::UNAUTHORIZED {
      return Err(RecoveryError::NotAuthenticated);
    }
    if !response.status().is_success() {
      let status = response.status();
      return Err(RecoveryError::Api(format!("HTTP {}", status)));
    }

    let body = response.text().await?;
    match serde_json::from_str(&body) {
      Ok(parsed) => Ok(Some(parsed)),
      Err(e) => {
        tracing::warn!(path, error = %e, "unparseable recovery payload");
        Ok(None)
      }
    }
  }
}

#[async_trait]
impl RecoveryService for WhoopClient {
  async fn latest_recovery(
    &self,
    date: NaiveDate,
  ) -> Result<Option<RecoverySample>, RecoveryError> {
    let recovery: Option<RecoveryCollection> = self.get_json("/recovery?limit=1").await?;

    let record = recovery.and_then(|c| c.records.into_iter().next());
    let Some(record) = record else {
      return Ok(None);
    };

    // Only a reading scored today counts as "today's data has arrived"
    if record.created_at.map(|t| t.date_naive()) != Some(date) {
      return Ok(None);
    }

    let score = record.score.unwrap_or(RecoveryScoreDto {
      recovery_score: None,
      hrv_rmssd_milli: None,
      resting_heart_rate: None,
    });

    // Last night's sleep, if the service has scored it
    let sleep: Option<SleepCollection> = self.get_json("/activity/sleep?limit=1").await.unwrap_or(None);
    let sleep_hours = sleep
      .and_then(|c| c.records.into_iter().next())
      .and_then(|r| match (r.start, r.end) {
        (Some(start), Some(end)) if end > start => {
          Some((end - start).num_minutes() as f64 / 60.0)
        }
        _ => None,
      });

    Ok(Some(RecoverySample {
      date,
      recovery_score: score.recovery_score,
      hrv: score.hrv_rmssd_milli,
      resting_hr: score.resting_heart_rate.map(|v| v.round() as i64),
      sleep_hours,
    }))
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
  }

  #[tokio::test]
  async fn test_same_day_recovery_parsed() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("GET", "/recovery?limit=1")
      .with_status(200)
      .with_body(
        r#"{"records": [{
          "created_at": "2024-03-08T06:10:00Z",
          "score": {"recovery_score": 81.0, "hrv_rmssd_milli": 64.0, "resting_heart_rate": 47.0}
        }]}"#,
      )
      .create_async()
      .await;
    server
      .mock("GET", "/activity/sleep?limit=1")
      .with_status(200)
      .with_body(
        r#"{"records": [{"start": "2024-03-07T22:30:00Z", "end": "2024-03-08T06:00:00Z"}]}"#,
      )
      .create_async()
      .await;

    let client = WhoopClient::new(&server.url(), "token").unwrap();
    let sample = client.latest_recovery(date("2024-03-08")).await.unwrap().unwrap();

    assert_eq!(sample.recovery_score, Some(81.0));
    assert_eq!(sample.resting_hr, Some(47));
    assert_eq!(sample.sleep_hours, Some(7.5));
  }

  #[tokio::test]
  async fn test_stale_reading_is_not_ready() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("GET", "/recovery?limit=1")
      .with_status(200)
      .with_body(
        r#"{"records": [{
          "created_at": "2024-03-07T06:10:00Z",
          "score": {"recovery_score": 55.0}
        }]}"#,
      )
      .create_async()
      .await;

    let client = WhoopClient::new(&server.url(), "token").unwrap();
    let sample = client.latest_recovery(date("2024-03-08")).await.unwrap();

    assert!(sample.is_none());
  }

  #[tokio::test]
  async fn test_malformed_payload_is_none() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("GET", "/recovery?limit=1")
      .with_status(200)
      .with_body("<html>maintenance</html>")
      .create_async()
      .await;

    let client = WhoopClient::new(&server.url(), "token").unwrap();
    let sample = client.latest_recovery(date("2024-03-08")).await.unwrap();

    assert!(sample.is_none());
  }

  #[tokio::test]
  async fn test_unauthorized_is_an_error() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("GET", "/recovery?limit=1")
      .with_status(401)
      .create_async()
      .await;

    let client = WhoopClient::new(&server.url(), "token").unwrap();
    assert!(matches!(
      client.latest_recovery(date("2024-03-08")).await,
      Err(RecoveryError::NotAuthenticated)
    ));
  }

  #[tokio::test]
  async fn test_missing_sleep_still_yields_sample() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("GET", "/recovery?limit=1")
      .with_status(200)
      .with_body(
        r#"{"records": [{"created_at": "2024-03-08T06:10:00Z", "score": {"recovery_score": 60.0}}]}"#,
      )
      .create_async()
      .await;
    server
      .mock("GET", "/activity/sleep?limit=1")
      .with_status(500)
      .create_async()
      .await;

    let client = WhoopClient::new(&server.url(), "token").unwrap();
    let sample = client.latest_recovery(date("2024-03-08")).await.unwrap().unwrap();

    assert_eq!(sample.recovery_score, Some(60.0));
    assert!(sample.sleep_hours.is_none());
  }
}
