//! Adaptive feedback analysis
//!
//! Scores recent subjective exertion and feel entries, plus the gap since
//! the last activity, into one intensity-adjustment recommendation. Sparse
//! feedback is a low-confidence result, not an error.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{Activity, Confidence};
use crate::wellness::RecoveryStatus;

/// ---------------------------------------------------------------------------
/// Tuning
/// ---------------------------------------------------------------------------

const FEEDBACK_WINDOW_DAYS: i64 = 14;
const MIN_FEEDBACK_ENTRIES: usize = 3;

/// Feel is recorded 1-5 with lower better; scoring uses goodness = 6 - feel
const FEEL_POOR_AVG: f64 = 2.0;
const FEEL_WEAK_AVG: f64 = 2.75;
const FEEL_GOOD_AVG: f64 = 3.5;

const EXERTION_HIGH_AVG: f64 = 8.0;
const EXERTION_LOW_AVG: f64 = 5.0;

const NEGATIVE_SHARE_LIMIT: f64 = 0.4;

/// Gap handling
const GAP_THRESHOLD_DAYS: i64 = 4;
const LONG_GAP_DAYS: i64 = 7;
const GAP_POOR_RECOVERY_MULT: f64 = 0.7;
const GAP_UNKNOWN_MULT: f64 = 0.8;
const LONG_GAP_EXTRA_MULT: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackRecommendation {
  Easier,
  Maintain,
  Harder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveFeedback {
  pub recommendation: FeedbackRecommendation,
  pub confidence: Confidence,
  /// Percent adjustment to planned intensity; negative means back off
  pub intensity_adjustment_pct: f64,
  pub reasoning: Vec<String>,
}

impl AdaptiveFeedback {
  fn insufficient(reasoning: Vec<String>, adjustment_pct: f64) -> Self {
    Self {
      recommendation: FeedbackRecommendation::Maintain,
      confidence: Confidence::Low,
      intensity_adjustment_pct: adjustment_pct,
      reasoning,
    }
  }
}

/// ---------------------------------------------------------------------------
/// Analysis
/// ---------------------------------------------------------------------------

/// Analyze subjective feedback in the trailing window and the current
/// training gap, combining the two by taking the more conservative
/// adjustment.
pub fn analyze(
  activities: &[Activity],
  today: NaiveDate,
  recovery: RecoveryStatus,
) -> AdaptiveFeedback {
  let mut window: Vec<&Activity> = activities
    .iter()
    .filter(|a| {
      let age = (today - a.started_at.date_naive()).num_days();
      (0..FEEDBACK_WINDOW_DAYS).contains(&age)
    })
    .collect();
  window.sort_by(|a, b| b.started_at.cmp(&a.started_at));

  let days_since_last = activities
    .iter()
    .map(|a| (today - a.started_at.date_naive()).num_days())
    .filter(|d| *d >= 0)
    .min();

  let (gap_pct, gap_reason) = gap_adjustment(days_since_last, recovery);

  let with_feedback: Vec<&&Activity> = window.iter().filter(|a| a.has_feedback()).collect();

  if with_feedback.len() < MIN_FEEDBACK_ENTRIES {
    let mut reasoning = vec![format!(
      "Only {} activities with feedback in the last {} days",
      with_feedback.len(),
      FEEDBACK_WINDOW_DAYS
    )];
    reasoning.extend(gap_reason);
    return AdaptiveFeedback::insufficient(reasoning, gap_pct.unwrap_or(0.0));
  }

  let mut score: f64 = 0.0;
  let mut reasoning = Vec::new();

  // Feel, normalized so higher is better
  let goodness: Vec<f64> = with_feedback
    .iter()
    .filter_map(|a| a.feel.map(|f| 6.0 - f as f64))
    .collect();

  if !goodness.is_empty() {
    let avg = goodness.iter().sum::<f64>() / goodness.len() as f64;
    if avg < FEEL_POOR_AVG {
      score -= 2.0;
      reasoning.push("Average feel over the window is poor".to_string());
    } else if avg < FEEL_WEAK_AVG {
      score -= 1.0;
      reasoning.push("Average feel over the window is below normal".to_string());
    } else if avg > FEEL_GOOD_AVG {
      score += 1.0;
      reasoning.push("Average feel over the window is strong".to_string());
    }

    let negative_share =
      goodness.iter().filter(|g| **g <= 2.0).count() as f64 / goodness.len() as f64;
    if negative_share > NEGATIVE_SHARE_LIMIT {
      score -= 1.0;
      reasoning.push(format!(
        "{:.0}% of recent sessions felt bad",
        negative_share * 100.0
      ));
    }

    // Direction of the last three sessions, oldest to newest
    if goodness.len() >= 3 {
      let newest = goodness[0];
      let oldest = goodness[2];
      if newest < oldest {
        score -= 1.0;
        reasoning.push("Feel is trending worse across the last three sessions".to_string());
      } else if newest > oldest {
        score += 0.5;
        reasoning.push("Feel is trending better across the last three sessions".to_string());
      }
    }
  }

  let exertion: Vec<f64> = with_feedback.iter().filter_map(|a| a.perceived_exertion).collect();
  if !exertion.is_empty() {
    let avg = exertion.iter().sum::<f64>() / exertion.len() as f64;
    if avg > EXERTION_HIGH_AVG {
      score -= 1.0;
      reasoning.push(format!("Average perceived exertion {:.1} is very high", avg));
    } else if avg < EXERTION_LOW_AVG {
      score += 1.0;
      reasoning.push(format!("Average perceived exertion {:.1} leaves headroom", avg));
    }
  }

  let (recommendation, feedback_pct): (FeedbackRecommendation, f64) = if score <= -2.0 {
    (FeedbackRecommendation::Easier, -10.0)
  } else if score <= -1.0 {
    (FeedbackRecommendation::Easier, -5.0)
  } else if score >= 2.0 {
    (FeedbackRecommendation::Harder, 5.0)
  } else if score >= 1.0 {
    (FeedbackRecommendation::Harder, 3.0)
  } else {
    (FeedbackRecommendation::Maintain, 0.0)
  };

  // The more conservative of the two signals wins; no gap means no
  // constraint from that side
  let intensity_adjustment_pct = match gap_pct {
    Some(gap) => feedback_pct.min(gap),
    None => feedback_pct,
  };
  reasoning.extend(gap_reason);

  let confidence = if with_feedback.len() >= 6 {
    Confidence::High
  } else {
    Confidence::Medium
  };

  AdaptiveFeedback {
    recommendation,
    confidence,
    intensity_adjustment_pct,
    reasoning,
  }
}

/// Interpret a training gap in light of concurrent recovery: a rested
/// athlete returning after days off is fresh; one with poor recovery is
/// probably returning from illness. `None` means no gap worth reacting to.
fn gap_adjustment(
  days_since_last: Option<i64>,
  recovery: RecoveryStatus,
) -> (Option<f64>, Vec<String>) {
  let Some(days) = days_since_last else {
    return (None, vec!["No recent activity on record".to_string()]);
  };

  if days < GAP_THRESHOLD_DAYS {
    return (None, Vec::new());
  }

  let (mut multiplier, label) = match recovery {
    RecoveryStatus::Green => (1.0, "returning fresh"),
    RecoveryStatus::Yellow | RecoveryStatus::Red => {
      (GAP_POOR_RECOVERY_MULT, "possibly returning from illness")
    }
    RecoveryStatus::Unknown => (GAP_UNKNOWN_MULT, "returning with unknown readiness"),
  };

  if days >= LONG_GAP_DAYS {
    multiplier *= LONG_GAP_EXTRA_MULT;
  }

  let pct = (multiplier - 1.0) * 100.0;
  let reason = format!("{} day gap since the last activity: {}", days, label);

  (Some(pct), vec![reason])
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::activity_with_feedback;

  fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
  }

  #[test]
  fn test_insufficient_feedback() {
    let activities = vec![
      activity_with_feedback("2024-03-07", Some(6.0), Some(3)),
      activity_with_feedback("2024-03-05", None, None),
    ];

    let result = analyze(&activities, date("2024-03-08"), RecoveryStatus::Green);
    assert_eq!(result.recommendation, FeedbackRecommendation::Maintain);
    assert_eq!(result.confidence, Confidence::Low);
    assert_eq!(result.intensity_adjustment_pct, 0.0);
  }

  #[test]
  fn test_bad_feels_and_high_exertion_recommend_easier() {
    // Scenario: feels [5,5,4,5,3] (lower is better) with exertion ~8.5
    let feels = [5, 5, 4, 5, 3];
    let activities: Vec<Activity> = feels
      .iter()
      .enumerate()
      .map(|(i, feel)| {
        activity_with_feedback(
          &format!("2024-03-{:02}", 7 - i),
          Some(8.5),
          Some(*feel),
        )
      })
      .collect();

    let result = analyze(&activities, date("2024-03-08"), RecoveryStatus::Green);
    assert_eq!(result.recommendation, FeedbackRecommendation::Easier);
    assert_eq!(result.intensity_adjustment_pct, -10.0);
  }

  #[test]
  fn test_strong_feels_and_low_exertion_recommend_harder() {
    let activities: Vec<Activity> = (0..5)
      .map(|i| {
        activity_with_feedback(&format!("2024-03-{:02}", 7 - i), Some(4.0), Some(1))
      })
      .collect();

    let result = analyze(&activities, date("2024-03-08"), RecoveryStatus::Green);
    assert_eq!(result.recommendation, FeedbackRecommendation::Harder);
    assert!(result.intensity_adjustment_pct > 0.0);
  }

  #[test]
  fn test_gap_with_poor_recovery_is_conservative() {
    // Plenty of positive feedback, but a 5-day gap with red recovery
    let activities: Vec<Activity> = ["2024-03-03", "2024-03-02", "2024-03-01", "2024-02-29"]
      .iter()
      .map(|d| activity_with_feedback(d, Some(4.0), Some(1)))
      .collect();

    let result = analyze(&activities, date("2024-03-08"), RecoveryStatus::Red);
    // Gap multiplier 0.7 -> -30%, which beats the +adjustment from feedback
    assert_eq!(result.intensity_adjustment_pct, -30.0);
  }

  #[test]
  fn test_long_gap_unknown_recovery() {
    let activities = vec![activity_with_feedback("2024-02-28", Some(5.0), Some(3))];

    let result = analyze(&activities, date("2024-03-08"), RecoveryStatus::Unknown);
    // 0.8 x 0.9 = 0.72 -> -28%
    assert!((result.intensity_adjustment_pct - -28.0).abs() < 1e-9);
    assert_eq!(result.confidence, Confidence::Low);
  }

  #[test]
  fn test_gap_with_green_recovery_is_fresh() {
    let activities: Vec<Activity> = ["2024-03-03", "2024-03-02", "2024-03-01", "2024-02-29"]
      .iter()
      .map(|d| activity_with_feedback(d, Some(6.0), Some(3)))
      .collect();

    let result = analyze(&activities, date("2024-03-08"), RecoveryStatus::Green);
    assert_eq!(result.intensity_adjustment_pct, 0.0);
    assert!(result.reasoning.iter().any(|r| r.contains("fresh")));
  }

  #[test]
  fn test_no_activities_at_all() {
    let result = analyze(&[], date("2024-03-08"), RecoveryStatus::Green);
    assert_eq!(result.recommendation, FeedbackRecommendation::Maintain);
    assert_eq!(result.confidence, Confidence::Low);
  }

  #[test]
  fn test_improving_trend_nudges_score_up() {
    // Feels improving newest-first: [1, 3, 4] (goodness 5, 3, 2)
    let activities = vec![
      activity_with_feedback("2024-03-07", Some(6.0), Some(1)),
      activity_with_feedback("2024-03-06", Some(6.0), Some(3)),
      activity_with_feedback("2024-03-05", Some(6.0), Some(4)),
    ];

    let result = analyze(&activities, date("2024-03-08"), RecoveryStatus::Green);
    assert!(result
      .reasoning
      .iter()
      .any(|r| r.contains("trending better")));
  }
}
