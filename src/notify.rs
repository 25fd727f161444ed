//! Daily report composition and delivery
//!
//! The engine's contract to the notification collaborator is the set of
//! fields on `DailyDecision`, not any particular rendering. The shipped
//! implementation renders a plain-text report into the structured log;
//! email or chat delivery would implement the same trait.

use async_trait::async_trait;

use crate::pipeline::DailyDecision;

#[async_trait]
pub trait Notifier: Send + Sync {
  /// Deliver the daily report. Failures are the implementation's problem;
  /// the pipeline treats delivery as best-effort.
  async fn notify(&self, decision: &DailyDecision);
}

/// Renders the report to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
  async fn notify(&self, decision: &DailyDecision) {
    for line in format_report(decision).lines() {
      tracing::info!("{}", line);
    }
  }
}

/// Plain-text daily report, shared by the log notifier and the preview
/// command.
pub fn format_report(decision: &DailyDecision) -> String {
  let mut out = String::new();

  out.push_str(&format!("Daily decision for {}\n", decision.date));
  out.push_str(&format!(
    "  Phase: {:?} (calendar {:?}, weeks out {:?})\n",
    decision.phase.phase, decision.phase.deterministic_phase, decision.phase.weeks_out
  ));
  out.push_str(&format!("  Focus: {}\n", decision.phase.focus));

  out.push_str(&format!(
    "  Fitness: ctl {} / atl {} / tsb {} / ramp {}\n",
    fmt_opt(decision.metrics.ctl),
    fmt_opt(decision.metrics.atl),
    fmt_opt(decision.metrics.tsb),
    fmt_opt(decision.metrics.ramp_rate),
  ));
  out.push_str(&format!(
    "  Recovery: {:?}, sleep {:?}, modifier {:.2}\n",
    decision.wellness.recovery_status,
    decision.wellness.sleep_status,
    decision.wellness.intensity_modifier
  ));

  out.push_str(&format!(
    "  Weekly load target: {:.0}-{:.0} TSS ({:?})\n",
    decision.load.weekly_tss_low, decision.load.weekly_tss_high, decision.load.label
  ));
  if let Some(warning) = &decision.load.warning {
    out.push_str(&format!("  Load warning: {}\n", warning));
  }

  let advisories = &decision.advisories;
  if advisories.deload.needed {
    out.push_str(&format!(
      "  Deload ({:?}): {}\n",
      advisories.deload.severity, advisories.deload.recommendation
    ));
  }
  if advisories.ramp_rate.detected {
    out.push_str(&format!(
      "  Ramp rate ({:?}): {}\n",
      advisories.ramp_rate.severity, advisories.ramp_rate.recommendation
    ));
  }
  if advisories.volume.detected || advisories.volume.possible_illness {
    out.push_str(&format!("  Volume: {}\n", advisories.volume.recommendation));
  }
  if advisories.illness.detected {
    out.push_str(&format!(
      "  Illness ({:?}): {}\n",
      advisories.illness.severity, advisories.illness.recommendation
    ));
  }
  if advisories.ftp_retest.suggested {
    out.push_str(&format!("  Retest: {}\n", advisories.ftp_retest.recommendation));
  }

  out.push_str(&format!(
    "  Feedback: {:?} ({:?}), adjustment {:+.0}%\n",
    decision.feedback.recommendation,
    decision.feedback.confidence,
    decision.feedback.intensity_adjustment_pct
  ));

  if decision.workout.is_rest_day {
    out.push_str(&format!("  Today: REST - {}\n", decision.workout.reason));
  } else {
    out.push_str(&format!(
      "  Today: {} at intensity <= {} - {}\n",
      decision.workout.workout_type, decision.workout.max_intensity, decision.workout.reason
    ));
  }
  out.push_str(&format!(
    "  Source: {}\n",
    if decision.workout.advisor_enhanced {
      "advisor"
    } else {
      "rule-based"
    }
  ));

  out
}

fn fmt_opt(value: Option<f64>) -> String {
  match value {
    Some(v) => format!("{:.1}", v),
    None => "-".to_string(),
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::pipeline::{decide, DecisionInputs};
  use crate::selector::Sport;
  use crate::test_utils::{fitness_day, wellness_window};

  async fn sample_decision() -> DailyDecision {
    let inputs = DecisionInputs {
      today: "2024-03-08".parse().unwrap(),
      wellness: wellness_window("2024-03-08", 7, |_, r| {
        r.recovery_score = Some(70.0);
        r.sleep_hours = Some(7.5);
      }),
      wearable: None,
      fitness_series: vec![
        fitness_day("2024-03-01", 48.0, 50.0),
        fitness_day("2024-03-08", 50.0, 55.0),
      ],
      activities: Vec::new(),
      events: Vec::new(),
      target_eftp: None,
      sport: Sport::Ride,
    };
    decide(&inputs, None).await
  }

  #[tokio::test]
  async fn test_report_contains_core_fields() {
    let decision = sample_decision().await;
    let report = format_report(&decision);

    assert!(report.contains("Daily decision for 2024-03-08"));
    assert!(report.contains("Phase:"));
    assert!(report.contains("Today:"));
    assert!(report.contains("rule-based"));
  }

  #[tokio::test]
  async fn test_report_omits_silent_advisories() {
    let decision = sample_decision().await;
    let report = format_report(&decision);

    // Healthy inputs: no advisory lines should fire
    assert!(!report.contains("Deload"));
    assert!(!report.contains("Illness"));
  }
}
