//! Anomaly rules per snapshot type.
//!
//! Evaluation is a pure function of the snapshot, the tab's mute flag, the
//! current time and the rule thresholds. A muted tab still gets `Alert`
//! status and full metrics; only its reasons are withheld, so nothing is
//! logged or announced for it.

use dashwatch_core::config::MonitorConfig;
use dashwatch_core::{
    DerivedMetrics, ProblemListMetrics, ProblemListSnapshot, RatioMetrics, RatioSnapshot, Snapshot,
    SuddenDrop, TabStatus, TimeSeriesMetrics, TimeSeriesSnapshot,
};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct Rules {
    pub history_ms: i64,
    pub change_threshold: f64,
    pub average_count: usize,
    pub error_rate_threshold: f64,
    pub data_freeze_timeout_ms: i64,
}

impl Rules {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            history_ms: config.history_minutes as i64 * 60_000,
            change_threshold: config.change_threshold,
            average_count: config.average_count,
            error_rate_threshold: config.error_rate_threshold,
            data_freeze_timeout_ms: config.data_freeze_timeout_ms,
        }
    }
}

impl Default for Rules {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

/// Per-tab context carried between polls.
#[derive(Debug, Clone, Copy, Default)]
pub struct TabHistory {
    pub is_muted: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub status: TabStatus,
    /// Empty when nothing fired or when the tab is muted.
    pub reasons: Vec<String>,
    pub metrics: DerivedMetrics,
}

/// Collects fired rules and applies the mute policy in one place.
struct Findings {
    fired: bool,
    reasons: Vec<String>,
    muted: bool,
}

impl Findings {
    fn new(muted: bool) -> Self {
        Self {
            fired: false,
            reasons: Vec::new(),
            muted,
        }
    }

    fn fire(&mut self, reason: String) {
        self.fired = true;
        if !self.muted {
            self.reasons.push(reason);
        }
    }

    fn finish(self, metrics: DerivedMetrics) -> Evaluation {
        Evaluation {
            status: if self.fired { TabStatus::Alert } else { TabStatus::Ok },
            reasons: self.reasons,
            metrics,
        }
    }
}

pub fn evaluate(snapshot: &Snapshot, history: &TabHistory, now_ms: i64, rules: &Rules) -> Evaluation {
    let mut findings = Findings::new(history.is_muted);
    let metrics = match snapshot {
        Snapshot::TimeSeries(s) => {
            DerivedMetrics::TimeSeries(eval_time_series(s, now_ms, rules, &mut findings))
        }
        Snapshot::ProblemList(s) => DerivedMetrics::ProblemList(eval_problem_list(s, &mut findings)),
        Snapshot::Ratio(s) => DerivedMetrics::Ratio(eval_ratio(s, now_ms, rules, &mut findings)),
    };
    findings.finish(metrics)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn eval_time_series(
    snap: &TimeSeriesSnapshot,
    now_ms: i64,
    rules: &Rules,
    findings: &mut Findings,
) -> TimeSeriesMetrics {
    let cutoff = now_ms - rules.history_ms;
    let window: Vec<_> = snap.rows.iter().filter(|r| r.timestamp_ms >= cutoff).collect();

    let mut metrics = TimeSeriesMetrics {
        total_rows: snap.rows.len(),
        recent_rows: window.len(),
        page_alert_words: snap.page_alert_words.clone(),
        ..Default::default()
    };

    if !snap.page_alert_words.is_empty() {
        findings.fire(format!("page: {}", snap.page_alert_words.join(", ")));
    }

    let Some(latest) = window.last() else {
        return metrics;
    };
    metrics.last_value = Some(latest.raw_text.clone());
    metrics.last_time = Some(latest.time_text.clone());

    let Some(current) = latest.numeric_value else {
        return metrics;
    };

    if current == 0.0 {
        metrics.zero_value = true;
        findings.fire("zero value".to_string());
    }

    if window.len() >= 3 {
        let numeric: Vec<f64> = window.iter().filter_map(|r| r.numeric_value).collect();
        let tail = &numeric[numeric.len().saturating_sub(rules.average_count)..];
        // The latest sample is the last numeric one; it is compared, not averaged.
        let prior = &tail[..tail.len().saturating_sub(1)];
        if prior.len() >= 2 {
            let average = mean(prior);
            metrics.average = Some(average);
            metrics.average_count = prior.len();
            if average > 0.0 {
                let percent = (average - current) / average * 100.0;
                if percent >= rules.change_threshold {
                    findings.fire(format!(
                        "sudden drop {:.1}% (average {:.2} -> current {})",
                        percent, average, current
                    ));
                    metrics.sudden_drop = Some(SuddenDrop {
                        average,
                        current,
                        percent,
                    });
                }
            }
        }
    }

    metrics
}

fn eval_problem_list(snap: &ProblemListSnapshot, findings: &mut Findings) -> ProblemListMetrics {
    let alert_problems = snap.alerting().count();
    if alert_problems > 0 {
        findings.fire(format!("problem board: {} problem(s) in alert window", alert_problems));
    }
    ProblemListMetrics {
        total_problems: snap.problems.len(),
        alert_problems,
        problems: snap.problems.clone(),
    }
}

fn eval_ratio(snap: &RatioSnapshot, now_ms: i64, rules: &Rules, findings: &mut Findings) -> RatioMetrics {
    let mut metrics = RatioMetrics {
        total_count: snap.total_count,
        good_count: snap.good_count,
        error_count: snap.error_count,
        error_rate: snap.error_rate,
        last_event_text: snap.last_event_text.clone(),
        freeze_minutes: None,
    };

    if snap.error_rate > rules.error_rate_threshold {
        findings.fire(format!(
            "error rate {:.1}% (limit {}%)",
            snap.error_rate, rules.error_rate_threshold
        ));
    }

    if let Some(last) = snap.last_event_time_ms {
        let elapsed = now_ms - last;
        if elapsed > rules.data_freeze_timeout_ms {
            let minutes = elapsed / 60_000;
            metrics.freeze_minutes = Some(minutes);
            findings.fire(format!("data freeze: last event {} min ago", minutes));
        }
    }

    metrics
}
