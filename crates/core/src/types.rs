use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::clock::now_ms;

/// Host-assigned tab identifier (a CDP target id, or a numeric id rendered as text).
pub type TabId = String;

/// A tab as enumerated by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: TabId,
    pub title: String,
    pub url: String,
}

/// Extraction strategy picked by the page classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    TimeSeries,
    ProblemList,
    Ratio,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TimeSeries => "time_series",
            Self::ProblemList => "problem_list",
            Self::Ratio => "ratio",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// One row of a metrics table. A value that does not parse as a number is
/// kept as text with `numeric_value == None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesRow {
    pub timestamp_ms: i64,
    pub time_text: String,
    pub raw_text: String,
    pub numeric_value: Option<f64>,
}

impl TimeSeriesRow {
    pub fn is_numeric(&self) -> bool {
        self.numeric_value.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesSnapshot {
    /// Sorted by timestamp, ascending.
    pub rows: Vec<TimeSeriesRow>,
    /// Upper-cased severity words seen anywhere on the page, deduplicated,
    /// in discovery order.
    pub page_alert_words: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemEntry {
    pub time: String,
    pub host: String,
    pub problem_text: String,
    pub duration_text: String,
    pub duration_minutes: f64,
    pub should_alert: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemListSnapshot {
    /// Unique by `(host, problem)`, first occurrence wins.
    pub problems: Vec<ProblemEntry>,
    pub error: Option<String>,
}

impl ProblemListSnapshot {
    pub fn alerting(&self) -> impl Iterator<Item = &ProblemEntry> {
        self.problems.iter().filter(|p| p.should_alert)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatioSnapshot {
    pub total_count: f64,
    pub good_count: f64,
    pub error_count: f64,
    /// Percentage, 0 when `total_count` is 0.
    pub error_rate: f64,
    pub last_event_text: Option<String>,
    /// `None` means freshness is unknown.
    pub last_event_time_ms: Option<i64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Snapshot {
    TimeSeries(TimeSeriesSnapshot),
    ProblemList(ProblemListSnapshot),
    Ratio(RatioSnapshot),
}

impl Snapshot {
    pub fn kind(&self) -> SnapshotKind {
        match self {
            Self::TimeSeries(_) => SnapshotKind::TimeSeries,
            Self::ProblemList(_) => SnapshotKind::ProblemList,
            Self::Ratio(_) => SnapshotKind::Ratio,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::TimeSeries(s) => s.error.as_deref(),
            Self::ProblemList(s) => s.error.as_deref(),
            Self::Ratio(s) => s.error.as_deref(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tab records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TabStatus {
    #[default]
    Ok,
    Alert,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuddenDrop {
    pub average: f64,
    pub current: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesMetrics {
    pub total_rows: usize,
    pub recent_rows: usize,
    pub last_value: Option<String>,
    pub last_time: Option<String>,
    pub average: Option<f64>,
    pub average_count: usize,
    pub sudden_drop: Option<SuddenDrop>,
    pub zero_value: bool,
    pub page_alert_words: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemListMetrics {
    pub total_problems: usize,
    pub alert_problems: usize,
    pub problems: Vec<ProblemEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatioMetrics {
    pub total_count: f64,
    pub good_count: f64,
    pub error_count: f64,
    pub error_rate: f64,
    pub last_event_text: Option<String>,
    /// Whole minutes since the last event, set only when the feed is frozen.
    pub freeze_minutes: Option<i64>,
}

/// Summary of one evaluated snapshot, kept on the tab record for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DerivedMetrics {
    TimeSeries(TimeSeriesMetrics),
    ProblemList(ProblemListMetrics),
    Ratio(RatioMetrics),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabRecord {
    pub tab_id: TabId,
    pub title: String,
    pub url: String,
    pub snapshot_type: SnapshotKind,
    pub last_checked_at: i64,
    pub status: TabStatus,
    pub is_muted: bool,
    pub metrics: DerivedMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_error: Option<String>,
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub id: String,
    pub timestamp: i64,
    pub tab_id: TabId,
    pub tab_title: String,
    pub snapshot_type: SnapshotKind,
    pub reasons: Vec<String>,
}

impl AlertEvent {
    pub fn new(
        timestamp: i64,
        tab: &TabInfo,
        snapshot_type: SnapshotKind,
        reasons: Vec<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            tab_id: tab.id.clone(),
            tab_title: tab.title.clone(),
            snapshot_type,
            reasons,
        }
    }

    /// All reasons of the event on one line.
    pub fn detail(&self) -> String {
        self.reasons.join(" + ")
    }
}

// ---------------------------------------------------------------------------
// Process-wide state
// ---------------------------------------------------------------------------

pub const REVOLVER_MIN_INTERVAL_MS: u64 = 1_000;
pub const REVOLVER_MAX_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevolverState {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_revolver_interval")]
    pub interval_ms: u64,
}

fn default_revolver_interval() -> u64 {
    3_000
}

impl Default for RevolverState {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: default_revolver_interval(),
        }
    }
}

impl RevolverState {
    pub fn clamp_interval(ms: u64) -> u64 {
        ms.clamp(REVOLVER_MIN_INTERVAL_MS, REVOLVER_MAX_INTERVAL_MS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtensionState {
    pub is_running: bool,
    pub started_at: i64,
    pub last_poll_at: Option<i64>,
    pub total_polls: u64,
    pub tabs: BTreeMap<TabId, TabRecord>,
    /// Most recent first.
    pub alerts: Vec<AlertEvent>,
    pub muted_tab_ids: BTreeSet<TabId>,
    pub revolver: RevolverState,
}

impl ExtensionState {
    pub fn fresh(started_at: i64) -> Self {
        Self {
            is_running: true,
            started_at,
            last_poll_at: None,
            total_polls: 0,
            tabs: BTreeMap::new(),
            alerts: Vec::new(),
            muted_tab_ids: BTreeSet::new(),
            revolver: RevolverState::default(),
        }
    }

    pub fn is_muted(&self, tab_id: &str) -> bool {
        self.muted_tab_ids.contains(tab_id)
    }
}

impl Default for ExtensionState {
    fn default() -> Self {
        Self::fresh(now_ms())
    }
}
