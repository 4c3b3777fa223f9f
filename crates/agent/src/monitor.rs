use dashwatch_core::{
    AlertEvent, Config, ExtensionState, RevolverState, Snapshot, TabInfo, TabRecord, TabStatus,
};
use tracing::{debug, info, warn};

use crate::evaluator::{evaluate, Rules, TabHistory};

/// Owner of the process-wide state: tab records, the alert log, the mute
/// set and the run flag. Every mutation goes through here.
pub struct Monitor {
    state: ExtensionState,
    rules: Rules,
    alert_capacity: usize,
    default_revolver_interval: u64,
}

impl Monitor {
    pub fn new(state: ExtensionState, config: &Config) -> Self {
        let mut monitor = Self {
            state,
            rules: Rules::from_config(&config.monitor),
            alert_capacity: config.monitor.alert_log_capacity.max(1),
            default_revolver_interval: RevolverState::clamp_interval(config.revolver.interval_ms),
        };
        // A persisted log may predate a smaller capacity.
        monitor.state.alerts.truncate(monitor.alert_capacity);
        monitor
    }

    pub fn state(&self) -> &ExtensionState {
        &self.state
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running
    }

    /// Stamp the start of a poll cycle. Returns `false` when paused.
    pub fn begin_cycle(&mut self, now_ms: i64) -> bool {
        if !self.state.is_running {
            return false;
        }
        self.state.last_poll_at = Some(now_ms);
        self.state.total_polls += 1;
        true
    }

    /// Replace a tab's record. The mute flag always comes from the mute set.
    pub fn record_poll(&mut self, tab_id: &str, mut record: TabRecord) {
        record.is_muted = self.state.is_muted(tab_id);
        self.state.tabs.insert(tab_id.to_string(), record);
    }

    /// Push an event to the front of the log, evicting the oldest beyond capacity.
    pub fn raise_alert(&mut self, event: AlertEvent) {
        self.state.alerts.insert(0, event);
        self.state.alerts.truncate(self.alert_capacity);
    }

    /// Evaluate a fresh snapshot for `tab` and record the result.
    ///
    /// Returns the alert event when the tab produced reasons this cycle.
    pub fn process(&mut self, tab: &TabInfo, snapshot: &Snapshot, now_ms: i64) -> Option<AlertEvent> {
        let history = TabHistory {
            is_muted: self.state.is_muted(&tab.id),
        };
        let evaluation = evaluate(snapshot, &history, now_ms, &self.rules);

        if let Some(err) = snapshot.error() {
            warn!(tab_id = %tab.id, kind = %snapshot.kind(), error = %err, "Extraction incomplete");
        }

        let was_alerting = self
            .state
            .tabs
            .get(&tab.id)
            .map(|r| r.status == TabStatus::Alert)
            .unwrap_or(false);
        if evaluation.status == TabStatus::Alert && !was_alerting {
            info!(tab_id = %tab.id, title = %tab.title, muted = history.is_muted, "Tab entered alert state");
        } else if evaluation.status == TabStatus::Ok && was_alerting {
            info!(tab_id = %tab.id, title = %tab.title, "Tab recovered");
        }

        self.record_poll(
            &tab.id,
            TabRecord {
                tab_id: tab.id.clone(),
                title: tab.title.clone(),
                url: tab.url.clone(),
                snapshot_type: snapshot.kind(),
                last_checked_at: now_ms,
                status: evaluation.status,
                is_muted: history.is_muted,
                metrics: evaluation.metrics,
                extraction_error: snapshot.error().map(str::to_string),
            },
        );

        if evaluation.reasons.is_empty() {
            return None;
        }
        let event = AlertEvent::new(now_ms, tab, snapshot.kind(), evaluation.reasons);
        self.raise_alert(event.clone());
        Some(event)
    }

    /// Flip the tab's membership in the mute set. Returns the new flag.
    pub fn toggle_mute(&mut self, tab_id: &str) -> bool {
        let muted = if self.state.muted_tab_ids.remove(tab_id) {
            false
        } else {
            self.state.muted_tab_ids.insert(tab_id.to_string());
            true
        };
        if let Some(record) = self.state.tabs.get_mut(tab_id) {
            record.is_muted = muted;
        }
        info!(tab_id = %tab_id, muted, "Mute toggled");
        muted
    }

    pub fn clear_alerts(&mut self) {
        debug!(cleared = self.state.alerts.len(), "Alert log cleared");
        self.state.alerts.clear();
    }

    /// Discard everything and start over in the running state.
    pub fn reset(&mut self, now_ms: i64) {
        let mut fresh = ExtensionState::fresh(now_ms);
        fresh.revolver.interval_ms = self.default_revolver_interval;
        self.state = fresh;
        info!("State reset");
    }

    /// Pausing also stops the revolver.
    pub fn set_running(&mut self, running: bool) {
        self.state.is_running = running;
        if !running {
            self.state.revolver.enabled = false;
        }
    }

    pub fn toggle_running(&mut self) -> bool {
        let running = !self.state.is_running;
        self.set_running(running);
        running
    }

    pub fn revolver(&self) -> &RevolverState {
        &self.state.revolver
    }

    pub fn set_revolver_enabled(&mut self, enabled: bool) {
        self.state.revolver.enabled = enabled;
    }

    /// Store a new rotation interval, clamped to the allowed range.
    pub fn set_revolver_interval(&mut self, interval_ms: u64) -> u64 {
        let clamped = RevolverState::clamp_interval(interval_ms);
        self.state.revolver.interval_ms = clamped;
        clamped
    }

    /// Drop records and mute entries of tabs the host no longer lists.
    /// Returns how many records were dropped.
    pub fn retain_tabs(&mut self, open: &[TabInfo]) -> usize {
        let before = self.state.tabs.len();
        let is_open = |id: &str| open.iter().any(|t| t.id == id);
        self.state.tabs.retain(|id, _| is_open(id));
        self.state.muted_tab_ids.retain(|id| is_open(id));
        let dropped = before - self.state.tabs.len();
        if dropped > 0 {
            debug!(dropped, "Records of closed tabs dropped");
        }
        dropped
    }

    /// Tabs the revolver rotates through, in host order.
    pub fn monitored<'a>(&self, tabs: &'a [TabInfo]) -> Vec<&'a TabInfo> {
        tabs.iter()
            .filter(|t| is_dashboard_url(&t.url) || self.state.tabs.contains_key(&t.id))
            .collect()
    }
}

const DASHBOARD_MARKERS: &[&str] = &["grafana", "zabbix", "kibana", "elastic"];

pub fn is_dashboard_url(url: &str) -> bool {
    let url = url.to_lowercase();
    DASHBOARD_MARKERS.iter().any(|m| url.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashwatch_core::{SnapshotKind, TimeSeriesRow, TimeSeriesSnapshot};

    const NOW: i64 = 1_765_000_000_000;

    fn monitor() -> Monitor {
        Monitor::new(ExtensionState::fresh(NOW), &Config::default())
    }

    fn tab(id: &str) -> TabInfo {
        TabInfo {
            id: id.to_string(),
            title: format!("Tab {}", id),
            url: format!("https://grafana.example/{}", id),
        }
    }

    fn zero_snapshot() -> Snapshot {
        Snapshot::TimeSeries(TimeSeriesSnapshot {
            rows: vec![TimeSeriesRow {
                timestamp_ms: NOW - 1_000,
                time_text: "2025-12-13 10:00:00".into(),
                raw_text: "0".into(),
                numeric_value: Some(0.0),
            }],
            ..Default::default()
        })
    }

    fn quiet_snapshot() -> Snapshot {
        Snapshot::TimeSeries(TimeSeriesSnapshot::default())
    }

    #[test]
    fn test_process_records_and_raises() {
        let mut m = monitor();
        let event = m.process(&tab("1"), &zero_snapshot(), NOW).unwrap();
        assert_eq!(event.reasons, vec!["zero value".to_string()]);
        assert_eq!(event.snapshot_type, SnapshotKind::TimeSeries);
        assert_eq!(m.state().alerts.len(), 1);
        assert_eq!(m.state().tabs["1"].status, TabStatus::Alert);
    }

    #[test]
    fn test_closed_tabs_are_pruned() {
        let mut m = monitor();
        m.process(&tab("1"), &quiet_snapshot(), NOW);
        m.process(&tab("2"), &zero_snapshot(), NOW);
        m.toggle_mute("2");
        assert_eq!(m.retain_tabs(&[tab("1")]), 1);
        assert!(m.state().tabs.contains_key("1"));
        assert!(!m.state().tabs.contains_key("2"));
        assert!(!m.state().is_muted("2"));
        assert_eq!(m.state().alerts.len(), 1);
        assert_eq!(m.retain_tabs(&[tab("1")]), 0);
    }

    #[test]
    fn test_muted_tab_is_recorded_but_silent() {
        let mut m = monitor();
        assert!(m.toggle_mute("1"));
        assert!(m.process(&tab("1"), &zero_snapshot(), NOW).is_none());
        let record = &m.state().tabs["1"];
        assert_eq!(record.status, TabStatus::Alert);
        assert!(record.is_muted);
        assert!(m.state().alerts.is_empty());
    }

    #[test]
    fn test_toggle_mute_updates_existing_record() {
        let mut m = monitor();
        m.process(&tab("1"), &quiet_snapshot(), NOW);
        assert!(m.toggle_mute("1"));
        assert!(m.state().tabs["1"].is_muted);
        assert!(!m.toggle_mute("1"));
        assert!(!m.state().tabs["1"].is_muted);
        assert!(m.state().muted_tab_ids.is_empty());
    }

    #[test]
    fn test_record_poll_forces_mute_flag() {
        let mut m = monitor();
        m.process(&tab("1"), &quiet_snapshot(), NOW);
        let mut record = m.state().tabs["1"].clone();
        record.is_muted = true;
        m.record_poll("1", record);
        assert!(!m.state().tabs["1"].is_muted);
    }

    #[test]
    fn test_alert_log_is_bounded_most_recent_first() {
        let mut m = monitor();
        for i in 0..60 {
            m.raise_alert(AlertEvent::new(i, &tab("1"), SnapshotKind::Ratio, vec![format!("r{}", i)]));
        }
        let alerts = &m.state().alerts;
        assert_eq!(alerts.len(), 50);
        assert_eq!(alerts[0].timestamp, 59);
        assert_eq!(alerts[49].timestamp, 10);
    }

    #[test]
    fn test_clear_alerts_keeps_tabs() {
        let mut m = monitor();
        m.process(&tab("1"), &zero_snapshot(), NOW);
        m.clear_alerts();
        assert!(m.state().alerts.is_empty());
        assert_eq!(m.state().tabs.len(), 1);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut m = monitor();
        m.process(&tab("1"), &zero_snapshot(), NOW);
        m.toggle_mute("2");
        m.set_running(false);
        m.reset(NOW + 5);
        let first = m.state().clone();
        m.reset(NOW + 5);
        assert_eq!(&first, m.state());
        assert!(first.is_running);
        assert!(first.tabs.is_empty());
        assert!(first.alerts.is_empty());
        assert!(first.muted_tab_ids.is_empty());
        assert_eq!(first.started_at, NOW + 5);
    }

    #[test]
    fn test_pause_gates_cycles_and_stops_revolver() {
        let mut m = monitor();
        m.set_revolver_enabled(true);
        assert!(!m.toggle_running());
        assert!(!m.revolver().enabled);
        assert!(!m.begin_cycle(NOW));
        assert_eq!(m.state().total_polls, 0);
        assert!(m.toggle_running());
        assert!(m.begin_cycle(NOW));
        assert_eq!(m.state().total_polls, 1);
        assert_eq!(m.state().last_poll_at, Some(NOW));
    }

    #[test]
    fn test_revolver_interval_is_clamped() {
        let mut m = monitor();
        assert_eq!(m.set_revolver_interval(200), 1_000);
        assert_eq!(m.set_revolver_interval(90_000), 60_000);
        assert_eq!(m.revolver().interval_ms, 60_000);
    }

    #[test]
    fn test_monitored_tabs() {
        let mut m = monitor();
        let other = TabInfo {
            id: "9".into(),
            title: "Wiki".into(),
            url: "https://wiki.example/".into(),
        };
        let tabs = vec![tab("1"), other.clone()];
        assert_eq!(m.monitored(&tabs).len(), 1);
        m.process(&other, &quiet_snapshot(), NOW);
        assert_eq!(m.monitored(&tabs).len(), 2);
    }
}
