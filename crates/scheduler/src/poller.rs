use std::sync::Arc;
use std::time::Duration;

use dashwatch_agent::{AlertSink, Monitor, TabHost};
use dashwatch_core::clock::now_ms;
use dashwatch_core::TabInfo;
use dashwatch_extract::{read_page, ExtractOptions};
use dashwatch_storage::StateStorage;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::command::{Command, CycleSummary};
use crate::revolver::{self, RevolverTimer};

const INELIGIBLE_PREFIXES: &[&str] = &[
    "chrome://",
    "chrome-extension://",
    "devtools://",
    "about:",
    "edge://",
];

/// Browser-internal pages and tabs without a URL are never read.
pub fn is_eligible_url(url: &str) -> bool {
    !url.is_empty() && !INELIGIBLE_PREFIXES.iter().any(|p| url.starts_with(p))
}

/// Single owner of the monitor. Poll cycles, revolver ticks and commands
/// all run on this one task, so cycles never overlap and commands land
/// between cycles.
pub struct PollScheduler {
    monitor: Monitor,
    host: Arc<dyn TabHost>,
    sink: Arc<dyn AlertSink>,
    storage: Arc<dyn StateStorage>,
    extract: ExtractOptions,
    poll_interval: Duration,
    revolver: RevolverTimer,
}

impl PollScheduler {
    pub fn new(
        monitor: Monitor,
        host: Arc<dyn TabHost>,
        sink: Arc<dyn AlertSink>,
        storage: Arc<dyn StateStorage>,
        extract: ExtractOptions,
        poll_interval: Duration,
    ) -> Self {
        Self {
            monitor,
            host,
            sink,
            storage,
            extract,
            poll_interval,
            revolver: RevolverTimer::default(),
        }
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// Poll every eligible tab once, then persist.
    pub async fn run_cycle(&mut self) -> CycleSummary {
        let mut summary = CycleSummary::default();
        if !self.monitor.begin_cycle(now_ms()) {
            debug!("Monitoring paused, cycle skipped");
            return summary;
        }
        summary.ran = true;

        let tabs = match self.host.list_tabs().await {
            Ok(tabs) => tabs,
            Err(e) => {
                warn!(error = %e, "Failed to enumerate tabs");
                self.persist().await;
                return summary;
            }
        };
        self.monitor.retain_tabs(&tabs);

        for tab in tabs.iter().filter(|t| is_eligible_url(&t.url)) {
            let page = match self.host.read_page(tab).await {
                Ok(page) => page,
                Err(e) => {
                    debug!(tab_id = %tab.id, error = %e, "Tab unreadable, skipped");
                    summary.tabs_skipped += 1;
                    continue;
                }
            };
            let snapshot = read_page(&page, &self.extract);
            summary.tabs_checked += 1;
            if let Some(event) = self.monitor.process(tab, &snapshot, now_ms()) {
                warn!(tab_id = %tab.id, title = %tab.title, detail = %event.detail(), "Alert raised");
                self.sink.notify(&event).await;
                summary.alerts_raised += 1;
            }
        }

        self.persist().await;
        debug!(
            checked = summary.tabs_checked,
            skipped = summary.tabs_skipped,
            alerts = summary.alerts_raised,
            "Poll cycle finished"
        );
        summary
    }

    async fn persist(&self) {
        if let Err(e) = self.storage.save(self.monitor.state()).await {
            warn!(error = %e, "Failed to persist state, will retry next cycle");
        }
    }

    async fn rotate(&mut self) {
        if !self.monitor.revolver().enabled || !self.monitor.is_running() {
            return;
        }
        let tabs = match self.host.list_tabs().await {
            Ok(tabs) => tabs,
            Err(e) => {
                warn!(error = %e, "Revolver could not enumerate tabs");
                return;
            }
        };
        let eligible: Vec<TabInfo> = tabs.into_iter().filter(|t| is_eligible_url(&t.url)).collect();
        let monitored = self.monitor.monitored(&eligible);
        if monitored.is_empty() {
            return;
        }
        let next = monitored[self.revolver.next_index(monitored.len())];
        if let Err(e) = self.host.activate(&next.id).await {
            warn!(tab_id = %next.id, error = %e, "Failed to activate tab");
        }
    }

    fn sync_revolver(&mut self) {
        let rev = self.monitor.revolver();
        let active = rev.enabled && self.monitor.is_running();
        let period = rev.interval_ms;
        self.revolver.sync(active, period);
    }

    pub async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::ToggleRunning { reply } => {
                let running = self.monitor.toggle_running();
                info!(running, "Monitoring toggled");
                self.persist().await;
                let _ = reply.send(running);
                if running {
                    self.run_cycle().await;
                }
            }
            Command::Reset { reply } => {
                self.monitor.reset(now_ms());
                self.persist().await;
                let _ = reply.send(());
            }
            Command::ClearAlerts { reply } => {
                self.monitor.clear_alerts();
                self.persist().await;
                let _ = reply.send(());
            }
            Command::ToggleMute { tab_id, reply } => {
                let muted = self.monitor.toggle_mute(&tab_id);
                self.persist().await;
                let _ = reply.send(muted);
            }
            Command::PollNow { reply } => {
                let summary = self.run_cycle().await;
                let _ = reply.send(summary);
            }
            Command::State { reply } => {
                let _ = reply.send(self.monitor.state().clone());
            }
            Command::Revolver { action, reply } => {
                let state = revolver::apply(&mut self.monitor, action);
                if action != revolver::RevolverAction::Status {
                    self.persist().await;
                }
                let _ = reply.send(state);
            }
        }
        self.sync_revolver();
    }

    /// Drive the scheduler until shutdown or until every handle is dropped.
    pub async fn run_loop(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(
            interval_ms = self.poll_interval.as_millis() as u64,
            running = self.monitor.is_running(),
            "PollScheduler started"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.sync_revolver();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                    self.sync_revolver();
                }
                _ = self.revolver.tick() => {
                    self.rotate().await;
                }
                cmd = commands.recv() => {
                    match cmd {
                        Some(cmd) => self.handle(cmd).await,
                        None => {
                            info!("All scheduler handles dropped");
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("PollScheduler shutting down");
                    break;
                }
            }
        }

        self.persist().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::command_channel;
    use crate::revolver::RevolverAction;
    use async_trait::async_trait;
    use dashwatch_core::{
        AlertEvent, Config, DashboardClock, Error, ExtensionState, Result, TabStatus,
    };
    use dashwatch_extract::PageContent;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeHost {
        tabs: Vec<TabInfo>,
        pages: HashMap<String, PageContent>,
        activated: Mutex<Vec<String>>,
    }

    impl FakeHost {
        fn with_tab(mut self, id: &str, url: &str, page: Option<PageContent>) -> Self {
            self.tabs.push(TabInfo {
                id: id.to_string(),
                title: format!("Tab {}", id),
                url: url.to_string(),
            });
            if let Some(page) = page {
                self.pages.insert(id.to_string(), page);
            }
            self
        }
    }

    #[async_trait]
    impl TabHost for FakeHost {
        async fn list_tabs(&self) -> Result<Vec<TabInfo>> {
            Ok(self.tabs.clone())
        }

        async fn read_page(&self, tab: &TabInfo) -> Result<PageContent> {
            self.pages
                .get(&tab.id)
                .cloned()
                .ok_or_else(|| Error::Host(format!("tab {} unreachable", tab.id)))
        }

        async fn activate(&self, tab_id: &str) -> Result<()> {
            self.activated.lock().unwrap().push(tab_id.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<AlertEvent>>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn notify(&self, event: &AlertEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[derive(Default)]
    struct MemoryStorage {
        saved: Mutex<Option<ExtensionState>>,
        saves: Mutex<usize>,
        /// Number of upcoming saves that fail.
        failures: Mutex<usize>,
    }

    #[async_trait]
    impl StateStorage for MemoryStorage {
        async fn load(&self) -> Result<Option<ExtensionState>> {
            Ok(self.saved.lock().unwrap().clone())
        }

        async fn save(&self, state: &ExtensionState) -> Result<()> {
            {
                let mut failures = self.failures.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(Error::Storage("disk full".into()));
                }
            }
            *self.saved.lock().unwrap() = Some(state.clone());
            *self.saves.lock().unwrap() += 1;
            Ok(())
        }
    }

    /// Metrics page whose latest row is a zero value recorded just now.
    fn zero_page(url: &str) -> PageContent {
        let stamp = (chrono::Utc::now() - chrono::Duration::seconds(10))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        PageContent::from_html(
            url,
            format!(
                r#"<div role="row"><div role="cell">{}</div><div role="cell">0</div></div>"#,
                stamp
            ),
        )
    }

    fn quiet_page(url: &str) -> PageContent {
        PageContent::from_html(url, "<p>all good</p>")
    }

    struct Rig {
        scheduler: PollScheduler,
        host: Arc<FakeHost>,
        sink: Arc<RecordingSink>,
        storage: Arc<MemoryStorage>,
    }

    fn rig(host: FakeHost) -> Rig {
        let host = Arc::new(host);
        let sink = Arc::new(RecordingSink::default());
        let storage = Arc::new(MemoryStorage::default());
        let scheduler = PollScheduler::new(
            Monitor::new(ExtensionState::fresh(now_ms()), &Config::default()),
            host.clone(),
            sink.clone(),
            storage.clone(),
            ExtractOptions::default().with_clock(DashboardClock::Utc),
            Duration::from_millis(3000),
        );
        Rig {
            scheduler,
            host,
            sink,
            storage,
        }
    }

    #[test]
    fn test_eligibility() {
        assert!(is_eligible_url("https://grafana.example/d/1"));
        assert!(!is_eligible_url(""));
        assert!(!is_eligible_url("chrome://settings"));
        assert!(!is_eligible_url("chrome-extension://abc/popup.html"));
        assert!(!is_eligible_url("devtools://devtools/bundled/inspector.html"));
        assert!(!is_eligible_url("about:blank"));
        assert!(!is_eligible_url("edge://newtab"));
    }

    #[tokio::test]
    async fn test_cycle_alerts_once_per_tab() {
        let host = FakeHost::default()
            .with_tab("1", "https://grafana.example/a", Some(zero_page("https://grafana.example/a")))
            .with_tab("2", "https://grafana.example/b", Some(quiet_page("https://grafana.example/b")))
            .with_tab("3", "chrome://settings", Some(zero_page("chrome://settings")));
        let mut r = rig(host);

        let summary = r.scheduler.run_cycle().await;
        assert!(summary.ran);
        assert_eq!(summary.tabs_checked, 2);
        assert_eq!(summary.alerts_raised, 1);

        let events = r.sink.events.lock().unwrap().clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tab_id, "1");

        let state = r.scheduler.monitor().state();
        assert_eq!(state.total_polls, 1);
        assert_eq!(state.tabs.len(), 2);
        assert_eq!(state.tabs["1"].status, TabStatus::Alert);
        assert_eq!(*r.storage.saves.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_save_is_retried_next_cycle() {
        let host = FakeHost::default().with_tab(
            "1",
            "https://grafana.example/a",
            Some(zero_page("https://grafana.example/a")),
        );
        let mut r = rig(host);
        *r.storage.failures.lock().unwrap() = 1;

        let summary = r.scheduler.run_cycle().await;
        assert!(summary.ran);
        assert_eq!(summary.tabs_checked, 1);
        assert_eq!(summary.alerts_raised, 1);
        assert_eq!(r.scheduler.monitor().state().tabs.len(), 1);
        assert_eq!(r.scheduler.monitor().state().alerts.len(), 1);
        assert!(r.storage.saved.lock().unwrap().is_none());

        r.scheduler.run_cycle().await;
        let saved = r.storage.saved.lock().unwrap().clone().unwrap();
        assert_eq!(saved.total_polls, 2);
        assert_eq!(saved.tabs.len(), 1);
        assert_eq!(&saved, r.scheduler.monitor().state());
    }

    #[tokio::test]
    async fn test_closed_tab_record_is_dropped() {
        let host = FakeHost::default()
            .with_tab("1", "https://grafana.example/a", Some(quiet_page("https://grafana.example/a")))
            .with_tab("2", "https://grafana.example/b", Some(quiet_page("https://grafana.example/b")));
        let mut r = rig(host);
        r.scheduler.run_cycle().await;
        assert_eq!(r.scheduler.monitor().state().tabs.len(), 2);

        let host = FakeHost::default()
            .with_tab("1", "https://grafana.example/a", Some(quiet_page("https://grafana.example/a")));
        r.scheduler.host = Arc::new(host);
        r.scheduler.run_cycle().await;
        let tabs = &r.scheduler.monitor().state().tabs;
        assert_eq!(tabs.len(), 1);
        assert!(tabs.contains_key("1"));
    }

    #[tokio::test]
    async fn test_paused_cycle_does_nothing() {
        let host = FakeHost::default().with_tab(
            "1",
            "https://grafana.example/a",
            Some(zero_page("https://grafana.example/a")),
        );
        let mut r = rig(host);
        r.scheduler.monitor.set_running(false);

        let summary = r.scheduler.run_cycle().await;
        assert!(!summary.ran);
        assert_eq!(r.scheduler.monitor().state().total_polls, 0);
        assert!(r.scheduler.monitor().state().tabs.is_empty());
        assert!(r.sink.events.lock().unwrap().is_empty());
        assert_eq!(*r.storage.saves.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_tab_keeps_previous_record() {
        let host = FakeHost::default().with_tab(
            "1",
            "https://grafana.example/a",
            Some(quiet_page("https://grafana.example/a")),
        );
        let mut r = rig(host);
        r.scheduler.run_cycle().await;
        let before = r.scheduler.monitor().state().tabs["1"].clone();

        // Same scheduler, host now refuses to read the page.
        let unreachable = FakeHost::default().with_tab("1", "https://grafana.example/a", None);
        r.scheduler.host = Arc::new(unreachable);
        let summary = r.scheduler.run_cycle().await;
        assert_eq!(summary.tabs_skipped, 1);
        assert_eq!(r.scheduler.monitor().state().tabs["1"], before);
        assert_eq!(r.scheduler.monitor().state().total_polls, 2);
    }

    #[tokio::test]
    async fn test_muted_tab_never_reaches_sink() {
        let host = FakeHost::default().with_tab(
            "1",
            "https://grafana.example/a",
            Some(zero_page("https://grafana.example/a")),
        );
        let mut r = rig(host);
        r.scheduler.monitor.toggle_mute("1");
        r.scheduler.run_cycle().await;
        assert!(r.sink.events.lock().unwrap().is_empty());
        assert!(r.scheduler.monitor().state().alerts.is_empty());
        assert_eq!(r.scheduler.monitor().state().tabs["1"].status, TabStatus::Alert);
    }

    #[tokio::test]
    async fn test_commands_through_handle() {
        let host = FakeHost::default().with_tab(
            "1",
            "https://grafana.example/a",
            Some(zero_page("https://grafana.example/a")),
        );
        let r = rig(host);
        let storage = r.storage.clone();
        let (handle, rx) = command_channel(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(r.scheduler.run_loop(rx, shutdown_rx));

        let summary = handle.poll_now().await.unwrap();
        assert!(summary.ran);
        assert!(handle.toggle_mute("1").await.unwrap());
        assert!(!handle.toggle_running().await.unwrap());
        let paused = handle.poll_now().await.unwrap();
        assert!(!paused.ran);

        handle.clear_alerts().await.unwrap();
        let state = handle.state().await.unwrap();
        assert!(state.alerts.is_empty());
        assert!(!state.is_running);
        assert!(state.is_muted("1"));

        let rev = handle.revolver(RevolverAction::SetInterval(120_000)).await.unwrap();
        assert_eq!(rev.interval_ms, 60_000);

        handle.reset().await.unwrap();
        let state = handle.state().await.unwrap();
        assert!(state.is_running);
        assert!(state.tabs.is_empty());
        assert!(state.muted_tab_ids.is_empty());

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
        let saved = storage.saved.lock().unwrap().clone().unwrap();
        assert!(saved.is_running);
    }

    #[tokio::test]
    async fn test_rotate_walks_monitored_tabs() {
        let host = FakeHost::default()
            .with_tab("1", "https://grafana.example/a", None)
            .with_tab("2", "https://wiki.example/", None)
            .with_tab("3", "https://kibana.example/app/discover", None);
        let mut r = rig(host);
        r.scheduler.monitor.set_revolver_enabled(true);
        r.scheduler.rotate().await;
        r.scheduler.rotate().await;
        r.scheduler.rotate().await;
        let activated = r.host.activated.lock().unwrap().clone();
        assert_eq!(activated, vec!["3", "1", "3"]);
    }

    #[tokio::test]
    async fn test_rotate_is_idle_when_disabled() {
        let host = FakeHost::default().with_tab("1", "https://grafana.example/a", None);
        let mut r = rig(host);
        r.scheduler.rotate().await;
        assert!(r.host.activated.lock().unwrap().is_empty());
    }
}
