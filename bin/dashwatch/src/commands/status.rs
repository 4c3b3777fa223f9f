use chrono::{Local, TimeZone};
use dashwatch_core::{Config, DerivedMetrics, ExtensionState, Paths, TabRecord, TabStatus};
use dashwatch_storage::{JsonStateStore, StateStorage};

async fn load_state(paths: &Paths) -> anyhow::Result<Option<ExtensionState>> {
    let store = JsonStateStore::from_paths(paths);
    Ok(store.load().await?)
}

fn format_ms(ms: i64) -> String {
    Local
        .timestamp_millis_opt(ms)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

/// One-line digest of what the last poll saw on a tab.
fn metrics_summary(record: &TabRecord) -> String {
    if let Some(err) = &record.extraction_error {
        return format!("error: {}", err);
    }
    match &record.metrics {
        DerivedMetrics::TimeSeries(m) => {
            let last = m.last_value.as_deref().unwrap_or("-");
            match m.average {
                Some(avg) => format!("{} rows, last {}, avg {:.2}", m.recent_rows, last, avg),
                None => format!("{} rows, last {}", m.recent_rows, last),
            }
        }
        DerivedMetrics::ProblemList(m) => {
            format!("{} problem(s), {} in window", m.total_problems, m.alert_problems)
        }
        DerivedMetrics::Ratio(m) => format!(
            "{:.1}% errors ({} of {})",
            m.error_rate, m.error_count, m.total_count
        ),
    }
}

pub async fn status() -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;

    println!("dashwatch status");
    println!("================");
    println!();

    let config_path = paths.config_file();
    println!(
        "Config:    {} {}",
        config_path.display(),
        if config_path.exists() { "✓" } else { "(defaults)" }
    );
    println!("Control:   {}", config.control.base_url());
    println!(
        "Browser:   http://{}:{}",
        config.browser.cdp_host, config.browser.cdp_port
    );

    let Some(state) = load_state(&paths).await? else {
        println!();
        println!("No state yet. Run `dashwatch run` to start monitoring.");
        return Ok(());
    };

    let alerting = state
        .tabs
        .values()
        .filter(|t| t.status == TabStatus::Alert && !t.is_muted)
        .count();

    println!();
    println!(
        "Monitoring: {}",
        if state.is_running { "▶️  running" } else { "⏸️  paused" }
    );
    println!("Started:    {}", format_ms(state.started_at));
    println!(
        "Last poll:  {}",
        state.last_poll_at.map(format_ms).unwrap_or_else(|| "never".to_string())
    );
    println!("Polls:      {}", state.total_polls);
    println!("Tabs:       {} ({} alerting, {} muted)", state.tabs.len(), alerting, state.muted_tab_ids.len());
    println!("Alerts:     {}", state.alerts.len());
    println!(
        "Revolver:   {} (every {} ms)",
        if state.revolver.enabled { "on" } else { "off" },
        state.revolver.interval_ms
    );
    Ok(())
}

pub async fn alerts(limit: usize) -> anyhow::Result<()> {
    let paths = Paths::new();
    let state = load_state(&paths).await?.unwrap_or_default();

    if state.alerts.is_empty() {
        println!("No alerts.");
        return Ok(());
    }

    println!("🔔 Alerts ({} total)", state.alerts.len());
    println!();
    for alert in state.alerts.iter().take(limit) {
        println!(
            "  {}  {:<12} {:<32} {}",
            format_ms(alert.timestamp),
            alert.snapshot_type.as_str(),
            truncate(&alert.tab_title, 32),
            alert.detail()
        );
    }
    if state.alerts.len() > limit {
        println!();
        println!("  ... {} older alert(s) not shown", state.alerts.len() - limit);
    }
    Ok(())
}

pub async fn tabs() -> anyhow::Result<()> {
    let paths = Paths::new();
    let state = load_state(&paths).await?.unwrap_or_default();

    if state.tabs.is_empty() {
        println!("No tabs polled yet.");
        return Ok(());
    }

    println!("📑 Tabs ({} total)", state.tabs.len());
    println!();
    println!(
        "  {:<12} {:<6} {:<12} {:<32} {}",
        "ID", "STATUS", "TYPE", "TITLE", "LAST POLL"
    );
    for record in state.tabs.values() {
        let status = match (record.status, record.is_muted) {
            (_, true) => "🔇",
            (TabStatus::Alert, false) => "🔴",
            (TabStatus::Ok, false) => "🟢",
        };
        println!(
            "  {:<12} {:<6} {:<12} {:<32} {}",
            truncate(&record.tab_id, 12),
            status,
            record.snapshot_type.as_str(),
            truncate(&record.title, 32),
            format_ms(record.last_checked_at)
        );
        println!("  {:<12} {}", "", metrics_summary(record));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashwatch_core::{RatioMetrics, SnapshotKind};

    fn record(metrics: DerivedMetrics) -> TabRecord {
        TabRecord {
            tab_id: "1".into(),
            title: "Logs".into(),
            url: "https://kibana.example/app".into(),
            snapshot_type: SnapshotKind::Ratio,
            last_checked_at: 0,
            status: TabStatus::Ok,
            is_muted: false,
            metrics,
            extraction_error: None,
        }
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }

    #[test]
    fn test_metrics_summary() {
        let mut r = record(DerivedMetrics::Ratio(RatioMetrics {
            total_count: 200.0,
            good_count: 180.0,
            error_count: 20.0,
            error_rate: 10.0,
            ..Default::default()
        }));
        assert_eq!(metrics_summary(&r), "10.0% errors (20 of 200)");
        r.extraction_error = Some("no rows".into());
        assert_eq!(metrics_summary(&r), "error: no rows");
    }
}
