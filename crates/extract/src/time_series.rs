use chrono::NaiveDateTime;
use dashwatch_core::{TimeSeriesRow, TimeSeriesSnapshot};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::options::ExtractOptions;
use crate::page::{element_text, parse_leading_float, selector, PageContent};

/// Words that contain a severity keyword but are harmless UI labels.
static SAFE_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)download|dropdown|markdown|breakdown").expect("safe words regex is valid")
});

/// Severity keywords, scanned in this order.
static ALERT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        "DOWN",
        "Disconnect",
        "Disconnected",
        "Error",
        "Critical",
        "Failed",
        "Failure",
        "Unreachable",
        "Offline",
        "Timeout",
    ]
    .iter()
    .map(|w| Regex::new(&format!(r"(?i)\b{}\b", w)).expect("alert keyword regex is valid"))
    .collect()
});

static ROW_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([0-9]{4}-[0-9]{2}-[0-9]{2})\s+([0-9]{2}:[0-9]{2}:[0-9]{2})").expect("row time regex is valid")
});

/// Upper-cased severity keywords found in `text`, first occurrence order.
pub fn scan_alert_words(text: &str) -> Vec<String> {
    let sanitized = SAFE_WORDS.replace_all(text, "___");
    let mut found: Vec<String> = Vec::new();
    for pattern in ALERT_PATTERNS.iter() {
        for m in pattern.find_iter(&sanitized) {
            let word = m.as_str().to_uppercase();
            if !found.contains(&word) {
                found.push(word);
            }
        }
    }
    found
}

pub fn extract_time_series(page: &PageContent, opts: &ExtractOptions) -> TimeSeriesSnapshot {
    let mut snapshot = TimeSeriesSnapshot {
        page_alert_words: scan_alert_words(&page.visible_text()),
        ..Default::default()
    };

    let (row_sel, cell_sel) = match (selector(r#"[role="row"]"#), selector(r#"[role="cell"]"#)) {
        (Ok(r), Ok(c)) => (r, c),
        (Err(e), _) | (_, Err(e)) => {
            snapshot.error = Some(e);
            return snapshot;
        }
    };

    let document = page.document();
    let mut unconvertible = 0usize;
    for row in document.select(&row_sel) {
        let cells: Vec<_> = row.select(&cell_sel).collect();
        if cells.len() < 2 {
            continue;
        }
        let time_text = element_text(cells[0]);
        let raw_text = element_text(cells[1]);
        let Some(caps) = ROW_TIME.captures(&time_text) else {
            continue;
        };
        let stamp = format!("{} {}", &caps[1], &caps[2]);
        let timestamp_ms = NaiveDateTime::parse_from_str(&stamp, "%Y-%m-%d %H:%M:%S")
            .ok()
            .and_then(|naive| opts.clock.to_epoch_ms(naive));
        let Some(timestamp_ms) = timestamp_ms else {
            unconvertible += 1;
            continue;
        };
        snapshot.rows.push(TimeSeriesRow {
            timestamp_ms,
            numeric_value: parse_leading_float(&raw_text),
            time_text,
            raw_text,
        });
    }

    snapshot.rows.sort_by_key(|r| r.timestamp_ms);
    if unconvertible > 0 {
        snapshot.error = Some(format!("{} row timestamp(s) could not be converted", unconvertible));
    }
    debug!(
        url = %page.url,
        rows = snapshot.rows.len(),
        words = snapshot.page_alert_words.len(),
        "Time-series extracted"
    );
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashwatch_core::DashboardClock;

    fn opts() -> ExtractOptions {
        ExtractOptions::default().with_clock(DashboardClock::Utc)
    }

    fn row(time: &str, value: &str) -> String {
        format!(
            r#"<div role="row"><div role="cell">{}</div><div role="cell">{}</div></div>"#,
            time, value
        )
    }

    #[test]
    fn test_safe_words_do_not_trigger_down() {
        let words = scan_alert_words("auto-download failed");
        assert_eq!(words, vec!["FAILED".to_string()]);
    }

    #[test]
    fn test_alert_words_are_deduplicated_uppercase() {
        let words = scan_alert_words("Error: host down. ERROR again, Disconnected; timeout");
        assert_eq!(words, vec!["DOWN", "DISCONNECTED", "ERROR", "TIMEOUT"]);
    }

    #[test]
    fn test_word_boundaries() {
        assert!(scan_alert_words("errors countdown shutdown").is_empty());
        assert!(scan_alert_words("Dropdown Markdown Breakdown").is_empty());
    }

    #[test]
    fn test_rows_sorted_and_values_tagged() {
        let html = format!(
            "<div>{}{}{}{}</div>",
            row("2025-12-13 10:02:00", "12.5 ms"),
            row("2025-12-13 10:00:00", "No data"),
            row("not a time", "99"),
            row("2025-12-13 10:01:00", "0"),
        );
        let snap = extract_time_series(&PageContent::from_html("http://grafana.local", html), &opts());
        assert!(snap.error.is_none());
        assert_eq!(snap.rows.len(), 3);
        assert_eq!(snap.rows[0].raw_text, "No data");
        assert!(!snap.rows[0].is_numeric());
        assert_eq!(snap.rows[1].numeric_value, Some(0.0));
        assert_eq!(snap.rows[2].numeric_value, Some(12.5));
        assert!(snap.rows[0].timestamp_ms < snap.rows[1].timestamp_ms);
    }

    #[test]
    fn test_row_with_single_cell_is_skipped() {
        let html = r#"<div role="row"><div role="cell">2025-12-13 10:00:00</div></div>"#;
        let snap = extract_time_series(&PageContent::from_html("u", html), &opts());
        assert!(snap.rows.is_empty());
    }

    #[test]
    fn test_invalid_calendar_date_is_reported() {
        let html = row("2025-13-45 10:00:00", "5");
        let snap = extract_time_series(&PageContent::from_html("u", html), &opts());
        assert!(snap.rows.is_empty());
        assert!(snap.error.is_some());
    }

    #[test]
    fn test_non_ascii_digit_row_is_skipped_not_errored() {
        let html = format!(
            "<div>{}{}</div>",
            row("۲۰۲۵-۱۲-۱۳ ۱۰:۰۰:۰۰", "5"),
            row("2025-12-13 10:01:00", "7"),
        );
        let snap = extract_time_series(&PageContent::from_html("u", html), &opts());
        assert!(snap.error.is_none());
        assert_eq!(snap.rows.len(), 1);
        assert_eq!(snap.rows[0].numeric_value, Some(7.0));
    }
}
