use chrono::NaiveDateTime;
use dashwatch_core::RatioSnapshot;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::options::ExtractOptions;
use crate::page::{element_text, parse_leading_float, selector, PageContent};

/// Log-search event time, e.g. `Dec 13, 2025 @ 00:52:09`.
static EVENT_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\s+([0-9]+)\s*,\s*([0-9]{4})\s*@\s*([0-9]{2}:[0-9]{2}:[0-9]{2})",
    )
    .expect("event time regex is valid")
});

fn clean_cell(text: String) -> String {
    text.replace('\n', "")
}

pub fn extract_ratio(page: &PageContent, opts: &ExtractOptions) -> RatioSnapshot {
    let mut snapshot = RatioSnapshot::default();

    let sels = selector("table").and_then(|t| {
        let rows = selector("tr")?;
        let cells = selector("td")?;
        Ok((t, rows, cells))
    });
    match sels {
        Ok((table_sel, row_sel, cell_sel)) => {
            let document = page.document();
            for table in document.select(&table_sel) {
                for row in table.select(&row_sel) {
                    let cells: Vec<_> = row.select(&cell_sel).collect();
                    if cells.len() < 2 {
                        continue;
                    }
                    let label = clean_cell(element_text(cells[0])).to_lowercase();
                    let count = clean_cell(element_text(cells[1])).replace(',', "");
                    let Some(n) = parse_leading_float(&count).filter(|n| *n > 0.0) else {
                        continue;
                    };
                    snapshot.total_count += n;
                    if opts.known_good_codes.iter().any(|code| label.contains(code.as_str())) {
                        snapshot.good_count += n;
                    } else if !label.contains("label") && !label.contains("keyword") {
                        snapshot.error_count += n;
                    }
                }
            }
        }
        Err(e) => snapshot.error = Some(e),
    }

    if snapshot.total_count > 0.0 {
        snapshot.error_rate = snapshot.error_count / snapshot.total_count * 100.0;
    }

    let text = page.visible_text();
    if let Some(caps) = EVENT_TIME.captures_iter(&text).last() {
        snapshot.last_event_text = Some(caps[0].to_string());
        let stamp = format!("{} {} {} {}", &caps[1], &caps[2], &caps[3], &caps[4]);
        let converted = NaiveDateTime::parse_from_str(&stamp, "%b %d %Y %H:%M:%S")
            .ok()
            .and_then(|naive| opts.clock.to_epoch_ms(naive));
        match converted {
            Some(ms) => snapshot.last_event_time_ms = Some(ms),
            None => {
                let msg = format!("unconvertible event time: {}", &caps[0]);
                snapshot.error = Some(match snapshot.error.take() {
                    Some(prev) => format!("{}; {}", prev, msg),
                    None => msg,
                });
            }
        }
    }

    debug!(
        url = %page.url,
        total = snapshot.total_count,
        errors = snapshot.error_count,
        rate = snapshot.error_rate,
        "Ratio extracted"
    );
    snapshot
}
