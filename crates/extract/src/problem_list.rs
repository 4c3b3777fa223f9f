use std::collections::HashSet;

use dashwatch_core::{ProblemEntry, ProblemListSnapshot};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::options::ExtractOptions;
use crate::page::{element_text, selector, PageContent};

static HOURS: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]+)h").expect("hours regex is valid"));
static MINUTES: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]+)m").expect("minutes regex is valid"));
static SECONDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]+)s").expect("seconds regex is valid"));

const MIN_CELLS: usize = 7;
const TIME_CELL: usize = 0;
const HOST_CELL: usize = 4;
const PROBLEM_CELL: usize = 5;
const DURATION_CELL: usize = 6;

fn component(re: &Regex, text: &str) -> f64 {
    re.captures(text)
        .and_then(|c| c[1].parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Convert a duration like `"1h 2m 3s"` into minutes.
///
/// Each of the `h`/`m`/`s` components is optional and the order does not
/// matter. Text without any component is 0.
pub fn normalize_duration(text: &str) -> f64 {
    component(&HOURS, text) * 60.0 + component(&MINUTES, text) + component(&SECONDS, text) / 60.0
}

pub fn extract_problem_list(page: &PageContent, opts: &ExtractOptions) -> ProblemListSnapshot {
    let mut snapshot = ProblemListSnapshot::default();

    let sels = selector("table").and_then(|t| {
        let rows = selector("tbody tr")?;
        let cells = selector("td")?;
        Ok((t, rows, cells))
    });
    let (table_sel, row_sel, cell_sel) = match sels {
        Ok(s) => s,
        Err(e) => {
            snapshot.error = Some(e);
            return snapshot;
        }
    };

    let document = page.document();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    for table in document.select(&table_sel) {
        for row in table.select(&row_sel) {
            let cells: Vec<_> = row.select(&cell_sel).collect();
            if cells.len() < MIN_CELLS {
                continue;
            }
            let row_text = row.text().collect::<String>().to_lowercase();
            if row_text.contains("resolved") {
                continue;
            }

            let problem_text = element_text(cells[PROBLEM_CELL]);
            let duration_text = element_text(cells[DURATION_CELL]);
            if problem_text.is_empty() || duration_text.is_empty() {
                continue;
            }
            let host = element_text(cells[HOST_CELL]);
            if !seen.insert((host.clone(), problem_text.clone())) {
                continue;
            }

            let duration_minutes = normalize_duration(&duration_text);
            snapshot.problems.push(ProblemEntry {
                time: element_text(cells[TIME_CELL]),
                host,
                problem_text,
                should_alert: duration_minutes >= opts.problem_min_minutes
                    && duration_minutes <= opts.problem_max_minutes,
                duration_text,
                duration_minutes,
            });
        }
    }

    debug!(url = %page.url, problems = snapshot.problems.len(), "Problem list extracted");
    snapshot
}
