use dashwatch_core::{Snapshot, SnapshotKind};
use tracing::debug;

use crate::options::ExtractOptions;
use crate::page::PageContent;
use crate::problem_list::extract_problem_list;
use crate::ratio::extract_ratio;
use crate::time_series::extract_time_series;

const RATIO_URL_MARKERS: &[&str] = &["kibana", "elastic", "app/discover", "app/dashboards"];

/// Outcome of classification. The fallback path has already run an
/// extractor, so it carries that snapshot along.
enum Detection {
    Marker(SnapshotKind),
    Probed(Snapshot),
}

fn marker_kind(page: &PageContent) -> Option<SnapshotKind> {
    let url = page.url_lower();
    let html = page.html_lower();
    if RATIO_URL_MARKERS.iter().any(|m| url.contains(m)) || html.contains("kibana") {
        return Some(SnapshotKind::Ratio);
    }
    if url.contains("zabbix") || html.contains("zabbix") {
        return Some(SnapshotKind::ProblemList);
    }
    if url.contains("grafana") || html.contains("grafana") {
        return Some(SnapshotKind::TimeSeries);
    }
    None
}

fn detect(page: &PageContent, opts: &ExtractOptions) -> Detection {
    if let Some(kind) = marker_kind(page) {
        return Detection::Marker(kind);
    }
    let problems = extract_problem_list(page, opts);
    if !problems.problems.is_empty() {
        return Detection::Probed(Snapshot::ProblemList(problems));
    }
    let ratio = extract_ratio(page, opts);
    if ratio.total_count > 0.0 {
        return Detection::Probed(Snapshot::Ratio(ratio));
    }
    Detection::Marker(SnapshotKind::TimeSeries)
}

/// Pick the extraction strategy for a page.
///
/// URL and markup markers are checked first (log search, then problem board,
/// then metrics explorer). Without a marker the problem-list and ratio
/// extractors are tried in turn, and time-series is the last resort.
pub fn classify(page: &PageContent, opts: &ExtractOptions) -> SnapshotKind {
    match detect(page, opts) {
        Detection::Marker(kind) => kind,
        Detection::Probed(snapshot) => snapshot.kind(),
    }
}

/// Classify and extract in one go.
pub fn read_page(page: &PageContent, opts: &ExtractOptions) -> Snapshot {
    let snapshot = match detect(page, opts) {
        Detection::Probed(snapshot) => snapshot,
        Detection::Marker(SnapshotKind::Ratio) => Snapshot::Ratio(extract_ratio(page, opts)),
        Detection::Marker(SnapshotKind::ProblemList) => {
            Snapshot::ProblemList(extract_problem_list(page, opts))
        }
        Detection::Marker(SnapshotKind::TimeSeries) => {
            Snapshot::TimeSeries(extract_time_series(page, opts))
        }
    };
    debug!(url = %page.url, kind = %snapshot.kind(), "Page read");
    snapshot
}
