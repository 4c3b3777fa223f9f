//! Page classification and DOM extraction for dashboard tabs.
//!
//! Everything here is a pure function of already retrieved page content.
//! Fetching the content is the job of a `TabHost` implementation.

pub mod classifier;
pub mod options;
pub mod page;
pub mod problem_list;
pub mod ratio;
pub mod time_series;

pub use classifier::{classify, read_page};
pub use options::ExtractOptions;
pub use page::{parse_leading_float, PageContent};
pub use problem_list::{extract_problem_list, normalize_duration};
pub use ratio::extract_ratio;
pub use time_series::{extract_time_series, scan_alert_words};
