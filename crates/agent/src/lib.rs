pub mod evaluator;
pub mod monitor;
pub mod ports;

pub use evaluator::{evaluate, Evaluation, Rules, TabHistory};
pub use monitor::{is_dashboard_url, Monitor};
pub use ports::{AlertSink, LogSink, TabHost};
