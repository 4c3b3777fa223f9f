pub mod clock;
pub mod config;
pub mod error;
pub mod paths;
pub mod types;

pub use clock::DashboardClock;
pub use config::Config;
pub use error::{Error, Result};
pub use paths::Paths;
pub use types::{
    AlertEvent, DerivedMetrics, ExtensionState, ProblemEntry, ProblemListMetrics,
    ProblemListSnapshot, RatioMetrics, RatioSnapshot, RevolverState, Snapshot, SnapshotKind,
    SuddenDrop, TabId, TabInfo, TabRecord, TabStatus, TimeSeriesMetrics, TimeSeriesRow,
    TimeSeriesSnapshot,
};
