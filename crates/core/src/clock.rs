//! Wall-clock helpers for dashboard timestamps.
//!
//! Dashboards render times without an offset, so the zone they are rendered
//! in has to be configured. Without a configured zone the host's local time
//! is assumed, which matches what the browser itself would do.

use chrono::{Local, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DashboardClock {
    #[default]
    Local,
    Zone(Tz),
    /// Fixed UTC, mostly useful for tests.
    Utc,
}

impl DashboardClock {
    pub fn from_config(timezone: Option<&str>) -> Result<Self> {
        match timezone.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(Self::Local),
            Some(name) if name.eq_ignore_ascii_case("utc") => Ok(Self::Utc),
            Some(name) => name
                .parse::<Tz>()
                .map(Self::Zone)
                .map_err(|_| Error::Config(format!("Unknown timezone: {}", name))),
        }
    }

    /// Convert a naive dashboard time to epoch milliseconds.
    ///
    /// Ambiguous times (DST fold) resolve to the earlier instant. Times that
    /// fall into a DST gap have no instant and yield `None`.
    pub fn to_epoch_ms(&self, naive: NaiveDateTime) -> Option<i64> {
        match self {
            Self::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.timestamp_millis()),
            Self::Zone(tz) => tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.timestamp_millis()),
            Self::Utc => Some(Utc.from_utc_datetime(&naive).timestamp_millis()),
        }
    }
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
