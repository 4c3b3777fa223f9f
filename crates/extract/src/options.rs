use dashwatch_core::config::MonitorConfig;
use dashwatch_core::{DashboardClock, Result};

/// Knobs the extractors need from the monitor configuration.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub clock: DashboardClock,
    pub problem_min_minutes: f64,
    pub problem_max_minutes: f64,
    /// Lower-case fragments; a ratio label containing one counts as healthy.
    pub known_good_codes: Vec<String>,
}

impl ExtractOptions {
    pub fn from_config(config: &MonitorConfig) -> Result<Self> {
        Ok(Self {
            clock: DashboardClock::from_config(config.timezone.as_deref())?,
            problem_min_minutes: config.problem_min_minutes,
            problem_max_minutes: config.problem_max_minutes,
            known_good_codes: config
                .known_good_codes
                .iter()
                .map(|c| c.to_lowercase())
                .collect(),
        })
    }

    pub fn with_clock(mut self, clock: DashboardClock) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        let config = MonitorConfig::default();
        Self {
            clock: DashboardClock::Local,
            problem_min_minutes: config.problem_min_minutes,
            problem_max_minutes: config.problem_max_minutes,
            known_good_codes: config.known_good_codes,
        }
    }
}
