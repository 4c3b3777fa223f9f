use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::clock::DashboardClock;
use crate::error::{Error, Result};
use crate::paths::Paths;

/// Detection thresholds and extraction knobs for the monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    /// Poll cycle period in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Trailing window for time-series rows.
    #[serde(default = "default_history_minutes")]
    pub history_minutes: u64,
    /// Percent drop below the moving average that counts as a sudden drop.
    #[serde(default = "default_change_threshold")]
    pub change_threshold: f64,
    /// Number of trailing numeric samples (latest included) used for the moving average.
    #[serde(default = "default_average_count")]
    pub average_count: usize,
    #[serde(default = "default_problem_min_minutes")]
    pub problem_min_minutes: f64,
    #[serde(default = "default_problem_max_minutes")]
    pub problem_max_minutes: f64,
    /// Error-rate percentage above which a log-ratio page alerts.
    #[serde(default = "default_error_rate_threshold")]
    pub error_rate_threshold: f64,
    /// Staleness after which a log-ratio page is considered frozen.
    #[serde(default = "default_data_freeze_timeout_ms")]
    pub data_freeze_timeout_ms: i64,
    #[serde(default = "default_alert_log_capacity")]
    pub alert_log_capacity: usize,
    /// Lower-case label fragments that mark a return code as healthy.
    #[serde(default = "default_known_good_codes")]
    pub known_good_codes: Vec<String>,
    /// IANA zone the dashboards render their timestamps in. `None` = local time.
    #[serde(default)]
    pub timezone: Option<String>,
}

fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_history_minutes() -> u64 {
    5
}

fn default_change_threshold() -> f64 {
    50.0
}

fn default_average_count() -> usize {
    20
}

fn default_problem_min_minutes() -> f64 {
    5.0
}

fn default_problem_max_minutes() -> f64 {
    10.0
}

fn default_error_rate_threshold() -> f64 {
    5.0
}

fn default_data_freeze_timeout_ms() -> i64 {
    120_000
}

fn default_alert_log_capacity() -> usize {
    50
}

fn default_known_good_codes() -> Vec<String> {
    vec!["free0000".to_string(), "siam0000".to_string()]
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            history_minutes: default_history_minutes(),
            change_threshold: default_change_threshold(),
            average_count: default_average_count(),
            problem_min_minutes: default_problem_min_minutes(),
            problem_max_minutes: default_problem_max_minutes(),
            error_rate_threshold: default_error_rate_threshold(),
            data_freeze_timeout_ms: default_data_freeze_timeout_ms(),
            alert_log_capacity: default_alert_log_capacity(),
            known_good_codes: default_known_good_codes(),
            timezone: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    /// Host of Chrome's remote debugging endpoint.
    #[serde(default = "default_cdp_host")]
    pub cdp_host: String,
    #[serde(default = "default_cdp_port")]
    pub cdp_port: u16,
    /// Per-tab budget for reading a page before the tab is skipped for the cycle.
    #[serde(default = "default_page_timeout_secs")]
    pub page_timeout_secs: u64,
}

fn default_cdp_host() -> String {
    "127.0.0.1".to_string()
}

fn default_cdp_port() -> u16 {
    9222
}

fn default_page_timeout_secs() -> u64 {
    10
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            cdp_host: default_cdp_host(),
            cdp_port: default_cdp_port(),
            page_timeout_secs: default_page_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlConfig {
    #[serde(default = "default_control_host")]
    pub host: String,
    #[serde(default = "default_control_port")]
    pub port: u16,
}

fn default_control_host() -> String {
    "127.0.0.1".to_string()
}

fn default_control_port() -> u16 {
    18795
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            host: default_control_host(),
            port: default_control_port(),
        }
    }
}

impl ControlConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevolverConfig {
    /// Rotation interval used until one is set through a command.
    #[serde(default = "default_revolver_interval_ms")]
    pub interval_ms: u64,
}

fn default_revolver_interval_ms() -> u64 {
    3000
}

impl Default for RevolverConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_revolver_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyConfig {
    /// Ring the terminal bell on every new alert.
    #[serde(default = "default_true")]
    pub bell: bool,
    /// Also raise a desktop notification (osascript / notify-send).
    #[serde(default)]
    pub desktop: bool,
}

fn default_true() -> bool {
    true
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            bell: true,
            desktop: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub revolver: RevolverConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let m = &self.monitor;
        if m.poll_interval_ms == 0 {
            return Err(Error::Config("monitor.pollIntervalMs must be > 0".into()));
        }
        if m.problem_min_minutes > m.problem_max_minutes {
            return Err(Error::Config(format!(
                "monitor.problemMinMinutes ({}) exceeds problemMaxMinutes ({})",
                m.problem_min_minutes, m.problem_max_minutes
            )));
        }
        if m.alert_log_capacity == 0 {
            return Err(Error::Config("monitor.alertLogCapacity must be > 0".into()));
        }
        DashboardClock::from_config(m.timezone.as_deref())?;
        Ok(())
    }
}
