use serde::Deserialize;

use crate::channels::OutreachChannel;

/// Root application configuration. Loaded from environment variables
/// with the prefix `RELANCE__`; every field has a default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub quiet_hours: QuietHoursConfig,
    #[serde(default)]
    pub stop_policy: StopPolicyConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
}

/// Dispatch suppression window, evaluated in local time.
#[derive(Debug, Clone, Deserialize)]
pub struct QuietHoursConfig {
    /// First hour of the business day (inclusive).
    #[serde(default = "default_start_hour")]
    pub start_hour: u32,
    /// Hour at which the business day ends (exclusive).
    #[serde(default = "default_end_hour")]
    pub end_hour: u32,
    #[serde(default = "default_weekends_quiet")]
    pub weekends_quiet: bool,
    /// Offset of local time from UTC.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

/// Which line statuses halt a running outreach sequence.
#[derive(Debug, Clone, Deserialize)]
pub struct StopPolicyConfig {
    /// Stop as soon as a document is matched, before human validation.
    #[serde(default = "default_true")]
    pub stop_on_document_received: bool,
    #[serde(default = "default_true")]
    pub stop_on_expired: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "default_auto_match_threshold")]
    pub auto_match_threshold: f64,
    #[serde(default = "default_proposal_threshold")]
    pub proposal_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default = "default_enabled_channels")]
    pub enabled: Vec<OutreachChannel>,
}

// Default functions
fn default_tick_interval_secs() -> u64 {
    60
}
fn default_start_hour() -> u32 {
    8
}
fn default_end_hour() -> u32 {
    18
}
fn default_weekends_quiet() -> bool {
    true
}
fn default_true() -> bool {
    true
}
fn default_auto_match_threshold() -> f64 {
    0.85
}
fn default_proposal_threshold() -> f64 {
    0.30
}
fn default_enabled_channels() -> Vec<OutreachChannel> {
    OutreachChannel::ALL.to_vec()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
        }
    }
}

impl Default for QuietHoursConfig {
    fn default() -> Self {
        Self {
            start_hour: default_start_hour(),
            end_hour: default_end_hour(),
            weekends_quiet: default_weekends_quiet(),
            utc_offset_minutes: 0,
        }
    }
}

impl Default for StopPolicyConfig {
    fn default() -> Self {
        Self {
            stop_on_document_received: true,
            stop_on_expired: true,
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            auto_match_threshold: default_auto_match_threshold(),
            proposal_threshold: default_proposal_threshold(),
        }
    }
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_channels(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("RELANCE")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("channels.enabled"),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        tracing::debug!(
            tick_interval_secs = config.scheduler.tick_interval_secs,
            channels = ?config.channels.enabled,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Rejects settings the engines cannot run with.
    pub fn validate(&self) -> Result<(), crate::error::RelanceError> {
        let qh = &self.quiet_hours;
        if qh.start_hour > 23 || qh.end_hour > 24 || qh.start_hour >= qh.end_hour {
            return Err(crate::error::RelanceError::Config(format!(
                "quiet hours window {}..{} is invalid",
                qh.start_hour, qh.end_hour
            )));
        }
        let m = &self.matching;
        if !(0.0..=1.0).contains(&m.proposal_threshold)
            || !(0.0..=1.0).contains(&m.auto_match_threshold)
            || m.proposal_threshold > m.auto_match_threshold
        {
            return Err(crate::error::RelanceError::Config(format!(
                "matching thresholds proposal={} auto={} are invalid",
                m.proposal_threshold, m.auto_match_threshold
            )));
        }
        if self.scheduler.tick_interval_secs == 0 {
            return Err(crate::error::RelanceError::Config(
                "scheduler tick interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
