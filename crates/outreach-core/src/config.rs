use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DAILY_LIMIT: u32 = 40;
pub const DEFAULT_TIMEZONE: &str = "Europe/Madrid";
/// Mon..Fri, bit 1 = Monday .. bit 32 = Friday.
pub const DEFAULT_WORKING_DAYS: u8 = 0b0001_1111;
pub const DEFAULT_WORK_START: (u8, u8) = (9, 0);
pub const DEFAULT_WORK_END: (u8, u8) = (18, 0);
pub const DEFAULT_SCHEDULER_TICK_SECONDS: u64 = 30;
pub const DEFAULT_MAX_BATCH_PER_TICK: usize = 5;
/// Consecutive transient-failure ceiling before a classic enrollment is
/// failed outright.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;
/// Minimum spacing enforced between outbound messaging-provider API calls.
pub const MIN_API_CALL_INTERVAL_SECS: i64 = 60;

/// Pipeline phase constants.
pub const MAX_MESSAGES_PER_PHASE: u32 = 2;
pub const MAX_NURTURE_TOUCHES: u32 = 4;
pub const MAX_REACTIVATION_ATTEMPTS: u32 = 1;
pub const NURTURE_MIN_DAYS: i64 = 42;
pub const NURTURE_MAX_DAYS: i64 = 56;
pub const REACTIVATION_SILENCE_DAYS: i64 = 30;

/// Top-level configuration: `outreach.toml` + `OUTREACH_*` env overrides,
/// assembled once at startup and passed by value into the scheduler and
/// every engine — there is no global mutable settings singleton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub automation: AutomationDefaultsConfig,
    pub messaging: MessagingConfig,
    pub llm: LlmConfig,
}

impl Default for OutreachConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            scheduler: SchedulerConfig::default(),
            automation: AutomationDefaultsConfig::default(),
            messaging: MessagingConfig {
                base_url: default_messaging_base_url(),
                api_key: String::new(),
            },
            llm: LlmConfig {
                base_url: default_llm_base_url(),
                api_key: String::new(),
                model: default_llm_model(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
    #[serde(default = "default_max_batch_per_tick")]
    pub max_batch_per_tick: usize,
    /// Nominal tick range for the P2/P3/P4 staggered phases: 55-65 ticks ≈ 27-32 minutes at a 30s tick.
    #[serde(default = "default_stagger_min_ticks")]
    pub stagger_min_ticks: u32,
    #[serde(default = "default_stagger_max_ticks")]
    pub stagger_max_ticks: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_seconds: DEFAULT_SCHEDULER_TICK_SECONDS,
            max_batch_per_tick: DEFAULT_MAX_BATCH_PER_TICK,
            stagger_min_ticks: 55,
            stagger_max_ticks: 65,
        }
    }
}

/// Process-wide defaults applied to a user's `AutomationSettings` when they
/// have none on record yet. Per-user settings always take precedence once
/// they exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationDefaultsConfig {
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_working_days")]
    pub working_days: u8,
    #[serde(default = "default_work_start_hour")]
    pub work_start_hour: u8,
    #[serde(default = "default_work_start_minute")]
    pub work_start_minute: u8,
    #[serde(default = "default_work_end_hour")]
    pub work_end_hour: u8,
    #[serde(default = "default_work_end_minute")]
    pub work_end_minute: u8,
    #[serde(default = "default_min_delay_seconds")]
    pub min_delay_seconds: u32,
    #[serde(default = "default_max_delay_seconds")]
    pub max_delay_seconds: u32,
}

impl Default for AutomationDefaultsConfig {
    fn default() -> Self {
        Self {
            daily_limit: DEFAULT_DAILY_LIMIT,
            timezone: DEFAULT_TIMEZONE.to_string(),
            working_days: DEFAULT_WORKING_DAYS,
            work_start_hour: DEFAULT_WORK_START.0,
            work_start_minute: DEFAULT_WORK_START.1,
            work_end_hour: DEFAULT_WORK_END.0,
            work_end_minute: DEFAULT_WORK_END.1,
            min_delay_seconds: 60,
            max_delay_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    #[serde(default = "default_messaging_base_url")]
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.outreach/outreach.db")
}
fn default_tick_seconds() -> u64 {
    DEFAULT_SCHEDULER_TICK_SECONDS
}
fn default_max_batch_per_tick() -> usize {
    DEFAULT_MAX_BATCH_PER_TICK
}
fn default_stagger_min_ticks() -> u32 {
    55
}
fn default_stagger_max_ticks() -> u32 {
    65
}
fn default_daily_limit() -> u32 {
    DEFAULT_DAILY_LIMIT
}
fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}
fn default_working_days() -> u8 {
    DEFAULT_WORKING_DAYS
}
fn default_work_start_hour() -> u8 {
    DEFAULT_WORK_START.0
}
fn default_work_start_minute() -> u8 {
    DEFAULT_WORK_START.1
}
fn default_work_end_hour() -> u8 {
    DEFAULT_WORK_END.0
}
fn default_work_end_minute() -> u8 {
    DEFAULT_WORK_END.1
}
fn default_min_delay_seconds() -> u32 {
    60
}
fn default_max_delay_seconds() -> u32 {
    300
}
fn default_messaging_base_url() -> String {
    "https://api.unipile.com".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_llm_model() -> String {
    "claude-sonnet-4-6".to_string()
}

impl OutreachConfig {
    /// Load config from a TOML file with `OUTREACH_*` env var overrides.
    ///
    /// Checks, in order: explicit path argument, then `~/.outreach/outreach.toml`.
    /// A missing file is not fatal — the caller falls back to `Default` with a
    /// logged warning; a malformed file is.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let mut config: OutreachConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("OUTREACH_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Clamps `daily_limit` to the process-wide ceiling, checks the working
    /// window is well-formed, and parses `timezone` eagerly so a typo fails
    /// at startup rather than at the first automation-gate check.
    fn validate(&mut self) -> crate::error::Result<()> {
        if self.automation.daily_limit > DEFAULT_DAILY_LIMIT {
            self.automation.daily_limit = DEFAULT_DAILY_LIMIT;
        }

        let start = self.automation.work_start_hour as u32 * 60
            + self.automation.work_start_minute as u32;
        let end =
            self.automation.work_end_hour as u32 * 60 + self.automation.work_end_minute as u32;
        if start > end {
            return Err(crate::error::CoreError::Config(format!(
                "automation.work_start ({:02}:{:02}) is after automation.work_end ({:02}:{:02})",
                self.automation.work_start_hour,
                self.automation.work_start_minute,
                self.automation.work_end_hour,
                self.automation.work_end_minute,
            )));
        }

        self.automation.timezone.parse::<chrono_tz::Tz>().map_err(|_| {
            crate::error::CoreError::Config(format!(
                "automation.timezone {:?} is not a recognized IANA timezone",
                self.automation.timezone
            ))
        })?;

        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.outreach/outreach.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = AutomationDefaultsConfig::default();
        assert_eq!(cfg.daily_limit, 40);
        assert_eq!(cfg.timezone, "Europe/Madrid");
        assert_eq!(cfg.working_days, 0b0001_1111);
    }

    #[test]
    fn validate_clamps_daily_limit_above_the_default_ceiling() {
        let mut cfg = OutreachConfig::default();
        cfg.automation.daily_limit = 999;
        cfg.validate().unwrap();
        assert_eq!(cfg.automation.daily_limit, DEFAULT_DAILY_LIMIT);
    }

    #[test]
    fn validate_rejects_work_start_after_work_end() {
        let mut cfg = OutreachConfig::default();
        cfg.automation.work_start_hour = 19;
        cfg.automation.work_end_hour = 18;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_timezone() {
        let mut cfg = OutreachConfig::default();
        cfg.automation.timezone = "Not/ARealZone".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        let mut cfg = OutreachConfig::default();
        assert!(cfg.validate().is_ok());
    }
}
