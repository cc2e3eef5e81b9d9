use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

pub const DEFAULT_PORT: u16 = 1153;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_TIMEZONE: &str = "Asia/Taipei";
pub const LINE_API_BASE: &str = "https://api.line.me";
pub const LINE_API_DATA_BASE: &str = "https://api-data.line.me";
pub const LINE_TIMEOUT_SECS: u64 = 30;
pub const LINE_UPLOAD_TIMEOUT_SECS: u64 = 60;
/// LINE rejects rich menu images above ~5 MB; keep a safety margin.
pub const MAX_IMAGE_BYTES: usize = 4_500_000;
pub const MAX_RUN_MESSAGE_CHARS: usize = 200;

/// Top-level config (richmenu.toml + RICHMENU_* env overrides).
///
/// Nested keys are separated by a double underscore in env vars, e.g.
/// `RICHMENU_SCHEDULER__POLL_INTERVAL_SECS=30`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RichMenuConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub line: LineConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: default_bind(),
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

/// Where uploaded menu images live. Menu `image_path`s are relative to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between due-job checks.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// IANA zone whose wall clock decides which jobs are due.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl SchedulerConfig {
    /// Parse `timezone` into a `chrono_tz::Tz`.
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| CoreError::UnknownTimezone(self.timezone.clone()))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            timezone: default_timezone(),
        }
    }
}

/// LINE Messaging API endpoints and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Binary content (images) goes to a separate data host.
    #[serde(default = "default_api_data_base")]
    pub api_data_base: String,
    #[serde(default = "default_line_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_data_base: default_api_data_base(),
            timeout_secs: LINE_TIMEOUT_SECS,
            upload_timeout_secs: LINE_UPLOAD_TIMEOUT_SECS,
        }
    }
}

/// JPEG quality ladder used when compressing menu images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    #[serde(default = "default_start_quality")]
    pub start_quality: u8,
    #[serde(default = "default_min_quality")]
    pub min_quality: u8,
    #[serde(default = "default_quality_step")]
    pub quality_step: u8,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            max_bytes: MAX_IMAGE_BYTES,
            start_quality: default_start_quality(),
            min_quality: default_min_quality(),
            quality_step: default_quality_step(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}
fn default_api_base() -> String {
    LINE_API_BASE.to_string()
}
fn default_api_data_base() -> String {
    LINE_API_DATA_BASE.to_string()
}
fn default_line_timeout() -> u64 {
    LINE_TIMEOUT_SECS
}
fn default_upload_timeout() -> u64 {
    LINE_UPLOAD_TIMEOUT_SECS
}
fn default_max_bytes() -> usize {
    MAX_IMAGE_BYTES
}
fn default_start_quality() -> u8 {
    90
}
fn default_min_quality() -> u8 {
    60
}
fn default_quality_step() -> u8 {
    10
}

fn home_dir() -> String {
    std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
}
fn default_db_path() -> String {
    format!("{}/.richmenu/richmenu.db", home_dir())
}
fn default_upload_dir() -> String {
    format!("{}/.richmenu/uploads", home_dir())
}

impl RichMenuConfig {
    /// Load config from a TOML file with RICHMENU_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.richmenu/richmenu.toml
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: RichMenuConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("RICHMENU_").split("__"))
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    format!("{}/.richmenu/richmenu.toml", home_dir())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_match_line_limits() {
        let cfg = RichMenuConfig::default();
        assert_eq!(cfg.gateway.port, 1153);
        assert_eq!(cfg.scheduler.poll_interval_secs, 60);
        assert_eq!(cfg.encoder.max_bytes, 4_500_000);
        assert_eq!(cfg.encoder.start_quality, 90);
        assert_eq!(cfg.encoder.min_quality, 60);
        assert_eq!(cfg.line.api_data_base, "https://api-data.line.me");
    }

    #[test]
    fn default_timezone_parses() {
        let tz = SchedulerConfig::default().tz().unwrap();
        assert_eq!(tz, chrono_tz::Asia::Taipei);
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let cfg = SchedulerConfig {
            timezone: "Mars/Olympus".to_string(),
            ..Default::default()
        };
        assert!(matches!(cfg.tz(), Err(CoreError::UnknownTimezone(_))));
    }

    #[test]
    fn file_and_env_are_merged() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "richmenu.toml",
                r#"
                [scheduler]
                timezone = "UTC"

                [encoder]
                max_bytes = 1000
                "#,
            )?;
            jail.set_env("RICHMENU_SCHEDULER__POLL_INTERVAL_SECS", "5");

            let cfg = RichMenuConfig::load(Some("richmenu.toml")).unwrap();
            assert_eq!(cfg.scheduler.timezone, "UTC");
            assert_eq!(cfg.scheduler.poll_interval_secs, 5);
            assert_eq!(cfg.encoder.max_bytes, 1000);
            // untouched sections keep their defaults
            assert_eq!(cfg.encoder.min_quality, 60);
            assert_eq!(cfg.gateway.port, DEFAULT_PORT);
            Ok(())
        });
    }
}
