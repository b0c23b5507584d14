//! Configuration management for Ampster
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. The `entry` section plays the role of the
//! stored config entry and `options` overrides individual entry values.

use crate::error::{AmpsterError, Result};
use crate::uploader::UploadConfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

mod defaults;

/// Public bucket serving one `<COUNTRY>.json` document per supported country
pub const DEFAULT_BASE_URL: &str = "https://ampster.s3.us-east-1.amazonaws.com/electricity_prices/";

pub const DEFAULT_MINUTE: u8 = 5;
pub const DEFAULT_UPLOAD_INTERVAL: u32 = 15;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    /// Stored entry data
    pub entry: EntryData,

    /// Options that override entry data; changing them requires a reload
    pub options: EntryOptions,

    /// Optional price-threshold automation
    pub automation: AutomationConfig,

    /// Outbound HTTP limits
    pub http: HttpConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Web server binding configuration
    pub web: WebConfig,
}

/// Countries with a published price document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Country {
    NL,
    FR,
    BE,
    AT,
}

impl Country {
    pub const ALL: [Country; 4] = [Country::NL, Country::FR, Country::BE, Country::AT];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NL => "NL",
            Self::FR => "FR",
            Self::BE => "BE",
            Self::AT => "AT",
        }
    }

    /// Local timezone used to place the hourly refresh
    pub fn timezone(&self) -> chrono_tz::Tz {
        match self {
            Self::NL => chrono_tz::Europe::Amsterdam,
            Self::FR => chrono_tz::Europe::Paris,
            Self::BE => chrono_tz::Europe::Brussels,
            Self::AT => chrono_tz::Europe::Vienna,
        }
    }

    /// Map a UI language code to a country, falling back to NL
    pub fn from_language(lang: &str) -> Self {
        match lang.trim().to_lowercase().as_str() {
            "fr" => Self::FR,
            "be" => Self::BE,
            "de" | "at" => Self::AT,
            _ => Self::NL,
        }
    }

    /// Guess from a POSIX locale string such as `fr_FR.UTF-8`
    pub fn from_locale(locale: &str) -> Self {
        let lang = locale
            .split(['_', '.', '-', '@'])
            .next()
            .unwrap_or_default();
        Self::from_language(lang)
    }

    /// Guess from `LC_ALL` / `LANG`
    pub fn guess_from_env() -> Self {
        std::env::var("LC_ALL")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| std::env::var("LANG").ok())
            .map(|l| Self::from_locale(&l))
            .unwrap_or(Self::NL)
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Country {
    type Err = AmpsterError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                AmpsterError::validation(
                    "country_prefix".to_string(),
                    format!("unsupported country '{}'", s),
                )
            })
    }
}

/// Stored config entry values
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EntryData {
    /// Country whose price document is fetched; guessed from locale when unset
    pub country_prefix: Option<Country>,

    /// Minute of every hour at which prices are refreshed (0-59)
    pub minute: u8,

    /// Base URL the `<COUNTRY>.json` document is appended to
    pub base_url: String,

    /// Endpoint receiving sensor uploads
    pub upload_url: String,

    /// Value of the `X-API-Key` upload header
    pub api_key: String,

    /// Comma-separated sensor names to upload
    pub upload_sensors: String,

    /// Upload interval in minutes (1-1440)
    pub upload_interval: u32,
}

/// Options overriding entry data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EntryOptions {
    pub country_prefix: Option<Country>,
    pub minute: Option<u8>,
    pub base_url: Option<String>,
    pub upload_url: Option<String>,
    pub api_key: Option<String>,
    pub upload_sensors: Option<String>,
    pub upload_interval: Option<u32>,
}

/// Optional automation toggling an entity on a price threshold
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AutomationConfig {
    pub enabled: bool,

    /// Snapshot key holding the current price
    pub price_key: String,

    /// Turn the target on when the price is strictly below this value
    pub threshold: f64,

    /// Entity switched on/off
    pub target_entity: String,
}

/// Outbound HTTP limits
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct HttpConfig {
    /// Hard timeout for the price GET and the upload POST
    pub timeout_seconds: u64,

    /// Largest accepted price document
    pub max_body_bytes: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

/// Entry data with options applied and the country resolved
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySettings {
    pub country: Country,
    pub minute: u8,
    pub base_url: String,
    pub upload: UploadConfig,
}

impl EntrySettings {
    /// `{base_url}{country}.json`
    pub fn price_url(&self) -> String {
        format!("{}{}.json", self.base_url, self.country)
    }
}

impl EntryData {
    /// Apply options on top of entry data
    pub fn merged_with(&self, options: &EntryOptions) -> EntrySettings {
        let country = options
            .country_prefix
            .or(self.country_prefix)
            .unwrap_or_else(Country::guess_from_env);
        let pick = |opt: &Option<String>, base: &String| opt.clone().unwrap_or_else(|| base.clone());

        EntrySettings {
            country,
            minute: options.minute.unwrap_or(self.minute),
            base_url: pick(&options.base_url, &self.base_url),
            upload: UploadConfig::new(
                pick(&options.upload_url, &self.upload_url),
                pick(&options.api_key, &self.api_key),
                &pick(&options.upload_sensors, &self.upload_sensors),
                options.upload_interval.unwrap_or(self.upload_interval),
            ),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations
    pub fn load() -> Result<Self> {
        let default_paths = [
            "ampster.yaml",
            "/data/ampster.yaml",
            "/etc/ampster/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Effective entry settings (options over data)
    pub fn settings(&self) -> EntrySettings {
        self.entry.merged_with(&self.options)
    }

    /// Copy with the upload API key masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.entry.api_key.is_empty() {
            copy.entry.api_key = "***".to_string();
        }
        if let Some(key) = copy.options.api_key.as_mut()
            && !key.is_empty()
        {
            *key = "***".to_string();
        }
        copy
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let settings = self.settings();

        if settings.minute > 59 {
            return Err(AmpsterError::validation("minute", "Must be within 0..=59"));
        }

        if !(1..=1440).contains(&settings.upload.interval_minutes) {
            return Err(AmpsterError::validation(
                "upload_interval",
                "Must be within 1..=1440 minutes",
            ));
        }

        let base = settings.base_url.trim();
        if base.is_empty() {
            return Err(AmpsterError::validation("base_url", "Cannot be empty"));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(AmpsterError::validation(
                "base_url",
                "Must be an http(s) URL",
            ));
        }

        if self.http.timeout_seconds == 0 {
            return Err(AmpsterError::validation(
                "http.timeout_seconds",
                "Must be greater than 0",
            ));
        }

        if self.http.max_body_bytes == 0 {
            return Err(AmpsterError::validation(
                "http.max_body_bytes",
                "Must be greater than 0",
            ));
        }

        if self.automation.enabled && !self.automation.threshold.is_finite() {
            return Err(AmpsterError::validation(
                "automation.threshold",
                "Must be a finite number",
            ));
        }

        if self.web.port == 0 {
            return Err(AmpsterError::validation(
                "web.port",
                "Port must be greater than 0",
            ));
        }

        Ok(())
    }
}
