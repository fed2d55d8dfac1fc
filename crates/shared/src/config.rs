use std::time::Duration;

use thiserror::Error;

use crate::catalog::{Catalog, CatalogError, parse_entries};
use crate::config_env::{
    optional_trimmed_env, parse_bool_env, parse_number_env, require_env,
};
use crate::timezone::{DEFAULT_APPOINTMENT_TIME_ZONE, normalize_time_zone};

const DEFAULT_APPOINTMENT_API_BASE: &str = "https://oap.ind.nl/oap/api/desks";
const DEFAULT_CHECK_INTERVAL_SECONDS: u64 = 10;
const DEFAULT_FIRST_CHECK_DELAY_MS: u64 = 200;
const DEFAULT_PROBE_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_KEEP_AWAKE_INTERVAL_SECONDS: u64 = 29 * 60;
const DEFAULT_PORT: u16 = 8443;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployMode {
    /// Long-poll `getUpdates`; the process is expected to stay up on its own.
    Polling,
    /// Receive updates through a webhook on a host that suspends idle processes.
    Hosted,
}

impl DeployMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Polling => "polling",
            Self::Hosted => "hosted",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "polling" => Some(Self::Polling),
            "hosted" | "webhook" => Some(Self::Hosted),
            _ => None,
        }
    }
}

/// Knobs for how each watch job is probed.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub appointment_api_base: String,
    pub time_zone: String,
    pub check_interval: Duration,
    pub first_check_delay: Duration,
    pub notify_on_expiry: bool,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            appointment_api_base: DEFAULT_APPOINTMENT_API_BASE.to_string(),
            time_zone: DEFAULT_APPOINTMENT_TIME_ZONE.to_string(),
            check_interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECONDS),
            first_check_delay: Duration::from_millis(DEFAULT_FIRST_CHECK_DELAY_MS),
            notify_on_expiry: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeepAliveSettings {
    pub deploy_mode: DeployMode,
    pub keep_awake: bool,
    pub interval: Duration,
    pub public_base_url: Option<String>,
}

impl KeepAliveSettings {
    /// Self-pinging only matters on hosts that suspend idle webhook processes.
    pub fn is_enabled(&self) -> bool {
        self.deploy_mode == DeployMode::Hosted
            && self.keep_awake
            && self.public_base_url.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram_bot_token: String,
    pub deploy_mode: DeployMode,
    pub public_base_url: Option<String>,
    pub bind_addr: String,
    pub probe_timeout_seconds: u64,
    pub keep_awake: bool,
    pub keep_awake_interval_seconds: u64,
    pub watch: WatchSettings,
    pub catalog: Catalog,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    MissingVar(String),
    #[error("invalid integer in env var {0}")]
    ParseInt(String),
    #[error("invalid boolean in env var {0}")]
    ParseBool(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("invalid catalog in env var {key}: {source}")]
    Catalog {
        key: String,
        #[source]
        source: CatalogError,
    },
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let telegram_bot_token = require_env("TELEGRAM_BOT_TOKEN")?;

        let deploy_mode = match optional_trimmed_env("DEPLOY_MODE") {
            Some(raw) => DeployMode::parse(&raw).ok_or_else(|| {
                ConfigError::InvalidConfiguration(format!(
                    "DEPLOY_MODE must be 'polling' or 'hosted', got '{raw}'"
                ))
            })?,
            None => DeployMode::Polling,
        };

        let public_base_url = optional_trimmed_env("PUBLIC_BASE_URL")
            .map(|raw| normalize_base_url("PUBLIC_BASE_URL", &raw))
            .transpose()?;
        if deploy_mode == DeployMode::Hosted && public_base_url.is_none() {
            return Err(ConfigError::MissingVar("PUBLIC_BASE_URL".to_string()));
        }

        let bind_host =
            optional_trimmed_env("BIND_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_number_env("PORT", DEFAULT_PORT)?;

        let appointment_api_base = optional_trimmed_env("APPOINTMENT_API_BASE")
            .map(|raw| normalize_base_url("APPOINTMENT_API_BASE", &raw))
            .transpose()?
            .unwrap_or_else(|| DEFAULT_APPOINTMENT_API_BASE.to_string());

        let time_zone = match optional_trimmed_env("APPOINTMENT_TIME_ZONE") {
            Some(raw) => normalize_time_zone(&raw).ok_or_else(|| {
                ConfigError::InvalidConfiguration(format!(
                    "APPOINTMENT_TIME_ZONE '{raw}' is not a valid IANA timezone"
                ))
            })?,
            None => DEFAULT_APPOINTMENT_TIME_ZONE.to_string(),
        };

        let check_interval_seconds =
            parse_number_env("CHECK_INTERVAL_SECONDS", DEFAULT_CHECK_INTERVAL_SECONDS)?;
        if check_interval_seconds == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "CHECK_INTERVAL_SECONDS must be greater than zero".to_string(),
            ));
        }

        let keep_awake_interval_seconds = parse_number_env(
            "KEEP_AWAKE_INTERVAL_SECONDS",
            DEFAULT_KEEP_AWAKE_INTERVAL_SECONDS,
        )?;
        if keep_awake_interval_seconds == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "KEEP_AWAKE_INTERVAL_SECONDS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            telegram_bot_token,
            deploy_mode,
            public_base_url,
            bind_addr: format!("{bind_host}:{port}"),
            probe_timeout_seconds: parse_number_env(
                "PROBE_TIMEOUT_SECONDS",
                DEFAULT_PROBE_TIMEOUT_SECONDS,
            )?,
            keep_awake: parse_bool_env("KEEP_AWAKE", true)?,
            keep_awake_interval_seconds,
            watch: WatchSettings {
                appointment_api_base,
                time_zone,
                check_interval: Duration::from_secs(check_interval_seconds),
                first_check_delay: Duration::from_millis(parse_number_env(
                    "FIRST_CHECK_DELAY_MS",
                    DEFAULT_FIRST_CHECK_DELAY_MS,
                )?),
                notify_on_expiry: parse_bool_env("NOTIFY_ON_EXPIRY", false)?,
            },
            catalog: catalog_from_env()?,
        })
    }

    pub fn keep_alive(&self) -> KeepAliveSettings {
        KeepAliveSettings {
            deploy_mode: self.deploy_mode,
            keep_awake: self.keep_awake,
            interval: Duration::from_secs(self.keep_awake_interval_seconds),
            public_base_url: self.public_base_url.clone(),
        }
    }
}

/// Loads a `.env` file from the working directory when one exists.
pub fn load_dotenv() -> Result<(), String> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(format!("failed to load .env file: {err}")),
    }
}

fn catalog_from_env() -> Result<Catalog, ConfigError> {
    let defaults = Catalog::default();

    let locations = match optional_trimmed_env("LOCATION_CODES") {
        Some(raw) => parse_entries(&raw).map_err(|source| ConfigError::Catalog {
            key: "LOCATION_CODES".to_string(),
            source,
        })?,
        None => defaults.locations().to_vec(),
    };
    let appointment_types = match optional_trimmed_env("APPOINTMENT_TYPE_CODES") {
        Some(raw) => parse_entries(&raw).map_err(|source| ConfigError::Catalog {
            key: "APPOINTMENT_TYPE_CODES".to_string(),
            source,
        })?,
        None => defaults.appointment_types().to_vec(),
    };

    Catalog::new(locations, appointment_types).map_err(|source| ConfigError::Catalog {
        key: "LOCATION_CODES/APPOINTMENT_TYPE_CODES".to_string(),
        source,
    })
}

fn normalize_base_url(key: &str, raw: &str) -> Result<String, ConfigError> {
    if !raw.starts_with("http://") && !raw.starts_with("https://") {
        return Err(ConfigError::InvalidConfiguration(format!(
            "{key} must start with http:// or https://"
        )));
    }

    Ok(raw.trim_end_matches('/').to_string())
}
