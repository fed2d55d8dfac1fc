use std::env;
use std::str::FromStr;

use crate::config::ConfigError;

pub(crate) fn require_env(key: &str) -> Result<String, ConfigError> {
    optional_trimmed_env(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()))
}

/// Parses a numeric variable, falling back to `default` when it is unset or blank.
pub(crate) fn parse_number_env<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match optional_trimmed_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::ParseInt(key.to_string())),
        None => Ok(default),
    }
}

pub(crate) fn parse_bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    optional_trimmed_env(key).map_or(Ok(default), |raw| {
        parse_bool(&raw).ok_or_else(|| ConfigError::ParseBool(key.to_string()))
    })
}

pub(crate) fn optional_trimmed_env(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
