//! Label → code tables for the choices offered during intake.
//!
//! Users only ever see labels; the appointment API only ever sees codes.
//! The defaults mirror the desks and products the bot launched with and can be
//! replaced at startup with `Label=CODE;Label=CODE` strings.

use std::collections::HashSet;

use thiserror::Error;

const DEFAULT_LOCATIONS: &[(&str, &str)] = &[
    ("Amsterdam", "AM"),
    ("Den Haag", "DH"),
    ("Zwolle", "ZW"),
    ("Den Bosch", "DB"),
];

const DEFAULT_APPOINTMENT_TYPES: &[(&str, &str)] = &[
    ("Collecting residence document", "DOC"),
    ("Biometric data", "BIO"),
    ("Residence endorsement sticker", "VAA"),
    ("Return visa", "TKV"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub label: String,
    pub code: String,
}

impl CatalogEntry {
    pub fn new(label: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            code: code.into(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog {0} must contain at least one entry")]
    Empty(&'static str),
    #[error("catalog entry '{0}' must look like Label=CODE")]
    MalformedEntry(String),
    #[error("catalog code '{0}' must be ascii alphanumeric")]
    InvalidCode(String),
    #[error("catalog label '{0}' appears more than once")]
    DuplicateLabel(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    locations: Vec<CatalogEntry>,
    appointment_types: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(
        locations: Vec<CatalogEntry>,
        appointment_types: Vec<CatalogEntry>,
    ) -> Result<Self, CatalogError> {
        validate_entries("locations", &locations)?;
        validate_entries("appointment types", &appointment_types)?;

        Ok(Self {
            locations,
            appointment_types,
        })
    }

    pub fn locations(&self) -> &[CatalogEntry] {
        &self.locations
    }

    pub fn appointment_types(&self) -> &[CatalogEntry] {
        &self.appointment_types
    }

    pub fn location(&self, label: &str) -> Option<&CatalogEntry> {
        self.locations.iter().find(|entry| entry.label == label)
    }

    pub fn appointment_type(&self, label: &str) -> Option<&CatalogEntry> {
        self.appointment_types
            .iter()
            .find(|entry| entry.label == label)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            locations: builtin_entries(DEFAULT_LOCATIONS),
            appointment_types: builtin_entries(DEFAULT_APPOINTMENT_TYPES),
        }
    }
}

/// Parses `Label=CODE;Label=CODE`. Whitespace around labels and codes is ignored.
pub fn parse_entries(raw: &str) -> Result<Vec<CatalogEntry>, CatalogError> {
    raw.split(';')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (label, code) = item
                .split_once('=')
                .ok_or_else(|| CatalogError::MalformedEntry(item.to_string()))?;
            let label = label.trim();
            let code = code.trim();
            if label.is_empty() || code.is_empty() {
                return Err(CatalogError::MalformedEntry(item.to_string()));
            }

            Ok(CatalogEntry::new(label, code))
        })
        .collect()
}

fn builtin_entries(pairs: &[(&str, &str)]) -> Vec<CatalogEntry> {
    pairs
        .iter()
        .map(|(label, code)| CatalogEntry::new(*label, *code))
        .collect()
}

fn validate_entries(kind: &'static str, entries: &[CatalogEntry]) -> Result<(), CatalogError> {
    if entries.is_empty() {
        return Err(CatalogError::Empty(kind));
    }

    let mut seen = HashSet::new();
    for entry in entries {
        if !entry.code.bytes().all(|byte| byte.is_ascii_alphanumeric()) || entry.code.is_empty() {
            return Err(CatalogError::InvalidCode(entry.code.clone()));
        }
        if !seen.insert(entry.label.as_str()) {
            return Err(CatalogError::DuplicateLabel(entry.label.clone()));
        }
    }

    Ok(())
}
