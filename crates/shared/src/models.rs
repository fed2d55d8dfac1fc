use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::catalog::CatalogEntry;

pub type ChatId = i64;

pub const MIN_PEOPLE: u8 = 1;
pub const MAX_PEOPLE: u8 = 6;

/// User-facing date format for deadlines and found slots.
pub const DISPLAY_DATE_FORMAT: &str = "%d-%m-%Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Active,
    /// A slot was found, or the API failed in a way that ends the watch.
    Completed,
    Cancelled,
    /// The deadline passed without a qualifying slot.
    Expired,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

/// Everything the intake dialogue collects before a job exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub chat_id: ChatId,
    pub location: CatalogEntry,
    pub appointment_type: CatalogEntry,
    pub num_people: u8,
    pub before_date: NaiveDate,
}

impl JobSpec {
    pub fn name(&self) -> String {
        format!(
            "{}, {} x {}, before {}",
            self.location.label,
            self.num_people,
            self.appointment_type.label,
            self.before_date.format(DISPLAY_DATE_FORMAT)
        )
    }

    /// `{base}/{location}/slots/?productKey={type}&persons={n}`
    pub fn query_url(&self, api_base: &str) -> Result<String, url::ParseError> {
        let base = api_base.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/{}/slots/", self.location.code))?;
        url.query_pairs_mut()
            .append_pair("productKey", &self.appointment_type.code)
            .append_pair("persons", &self.num_people.to_string());

        Ok(url.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchJob {
    pub id: JobId,
    pub chat_id: ChatId,
    pub location: CatalogEntry,
    pub appointment_type: CatalogEntry,
    pub num_people: u8,
    pub before_date: NaiveDate,
    pub query_url: String,
    pub name: String,
    pub state: JobState,
}

impl WatchJob {
    pub fn from_spec(spec: JobSpec, api_base: &str) -> Result<Self, url::ParseError> {
        let query_url = spec.query_url(api_base)?;
        let name = spec.name();

        Ok(Self {
            id: JobId::new(),
            chat_id: spec.chat_id,
            location: spec.location,
            appointment_type: spec.appointment_type,
            num_people: spec.num_people,
            before_date: spec.before_date,
            query_url,
            name,
            state: JobState::Active,
        })
    }

    pub fn is_active(&self) -> bool {
        self.state == JobState::Active
    }

    /// Moves an active job into a terminal state. Returns `false` when the job
    /// had already left `Active`, in which case nothing changes.
    pub fn finish(&mut self, next: JobState) -> bool {
        if !self.is_active() || next == JobState::Active {
            return false;
        }

        self.state = next;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProbeFailure {
    #[error("unreachable")]
    Unreachable,
    #[error("api-schema-changed")]
    SchemaChanged,
}

impl ProbeFailure {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Unreachable => "unreachable",
            Self::SchemaChanged => "api-schema-changed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    NoMatchYet,
    Matched(NaiveDateTime),
    Fatal(ProbeFailure),
}
