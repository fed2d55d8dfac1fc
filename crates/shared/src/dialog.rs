//! Intake dialogue that turns four chat replies into a [`WatchJob`].
//!
//! Sessions are keyed by chat. `start` always replaces whatever session the
//! chat had; finishing or cancelling removes it.

use std::collections::HashMap;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::warn;

use crate::catalog::{Catalog, CatalogEntry};
use crate::models::{ChatId, JobSpec, MAX_PEOPLE, MIN_PEOPLE, WatchJob};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Location,
    AppointmentType,
    NumPeople,
    BeforeDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogSession {
    pub stage: Stage,
    location: Option<CatalogEntry>,
    appointment_type: Option<CatalogEntry>,
    num_people: Option<u8>,
}

impl DialogSession {
    fn new() -> Self {
        Self {
            stage: Stage::Location,
            location: None,
            appointment_type: None,
            num_people: None,
        }
    }
}

#[derive(Debug)]
pub enum DialogStep {
    /// The reply was stored; ask for the next stage.
    Next(Stage),
    /// All four answers are in. The session is gone and the job is ready to schedule.
    Completed(WatchJob),
    /// The date looked right but did not parse. The session is gone, no job was built.
    Aborted,
}

#[derive(Debug, Error)]
pub enum DialogError {
    #[error("chat {0} has no intake session")]
    NoSession(ChatId),
    #[error("input rejected at {0:?} stage")]
    Rejected(Stage),
    #[error("failed to build appointment query url: {0}")]
    QueryUrl(#[from] url::ParseError),
}

pub struct DialogController {
    catalog: Catalog,
    api_base: String,
    sessions: HashMap<ChatId, DialogSession>,
}

impl DialogController {
    pub fn new(catalog: Catalog, api_base: impl Into<String>) -> Self {
        Self {
            catalog,
            api_base: api_base.into(),
            sessions: HashMap::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn start(&mut self, chat_id: ChatId) -> Stage {
        let session = DialogSession::new();
        let stage = session.stage;
        self.sessions.insert(chat_id, session);
        stage
    }

    /// Drops the chat's session. Returns whether there was one.
    pub fn cancel(&mut self, chat_id: ChatId) -> bool {
        self.sessions.remove(&chat_id).is_some()
    }

    pub fn stage(&self, chat_id: ChatId) -> Option<Stage> {
        self.sessions.get(&chat_id).map(|session| session.stage)
    }

    /// Input filter for the chat's current stage. Messages it rejects should
    /// never reach [`DialogController::advance`].
    pub fn accepts(&self, chat_id: ChatId, text: &str) -> bool {
        self.stage(chat_id)
            .is_some_and(|stage| matches_stage(&self.catalog, stage, text))
    }

    pub fn advance(&mut self, chat_id: ChatId, text: &str) -> Result<DialogStep, DialogError> {
        let session = self
            .sessions
            .get_mut(&chat_id)
            .ok_or(DialogError::NoSession(chat_id))?;

        match session.stage {
            Stage::Location => {
                let entry = self
                    .catalog
                    .location(text)
                    .ok_or(DialogError::Rejected(Stage::Location))?;
                session.location = Some(entry.clone());
                session.stage = Stage::AppointmentType;
                Ok(DialogStep::Next(Stage::AppointmentType))
            }
            Stage::AppointmentType => {
                let entry = self
                    .catalog
                    .appointment_type(text)
                    .ok_or(DialogError::Rejected(Stage::AppointmentType))?;
                session.appointment_type = Some(entry.clone());
                session.stage = Stage::NumPeople;
                Ok(DialogStep::Next(Stage::NumPeople))
            }
            Stage::NumPeople => {
                let num_people =
                    parse_num_people(text).ok_or(DialogError::Rejected(Stage::NumPeople))?;
                session.num_people = Some(num_people);
                session.stage = Stage::BeforeDate;
                Ok(DialogStep::Next(Stage::BeforeDate))
            }
            Stage::BeforeDate => {
                if !looks_like_display_date(text) {
                    return Err(DialogError::Rejected(Stage::BeforeDate));
                }

                let Some(session) = self.sessions.remove(&chat_id) else {
                    return Err(DialogError::NoSession(chat_id));
                };

                let Some(before_date) = parse_display_date(text) else {
                    warn!(
                        chat_id,
                        input = text,
                        "date passed the dd-mm-yyyy filter but could not be parsed"
                    );
                    return Ok(DialogStep::Aborted);
                };

                let (Some(location), Some(appointment_type), Some(num_people)) =
                    (session.location, session.appointment_type, session.num_people)
                else {
                    warn!(chat_id, "intake session reached the date stage incomplete");
                    return Ok(DialogStep::Aborted);
                };

                let spec = JobSpec {
                    chat_id,
                    location,
                    appointment_type,
                    num_people,
                    before_date,
                };
                let job = WatchJob::from_spec(spec, &self.api_base)?;
                Ok(DialogStep::Completed(job))
            }
        }
    }
}

pub fn matches_stage(catalog: &Catalog, stage: Stage, text: &str) -> bool {
    match stage {
        Stage::Location => catalog.location(text).is_some(),
        Stage::AppointmentType => catalog.appointment_type(text).is_some(),
        Stage::NumPeople => parse_num_people(text).is_some(),
        Stage::BeforeDate => {
            parse_display_date(text).is_some()
        }
    }
}

fn parse_num_people(text: &str) -> Option<u8> {
    let [digit] = text.as_bytes() else {
        return None;
    };
    if !digit.is_ascii_digit() {
        return None;
    }

    let value = digit - b'0';
    (MIN_PEOPLE..=MAX_PEOPLE).contains(&value).then_some(value)
}

/// `d-m-yyyy` with one or two digits for day and month, like `%d-%m-%Y`.
fn display_date_parts(text: &str) -> Option<(u32, u32, i32)> {
    let mut parts = text.split('-');
    let (day, month, year) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let digits = |part: &str, lengths: std::ops::RangeInclusive<usize>| {
        lengths.contains(&part.len()) && part.bytes().all(|byte| byte.is_ascii_digit())
    };
    if !digits(day, 1..=2) || !digits(month, 1..=2) || !digits(year, 4..=4) {
        return None;
    }

    Some((day.parse().ok()?, month.parse().ok()?, year.parse().ok()?))
}

fn looks_like_display_date(text: &str) -> bool {
    display_date_parts(text).is_some()
}

fn parse_display_date(text: &str) -> Option<NaiveDate> {
    let (day, month, year) = display_date_parts(text)?;
    NaiveDate::from_ymd_opt(year, month, day)
}
