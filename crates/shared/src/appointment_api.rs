//! One-shot queries against the appointment API.
//!
//! The API prefixes every JSON body with a short anti-hijacking guard that has
//! to be cut off before parsing. Slots are listed earliest first, so only the
//! first entry matters.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{ProbeFailure, ProbeOutcome};

/// Number of leading bytes to drop before the JSON document starts.
pub const RESPONSE_PREFIX_LEN: usize = 6;

const SLOT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = ProbeOutcome> + Send + 'a>>;

pub trait SlotProbe: Send + Sync {
    fn probe<'a>(&'a self, query_url: &'a str, before_date: NaiveDate) -> ProbeFuture<'a>;
}

#[derive(Debug, Error)]
#[error("failed to build appointment api http client: {0}")]
pub struct ProberBuildError(String);

#[derive(Clone)]
pub struct AppointmentProber {
    client: reqwest::Client,
}

impl AppointmentProber {
    pub fn new(timeout: Duration) -> Result<Self, ProberBuildError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProberBuildError(err.to_string()))?;

        Ok(Self { client })
    }

    async fn probe_once(&self, query_url: &str, before_date: NaiveDate) -> ProbeOutcome {
        let response = match self.client.get(query_url).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(query_url, error = %err, "appointment api request failed");
                return ProbeOutcome::Fatal(ProbeFailure::Unreachable);
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(
                query_url,
                status = status.as_u16(),
                "appointment api responded with an error status"
            );
            return ProbeOutcome::Fatal(ProbeFailure::Unreachable);
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => {
                warn!(query_url, error = %err, "appointment api body could not be read");
                return ProbeOutcome::Fatal(ProbeFailure::Unreachable);
            }
        };

        let outcome = classify_response(&body, before_date);
        debug!(query_url, ?outcome, "appointment api probed");
        outcome
    }
}

impl SlotProbe for AppointmentProber {
    fn probe<'a>(&'a self, query_url: &'a str, before_date: NaiveDate) -> ProbeFuture<'a> {
        Box::pin(self.probe_once(query_url, before_date))
    }
}

#[derive(Debug, Error)]
enum SchemaError {
    #[error("response is shorter than the fixed prefix")]
    TruncatedPrefix,
    #[error("response is not valid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("response has no `data` field")]
    MissingData,
    #[error("`data` is not a list of slots")]
    DataNotAList,
    #[error("slot timestamp '{0}' is not YYYY-MM-DD HH:MM")]
    InvalidTimestamp(String),
}

#[derive(Debug, Deserialize)]
struct SlotDescriptor {
    date: String,
    #[serde(rename = "startTime")]
    start_time: String,
}

/// Decides what a raw API body means for a watch that ends at `before_date`.
pub fn classify_response(body: &[u8], before_date: NaiveDate) -> ProbeOutcome {
    let deadline = before_date.and_time(NaiveTime::MIN);

    match earliest_slot(body) {
        Ok(None) => ProbeOutcome::NoMatchYet,
        Ok(Some(slot)) if slot < deadline => ProbeOutcome::Matched(slot),
        Ok(Some(_)) => ProbeOutcome::NoMatchYet,
        Err(err) => {
            warn!(error = %err, "appointment api response has an unexpected shape");
            ProbeOutcome::Fatal(ProbeFailure::SchemaChanged)
        }
    }
}

fn earliest_slot(body: &[u8]) -> Result<Option<NaiveDateTime>, SchemaError> {
    let json = body
        .get(RESPONSE_PREFIX_LEN..)
        .ok_or(SchemaError::TruncatedPrefix)?;
    let document: Value = serde_json::from_slice(json)?;

    let data = document.get("data").ok_or(SchemaError::MissingData)?;
    if data.is_null() {
        return Ok(None);
    }

    let slots = data.as_array().ok_or(SchemaError::DataNotAList)?;
    let Some(first) = slots.first() else {
        return Ok(None);
    };

    let slot: SlotDescriptor = serde_json::from_value(first.clone())?;
    let raw = format!("{} {}", slot.date, slot.start_time);
    NaiveDateTime::parse_from_str(&raw, SLOT_TIMESTAMP_FORMAT)
        .map(Some)
        .map_err(|_| SchemaError::InvalidTimestamp(raw))
}
