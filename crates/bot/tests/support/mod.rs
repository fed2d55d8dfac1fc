#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use appointment_bot::notifier::{Notifier, NotifyFuture, OutboundMessage};
use appointment_bot::registry::JobRegistry;
use chrono::{Days, NaiveDate, Utc};
use shared::appointment_api::{ProbeFuture, SlotProbe};
use shared::catalog::CatalogEntry;
use shared::config::WatchSettings;
use shared::models::{ChatId, JobSpec, ProbeOutcome, WatchJob};

pub const API_BASE: &str = "https://oap.ind.nl/oap/api/desks";

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<OutboundMessage>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().expect("notifier lock").clone()
    }

    pub fn texts_for(&self, chat_id: ChatId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|message| message.chat_id == chat_id)
            .map(|message| message.text)
            .collect()
    }

    /// Returns and forgets everything recorded so far.
    pub fn take(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut *self.sent.lock().expect("notifier lock"))
    }
}

impl Notifier for RecordingNotifier {
    fn send<'a>(&'a self, message: OutboundMessage) -> NotifyFuture<'a> {
        Box::pin(async move {
            self.sent.lock().expect("notifier lock").push(message);
            Ok(())
        })
    }
}

/// Takes `delay` to deliver each message.
pub struct SlowNotifier {
    delay: Duration,
    attempted: AtomicUsize,
    delivered: RecordingNotifier,
}

impl SlowNotifier {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            attempted: AtomicUsize::new(0),
            delivered: RecordingNotifier::default(),
        }
    }

    pub fn attempted(&self) -> usize {
        self.attempted.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> &RecordingNotifier {
        &self.delivered
    }
}

impl Notifier for SlowNotifier {
    fn send<'a>(&'a self, message: OutboundMessage) -> NotifyFuture<'a> {
        Box::pin(async move {
            self.attempted.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.delivered.send(message).await
        })
    }
}

/// Plays back queued outcomes, then keeps answering `NoMatchYet`.
#[derive(Default)]
pub struct ScriptedProbe {
    outcomes: Mutex<VecDeque<ProbeOutcome>>,
    calls: AtomicUsize,
    seen_urls: Mutex<Vec<String>>,
}

impl ScriptedProbe {
    pub fn with_outcomes(outcomes: Vec<ProbeOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::from(outcomes)),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_urls(&self) -> Vec<String> {
        self.seen_urls.lock().expect("probe lock").clone()
    }
}

impl SlotProbe for ScriptedProbe {
    fn probe<'a>(&'a self, query_url: &'a str, _before_date: NaiveDate) -> ProbeFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_urls
                .lock()
                .expect("probe lock")
                .push(query_url.to_string());
            self.outcomes
                .lock()
                .expect("probe lock")
                .pop_front()
                .unwrap_or(ProbeOutcome::NoMatchYet)
        })
    }
}

pub fn watch_settings(notify_on_expiry: bool) -> WatchSettings {
    WatchSettings {
        notify_on_expiry,
        ..WatchSettings::default()
    }
}

pub fn registry_with<N: Notifier + 'static>(
    probe: Arc<ScriptedProbe>,
    notifier: Arc<N>,
    settings: WatchSettings,
) -> JobRegistry {
    JobRegistry::new(probe, notifier, settings)
}

/// A date `days` after today's UTC date.
pub fn days_from_today(days: u64) -> NaiveDate {
    Utc::now()
        .date_naive()
        .checked_add_days(Days::new(days))
        .expect("date in range")
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub fn watch_job(chat_id: ChatId, location: (&str, &str), before_date: NaiveDate) -> WatchJob {
    let spec = JobSpec {
        chat_id,
        location: CatalogEntry::new(location.0, location.1),
        appointment_type: CatalogEntry::new("Biometric data", "BIO"),
        num_people: 2,
        before_date,
    };
    WatchJob::from_spec(spec, API_BASE).expect("query url should build")
}
