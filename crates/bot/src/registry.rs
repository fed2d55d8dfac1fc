//! Active watch jobs, grouped by chat.
//!
//! Every stored job is `Active`; a job leaves the map in the same critical
//! section that moves it to a terminal state. Probe results for jobs that are
//! no longer in the map are dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use shared::appointment_api::SlotProbe;
use shared::config::WatchSettings;
use shared::models::{ChatId, JobId, JobState, ProbeFailure, ProbeOutcome, WatchJob};
use shared::timezone::local_date_start_utc;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::notifier::{Notifier, OutboundMessage};
use crate::scheduler::{RepeatSchedule, ScheduleHandle, TickFlow, schedule_repeating};

struct JobEntry {
    job: WatchJob,
    schedule: Option<ScheduleHandle>,
}

struct RegistryInner {
    jobs: Mutex<HashMap<ChatId, Vec<JobEntry>>>,
    prober: Arc<dyn SlotProbe>,
    notifier: Arc<dyn Notifier>,
    settings: WatchSettings,
}

#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<RegistryInner>,
}

impl JobRegistry {
    pub fn new(
        prober: Arc<dyn SlotProbe>,
        notifier: Arc<dyn Notifier>,
        settings: WatchSettings,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                jobs: Mutex::new(HashMap::new()),
                prober,
                notifier,
                settings,
            }),
        }
    }

    /// Registers an active job and starts probing it. Must run inside a tokio runtime.
    pub fn create(&self, job: WatchJob) -> JobId {
        let job_id = job.id;
        let chat_id = job.chat_id;
        let query_url = job.query_url.clone();
        let before_date = job.before_date;

        let deadline_utc = local_date_start_utc(before_date, &self.inner.settings.time_zone);
        let remaining = (deadline_utc - Utc::now()).to_std().unwrap_or_default();

        info!(
            chat_id,
            job_id = %job_id,
            job_name = %job.name,
            deadline = %deadline_utc.to_rfc3339(),
            "watch job created"
        );

        self.inner
            .lock_jobs()
            .entry(chat_id)
            .or_default()
            .push(JobEntry {
                job,
                schedule: None,
            });

        let schedule = RepeatSchedule {
            first_delay: self.inner.settings.first_check_delay,
            interval: self.inner.settings.check_interval,
            deadline: Instant::now() + remaining,
        };

        let tick_inner = self.inner.clone();
        let expire_inner = self.inner.clone();
        let handle = schedule_repeating(
            schedule,
            move || {
                let inner = tick_inner.clone();
                let query_url = query_url.clone();
                Box::pin(async move {
                    if !inner.is_active(job_id) {
                        return TickFlow::Stop;
                    }
                    let outcome = inner.prober.probe(&query_url, before_date).await;
                    inner.on_probe_result(job_id, outcome).await
                })
            },
            move || Box::pin(async move { expire_inner.expire(job_id).await }),
        );

        let mut jobs = self.inner.lock_jobs();
        if let Some(entry) = jobs
            .get_mut(&chat_id)
            .and_then(|entries| entries.iter_mut().find(|entry| entry.job.id == job_id))
        {
            entry.schedule = Some(handle);
        }

        job_id
    }

    /// Names of the chat's active jobs in the order they were created.
    pub fn list(&self, chat_id: ChatId) -> Vec<String> {
        self.inner
            .lock_jobs()
            .get(&chat_id)
            .map(|entries| entries.iter().map(|entry| entry.job.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Cancels every active job of the chat and returns how many there were.
    pub fn clear_all(&self, chat_id: ChatId) -> usize {
        let Some(entries) = self.inner.lock_jobs().remove(&chat_id) else {
            return 0;
        };

        let mut cancelled = 0;
        for mut entry in entries {
            if let Some(schedule) = entry.schedule.take() {
                schedule.cancel();
            }
            if entry.job.finish(JobState::Cancelled) {
                cancelled += 1;
            }
        }

        info!(chat_id, cancelled, "watch jobs cleared");
        cancelled
    }

    pub fn has_active_jobs(&self) -> bool {
        self.inner
            .lock_jobs()
            .values()
            .any(|entries| !entries.is_empty())
    }

    pub fn active_job_count(&self) -> usize {
        self.inner.lock_jobs().values().map(Vec::len).sum()
    }

    /// Applies one probe outcome to a job. Exposed so callers can drive a job
    /// without waiting for its timer.
    pub async fn on_probe_result(&self, job_id: JobId, outcome: ProbeOutcome) -> TickFlow {
        self.inner.on_probe_result(job_id, outcome).await
    }
}

impl RegistryInner {
    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<ChatId, Vec<JobEntry>>> {
        match self.jobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn is_active(&self, job_id: JobId) -> bool {
        self.lock_jobs()
            .values()
            .flatten()
            .any(|entry| entry.job.id == job_id)
    }

    /// Removes an active job from the map and moves it to `next`.
    fn retire(&self, job_id: JobId, next: JobState) -> Option<WatchJob> {
        let mut jobs = self.lock_jobs();

        let (chat_id, index) = jobs.iter().find_map(|(chat_id, entries)| {
            entries
                .iter()
                .position(|entry| entry.job.id == job_id)
                .map(|index| (*chat_id, index))
        })?;

        let entries = jobs.get_mut(&chat_id)?;
        let mut entry = entries.remove(index);
        if entries.is_empty() {
            jobs.remove(&chat_id);
        }
        drop(jobs);

        // Dropping the handle detaches the task; the caller's tick ends it.
        entry.schedule.take();
        entry.job.finish(next).then_some(entry.job)
    }

    async fn on_probe_result(&self, job_id: JobId, outcome: ProbeOutcome) -> TickFlow {
        let message = match outcome {
            ProbeOutcome::NoMatchYet => {
                return if self.is_active(job_id) {
                    TickFlow::Continue
                } else {
                    TickFlow::Stop
                };
            }
            ProbeOutcome::Matched(slot) => {
                format!("Appointment found on {}", slot.format("%d-%m-%Y %H:%M"))
            }
            ProbeOutcome::Fatal(ProbeFailure::Unreachable) => {
                "Cannot reach IND API. Job cancelled.".to_string()
            }
            ProbeOutcome::Fatal(ProbeFailure::SchemaChanged) => {
                "IND appears to have changed their API. Job cancelled.".to_string()
            }
        };

        let Some(job) = self.retire(job_id, JobState::Completed) else {
            info!(job_id = %job_id, "probe result for a retired job discarded");
            return TickFlow::Stop;
        };

        match outcome {
            ProbeOutcome::Fatal(failure) => warn!(
                chat_id = job.chat_id,
                job_id = %job.id,
                reason = failure.reason(),
                "watch job stopped by probe failure"
            ),
            _ => info!(
                chat_id = job.chat_id,
                job_id = %job.id,
                job_name = %job.name,
                "appointment found"
            ),
        }

        self.notify(OutboundMessage::text(job.chat_id, message)).await;
        TickFlow::Stop
    }

    async fn expire(&self, job_id: JobId) {
        let Some(job) = self.retire(job_id, JobState::Expired) else {
            return;
        };

        info!(
            chat_id = job.chat_id,
            job_id = %job.id,
            job_name = %job.name,
            "watch job expired without a match"
        );

        if self.settings.notify_on_expiry {
            let text = format!("Deadline passed for {}; no appointment was found.", job.name);
            self.notify(OutboundMessage::text(job.chat_id, text)).await;
        }
    }

    async fn notify(&self, message: OutboundMessage) {
        let chat_id = message.chat_id;
        if let Err(err) = self.notifier.send(message).await {
            warn!(chat_id, error = %err, "failed to deliver job notification");
        }
    }
}
