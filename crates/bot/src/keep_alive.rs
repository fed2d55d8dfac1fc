//! Self-ping that keeps a hosted webhook process from being put to sleep while
//! any watch job is still running.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::StatusCode;
use shared::config::KeepAliveSettings;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::registry::JobRegistry;

const PING_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Error)]
#[error("failed to build keep-alive http client: {0}")]
pub struct KeepAliveBuildError(String);

struct KeepAliveInner {
    client: reqwest::Client,
    ping_url: String,
    interval: Duration,
    registry: JobRegistry,
    armed: AtomicBool,
}

#[derive(Clone)]
pub struct KeepAlive {
    inner: Arc<KeepAliveInner>,
}

impl KeepAlive {
    /// Returns `None` unless the settings ask for self-pinging.
    pub fn from_settings(
        settings: &KeepAliveSettings,
        registry: JobRegistry,
    ) -> Result<Option<Self>, KeepAliveBuildError> {
        if !settings.is_enabled() {
            return Ok(None);
        }
        let Some(public_base_url) = settings.public_base_url.as_deref() else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PING_TIMEOUT_SECONDS))
            .build()
            .map_err(|err| KeepAliveBuildError(err.to_string()))?;

        Ok(Some(Self {
            inner: Arc::new(KeepAliveInner {
                client,
                ping_url: format!("{}/", public_base_url.trim_end_matches('/')),
                interval: settings.interval,
                registry,
                armed: AtomicBool::new(false),
            }),
        }))
    }

    pub fn is_armed(&self) -> bool {
        self.inner.armed.load(Ordering::SeqCst)
    }

    /// Starts the ping loop unless one is already pending.
    pub fn ensure_armed(&self) {
        if self
            .inner
            .armed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        debug!(interval_seconds = self.inner.interval.as_secs(), "keep-alive armed");
        tokio::spawn(self.inner.clone().run());
    }
}

impl KeepAliveInner {
    async fn run(self: Arc<Self>) {
        loop {
            sleep(self.interval).await;

            if !self.registry.has_active_jobs() {
                self.armed.store(false, Ordering::SeqCst);
                // A job created between the check and the store saw `armed`
                // still set and relied on this loop; take it back over.
                if !self.registry.has_active_jobs()
                    || self
                        .armed
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_err()
                {
                    info!("keep-alive stopped, no active jobs");
                    return;
                }
            }

            let pinger = self.clone();
            tokio::spawn(async move { pinger.ping().await });
        }
    }

    async fn ping(&self) {
        match self.client.get(&self.ping_url).send().await {
            Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                debug!(ping_url = %self.ping_url, "keep-alive ping answered with expected 404");
            }
            Ok(response) => {
                debug!(
                    ping_url = %self.ping_url,
                    status = response.status().as_u16(),
                    "keep-alive ping answered"
                );
            }
            Err(err) => {
                debug!(ping_url = %self.ping_url, error = %err, "keep-alive ping failed");
            }
        }
    }
}
