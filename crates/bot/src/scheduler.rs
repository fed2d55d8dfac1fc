//! Repeating timers for watch jobs.
//!
//! Each schedule owns one tokio task. The next sleep only starts after the
//! previous tick has returned, so a slow tick pushes later ticks back instead
//! of overlapping them. The deadline is only checked between ticks; a tick
//! that is running when it passes finishes first.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};

pub type TickFuture = Pin<Box<dyn Future<Output = TickFlow> + Send>>;
pub type ExpireFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy)]
pub struct RepeatSchedule {
    pub first_delay: Duration,
    pub interval: Duration,
    pub deadline: Instant,
}

#[derive(Debug)]
pub struct ScheduleHandle {
    task: JoinHandle<()>,
}

impl ScheduleHandle {
    /// Stops the schedule. A tick that is mid-flight is dropped at its next await.
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Runs `tick` after `first_delay`, then again `interval` after each tick
/// returns, until a tick says [`TickFlow::Stop`] or `deadline` passes while
/// waiting for the next tick. Only the deadline path calls `on_expired`.
pub fn schedule_repeating<T, E>(schedule: RepeatSchedule, mut tick: T, on_expired: E) -> ScheduleHandle
where
    T: FnMut() -> TickFuture + Send + 'static,
    E: FnOnce() -> ExpireFuture + Send + 'static,
{
    let task = tokio::spawn(async move {
        let deadline = sleep_until(schedule.deadline);
        tokio::pin!(deadline);

        let mut on_expired = Some(on_expired);
        let mut wait = schedule.first_delay;
        loop {
            tokio::select! {
                biased;
                _ = &mut deadline => {
                    if let Some(on_expired) = on_expired.take() {
                        on_expired().await;
                    }
                    return;
                }
                _ = sleep(wait) => {}
            }

            if tick().await == TickFlow::Stop {
                return;
            }
            wait = schedule.interval;
        }
    });

    ScheduleHandle { task }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::time::{Instant, advance, sleep};

    use super::{RepeatSchedule, TickFlow, schedule_repeating};

    fn counting_schedule(
        deadline_in: Duration,
        tick_cost: Duration,
        stop_after: usize,
    ) -> (super::ScheduleHandle, Arc<AtomicUsize>, Arc<AtomicBool>) {
        let ticks = Arc::new(AtomicUsize::new(0));
        let expired = Arc::new(AtomicBool::new(false));
        let tick_counter = ticks.clone();
        let expired_flag = expired.clone();

        let handle = schedule_repeating(
            RepeatSchedule {
                first_delay: Duration::from_millis(200),
                interval: Duration::from_secs(10),
                deadline: Instant::now() + deadline_in,
            },
            move || {
                let tick_counter = tick_counter.clone();
                Box::pin(async move {
                    sleep(tick_cost).await;
                    let seen = tick_counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if seen >= stop_after {
                        TickFlow::Stop
                    } else {
                        TickFlow::Continue
                    }
                })
            },
            move || {
                Box::pin(async move {
                    expired_flag.store(true, Ordering::SeqCst);
                })
            },
        );

        (handle, ticks, expired)
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_wait_for_the_previous_tick_to_finish() {
        let (_handle, ticks, expired) =
            counting_schedule(Duration::from_secs(3600), Duration::from_secs(5), usize::MAX);

        // 0.2s first delay, then 5s of work per tick followed by a 10s pause.
        sleep(Duration::from_millis(5_300)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        sleep(Duration::from_secs(15)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        assert!(!expired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_the_schedule_without_expiry() {
        let (handle, ticks, expired) =
            counting_schedule(Duration::from_secs(3600), Duration::ZERO, 2);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        assert!(handle.is_finished());
        assert!(!expired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_before_first_tick_expires_without_ticking() {
        let (handle, ticks, expired) =
            counting_schedule(Duration::ZERO, Duration::ZERO, usize::MAX);

        sleep(Duration::from_secs(1)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        assert!(expired.load(Ordering::SeqCst));
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_lets_a_running_tick_finish() {
        let (handle, ticks, expired) =
            counting_schedule(Duration::from_secs(3), Duration::from_secs(5), usize::MAX);

        sleep(Duration::from_secs(4)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        assert!(!expired.load(Ordering::SeqCst));

        sleep(Duration::from_secs(2)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert!(expired.load(Ordering::SeqCst));
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_further_ticks_and_expiry() {
        let (handle, ticks, expired) =
            counting_schedule(Duration::from_secs(30), Duration::ZERO, usize::MAX);

        sleep(Duration::from_millis(300)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        handle.cancel();
        advance(Duration::from_secs(60)).await;
        sleep(Duration::from_millis(1)).await;

        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert!(!expired.load(Ordering::SeqCst));
    }
}
