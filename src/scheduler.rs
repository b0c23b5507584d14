//! Timer facility
//!
//! Two trigger shapes are needed: "every hour at minute M" for the price
//! refresh and "every N minutes" for uploads. Each timer is a tokio task owned
//! by a [`TimerHandle`]; cancelling twice is a no-op.

use chrono::{DateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};

/// Owner of one recurring timer task
#[derive(Debug)]
pub struct TimerHandle {
    name: String,
    task: Option<JoinHandle<()>>,
}

impl TimerHandle {
    fn new(name: &str, task: JoinHandle<()>) -> Self {
        Self {
            name: name.to_string(),
            task: Some(task),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the timer; returns false when it was already cancelled
    pub fn cancel(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Shorter waits roll over to the next hour; a slot fires at most once
const MIN_WAIT_MS: i64 = 1_000;

/// Time from `now` until the next `HH:minute:00` in `now`'s timezone
pub fn delay_until_minute<Z: TimeZone>(now: &DateTime<Z>, minute: u8) -> Duration {
    let elapsed_ms = i64::from(now.minute()) * 60_000
        + i64::from(now.second()) * 1_000
        + i64::from(now.timestamp_subsec_millis().min(999));
    let target_ms = i64::from(minute.min(59)) * 60_000;
    let mut wait_ms = target_ms - elapsed_ms;
    if wait_ms < MIN_WAIT_MS {
        wait_ms += 3_600_000;
    }
    Duration::from_millis(wait_ms as u64)
}

/// Run `task` every hour at `minute` past the hour in `tz`
pub fn schedule_hourly<F, Fut>(name: &str, minute: u8, tz: Tz, task: F) -> TimerHandle
where
    F: Fn(DateTime<Tz>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::spawn(async move {
        loop {
            let now = Utc::now().with_timezone(&tz);
            sleep(delay_until_minute(&now, minute)).await;
            task(Utc::now().with_timezone(&tz)).await;
        }
    });
    TimerHandle::new(name, handle)
}

/// Run `task` every `period`, first after one full period
pub fn schedule_interval<F, Fut>(name: &str, period: Duration, task: F) -> TimerHandle
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            task().await;
        }
    });
    TimerHandle::new(name, handle)
}
