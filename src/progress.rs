use crate::{config::Config, types::ProgressTick};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct ProgressAnnouncer {
    schedule: Vec<ProgressTick>,
    initial_delay: Duration,
    interval: Duration,
}

impl ProgressAnnouncer {
    pub fn new(schedule: Vec<ProgressTick>, initial_delay: Duration, interval: Duration) -> Self {
        Self {
            schedule,
            initial_delay,
            interval,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            cfg.progress.schedule.clone(),
            Duration::from_millis(cfg.progress.initial_delay_ms),
            Duration::from_millis(cfg.progress.tick_interval_ms),
        )
    }

    pub fn schedule(&self) -> &[ProgressTick] {
        &self.schedule
    }

    pub fn spawn<F>(self, mut emit: F) -> AnnouncerHandle
    where
        F: FnMut(ProgressTick) -> bool + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(self.initial_delay).await;
            for (i, tick) in self.schedule.into_iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(self.interval).await;
                }
                trace!("tick {}%", tick.percent);
                if !emit(tick) {
                    break;
                }
            }
        });
        AnnouncerHandle { task }
    }
}

#[derive(Debug)]
pub struct AnnouncerHandle {
    task: JoinHandle<()>,
}

impl AnnouncerHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for AnnouncerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
