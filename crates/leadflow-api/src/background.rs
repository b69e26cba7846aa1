//! Background scheduler loop.
//!
//! Calls [`Scheduler::tick`](leadflow_core::workflow::scheduler::Scheduler::tick)
//! on a fixed interval so wait steps resume and failed steps are retried
//! without an external cron. Stops between ticks when the token is cancelled.

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

pub fn spawn_scheduler(state: AppState, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            match state.scheduler.tick(Utc::now()).await {
                Ok(summary) if summary.processed > 0 => {
                    tracing::info!(
                        processed = summary.processed,
                        advanced = summary.advanced,
                        completed = summary.completed,
                        failed = summary.failed,
                        "scheduler tick"
                    );
                }
                Ok(_) => tracing::trace!("scheduler tick: nothing due"),
                Err(e) => tracing::error!(error = %e, "scheduler tick failed"),
            }
        }

        tracing::debug!("scheduler loop stopped");
    })
}
