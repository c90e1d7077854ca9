/*
[INPUT]:  Named interval tasks with async handlers
[OUTPUT]: Periodic invocations with re-entrancy suppression; errors logged
[POS]:    Scheduling layer - drives maintenance, reconcile, and health
[UPDATE]: When changing missed-tick or shutdown semantics
*/

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub type TickHandler =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;

pub struct TickTask {
    pub name: &'static str,
    pub interval: Duration,
    pub run_on_start: bool,
    pub handler: TickHandler,
}

/// Runs each task on its interval. A tick that lands while the previous
/// handler is still running is dropped, never queued, so a stalled venue
/// cannot cause a burst of queued-up invocations afterwards.
pub struct TickDriver {
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl TickDriver {
    pub fn start(tasks: Vec<TickTask>, shutdown: CancellationToken) -> Self {
        let handles = tasks
            .into_iter()
            .map(|task| {
                let shutdown = shutdown.clone();
                tokio::spawn(run_task(task, shutdown))
            })
            .collect();
        Self { handles, shutdown }
    }

    /// Cancel all tasks and wait for them to exit.
    pub async fn stop(self) {
        self.shutdown.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn run_task(task: TickTask, shutdown: CancellationToken) {
    let in_flight = Arc::new(AtomicBool::new(false));
    let mut interval = tokio::time::interval(task.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // The first interval tick fires immediately.
    let mut skip_first = !task.run_on_start;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(task = task.name, "tick task stopping");
                return;
            }
            _ = interval.tick() => {
                if skip_first {
                    skip_first = false;
                    continue;
                }
                if in_flight.swap(true, Ordering::AcqRel) {
                    debug!(task = task.name, "previous run still in flight; dropping tick");
                    continue;
                }
                if let Err(err) = (task.handler)().await {
                    warn!(task = task.name, error = %err, "tick task failed");
                }
                in_flight.store(false, Ordering::Release);
            }
        }
    }
}
