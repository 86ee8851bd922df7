//! Periodic task scheduler with graceful shutdown. Built once at startup and
//! handed to the wiring code; every task loop subscribes to one broadcast
//! shutdown channel and is joined with a bounded grace period.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::error::Result;

pub struct Scheduler {
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<(String, JoinHandle<()>)>,
    grace: Duration,
}

impl Scheduler {
    pub fn new(grace: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            handles: Vec::new(),
            grace,
        }
    }

    /// Run `task` every `every`, starting immediately. A run that overlaps its
    /// next tick delays it rather than running twice; a failed run is logged
    /// and the schedule continues.
    pub fn spawn_periodic<F, Fut>(&mut self, name: &str, every: Duration, task: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let task_name = name.to_string();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("{} stopping", task_name);
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = task().await {
                            error!("{} run failed: {}", task_name, e);
                        }
                    }
                }
            }
        });
        self.handles.push((name.to_string(), handle));
        info!("Scheduled {} every {:?}", name, every);
    }

    /// Stop all tasks. In-flight runs get the grace period to finish their
    /// current unit of work before being aborted.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        for (name, mut handle) in self.handles {
            if tokio::time::timeout(self.grace, &mut handle).await.is_err() {
                warn!("{} did not stop within {:?}, aborting", name, self.grace);
                handle.abort();
            }
        }
    }
}
