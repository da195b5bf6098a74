use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{MonitorContext, monitor_loop};
use crate::registry::{RegistryError, Target};

/// Owns one monitor task per host.
pub struct Supervisor {
    ctx: Arc<MonitorContext>,
    // A map from host to its running monitor task.
    running_tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Supervisor {
    pub fn new(ctx: Arc<MonitorContext>) -> Self {
        Self {
            ctx,
            running_tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &Arc<MonitorContext> {
        &self.ctx
    }

    /// Starts monitoring `host` unless a live task already does. Returns
    /// whether a new task was spawned.
    pub async fn start(&self, host: &str) -> bool {
        let mut tasks = self.running_tasks.lock().await;
        if tasks.get(host).is_some_and(|handle| !handle.is_finished()) {
            debug!(host = %host, "Monitor task already running.");
            return false;
        }
        let handle = tokio::spawn(monitor_loop(self.ctx.clone(), host.to_string()));
        tasks.insert(host.to_string(), handle);
        true
    }

    /// Cancels the task for `host` and waits until it is gone.
    pub async fn stop(&self, host: &str) -> bool {
        let handle = self.running_tasks.lock().await.remove(host);
        match handle {
            Some(handle) => {
                info!(host = %host, "Stopping monitor task.");
                handle.abort();
                // A cancelled task reports a JoinError; that is the expected end.
                let _ = handle.await;
                true
            }
            None => false,
        }
    }

    /// Unregisters the target named `name` and cancels its task. The task map
    /// stays locked across both steps, so a concurrent `start` for the same
    /// host only sees the map once the old task is out of it.
    pub async fn remove(&self, name: &str) -> Result<Target, RegistryError> {
        let (removed, handle) = {
            let mut tasks = self.running_tasks.lock().await;
            let removed = self.ctx.registry.remove(name).await?;
            let handle = tasks.remove(&removed.host);
            (removed, handle)
        };
        if let Some(handle) = handle {
            info!(host = %removed.host, "Stopping monitor task.");
            handle.abort();
            let _ = handle.await;
        }
        Ok(removed)
    }

    /// Starts a task for every registered target. Returns how many were spawned.
    pub async fn start_all(&self) -> usize {
        let mut started = 0;
        for target in self.ctx.registry.list().await {
            if self.start(&target.host).await {
                started += 1;
            }
        }
        info!(started, "Started monitor tasks for registered servers.");
        started
    }

    pub async fn is_running(&self, host: &str) -> bool {
        self.running_tasks
            .lock()
            .await
            .get(host)
            .is_some_and(|handle| !handle.is_finished())
    }

    pub async fn shutdown(&self) {
        let handles: Vec<(String, JoinHandle<()>)> =
            self.running_tasks.lock().await.drain().collect();
        for (host, handle) in handles {
            debug!(host = %host, "Aborting monitor task.");
            handle.abort();
            let _ = handle.await;
        }
        info!("All monitor tasks stopped.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::tests::{harness, healthy_host};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_and_starts_immediately() {
        let h = harness(healthy_host());
        h.ctx.registry.register("10.0.0.5", "gpu1").await.unwrap();
        let supervisor = Supervisor::new(h.ctx.clone());

        assert!(supervisor.start("10.0.0.5").await);
        assert!(!supervisor.start("10.0.0.5").await);

        // First cycle runs without waiting for an interval.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.sender.sent().len(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.sender.sent().len(), 2);

        supervisor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_the_cycle() {
        let h = harness(healthy_host());
        h.ctx.registry.register("10.0.0.5", "gpu1").await.unwrap();
        let supervisor = Supervisor::new(h.ctx.clone());
        supervisor.start("10.0.0.5").await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(supervisor.stop("10.0.0.5").await);
        assert!(!supervisor.is_running("10.0.0.5").await);
        assert!(!supervisor.stop("10.0.0.5").await);

        let delivered = h.sender.sent().len();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(h.sender.sent().len(), delivered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_all_and_task_ends_after_removal() {
        let h = harness(healthy_host());
        h.ctx.registry.register("10.0.0.5", "gpu1").await.unwrap();
        h.ctx.registry.register("10.0.0.6", "gpu2").await.unwrap();
        let supervisor = Supervisor::new(h.ctx.clone());

        assert_eq!(supervisor.start_all().await, 2);
        assert_eq!(supervisor.start_all().await, 0);

        h.ctx.registry.remove("gpu2").await.unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(supervisor.is_running("10.0.0.5").await);
        assert!(!supervisor.is_running("10.0.0.6").await);

        // A finished task is replaced on the next start.
        h.ctx.registry.register("10.0.0.6", "gpu2").await.unwrap();
        assert!(supervisor.start("10.0.0.6").await);

        supervisor.shutdown().await;
        assert!(!supervisor.is_running("10.0.0.5").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_readding_during_removal_keeps_the_host_monitored() {
        let h = harness(healthy_host());
        h.ctx.registry.register("10.0.0.5", "gpu1").await.unwrap();
        let supervisor = Supervisor::new(h.ctx.clone());
        supervisor.start("10.0.0.5").await;

        let readd = async {
            h.ctx.registry.register("10.0.0.5", "gpu1").await.unwrap();
            supervisor.start("10.0.0.5").await
        };
        let (removed, started) = tokio::join!(supervisor.remove("gpu1"), readd);

        assert_eq!(removed.unwrap().host, "10.0.0.5");
        assert!(started);
        assert!(supervisor.is_running("10.0.0.5").await);
        assert_eq!(h.ctx.registry.list().await.len(), 1);

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_remove_unknown_name_leaves_tasks_alone() {
        let h = harness(healthy_host());
        h.ctx.registry.register("10.0.0.5", "gpu1").await.unwrap();
        let supervisor = Supervisor::new(h.ctx.clone());
        supervisor.start("10.0.0.5").await;

        assert!(matches!(
            supervisor.remove("gpu9").await,
            Err(RegistryError::NotFound(_))
        ));
        assert!(supervisor.is_running("10.0.0.5").await);

        supervisor.shutdown().await;
    }
}
