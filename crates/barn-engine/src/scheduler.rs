/*!
 * Periodic driver refresh.
 *
 * Every tick fans out one refresh task per registered driver. The loop
 * never waits for those tasks, so a slow or failing upstream cannot delay
 * the next round or any other driver.
 */
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, Instrument};

use barn_core::config::DEFAULT_REFRESH_INTERVAL_SECS;
use barn_core::logging::component_span;
use barn_devices::Barn;

use crate::error::{Error, Result};

/// Drives periodic refreshes of every driver in a [`Barn`]
#[derive(Debug)]
pub struct RefreshScheduler {
    /// Drivers to refresh
    barn: Arc<Barn>,
    /// Time between rounds
    interval: Duration,
    /// Background task handle
    task: Mutex<Option<JoinHandle<()>>>,
    /// Running flag
    running: RwLock<bool>,
    /// Completed fan-outs since creation
    rounds: Arc<AtomicU64>,
}

impl RefreshScheduler {
    /// Create a scheduler; a zero interval selects the default of ten seconds
    pub fn new(barn: Arc<Barn>, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS)
        } else {
            interval
        };

        Self {
            barn,
            interval,
            task: Mutex::new(None),
            running: RwLock::new(false),
            rounds: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Time between rounds
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of rounds started so far
    pub fn rounds(&self) -> u64 {
        self.rounds.load(Ordering::SeqCst)
    }

    /// Whether the background loop is active
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Start refreshing in the background; the first round runs immediately
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.write().await;
        if *running {
            return Ok(());
        }

        let barn = Arc::clone(&self.barn);
        let rounds = Arc::clone(&self.rounds);
        let interval = self.interval;

        let task = tokio::spawn(
            async move {
                let mut ticker = time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    match barn.refresh() {
                        Ok(handles) => {
                            let round = rounds.fetch_add(1, Ordering::SeqCst) + 1;
                            debug!(round, drivers = handles.len(), "Refresh round started");
                        }
                        Err(e) => error!("Refresh round failed: {}", e),
                    }
                }
            }
            .instrument(component_span("scheduler", None)),
        );

        *self.task.lock().await = Some(task);
        *running = true;

        info!(interval = ?self.interval, "Refresh scheduler started");
        Ok(())
    }

    /// Stop the background loop. Refreshes already in flight run to completion.
    pub async fn stop(&self) -> Result<()> {
        let mut running = self.running.write().await;
        if !*running {
            return Ok(());
        }

        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
        *running = false;

        info!("Refresh scheduler stopped");
        Ok(())
    }

    /// Run one round now and wait for every driver to finish.
    ///
    /// Returns the number of drivers refreshed.
    pub async fn refresh_now(&self) -> Result<usize> {
        let handles = self.barn.refresh()?;
        let count = handles.len();
        for handle in handles {
            handle
                .await
                .map_err(|e| Error::scheduler(format!("Refresh task failed: {}", e)))?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use barn_core::types::DriverId;
    use barn_devices::{DriverInfo, ObservingConditions, RegistryEvent, SafetyMonitor};
    use tokio::time::timeout;

    fn barn_with_dummies() -> Arc<Barn> {
        let barn = Barn::new();
        barn.monitors()
            .add(SafetyMonitor::dummy(DriverInfo::new("roof", "Roof", ""), true))
            .unwrap();
        barn.weather()
            .add(ObservingConditions::dummy(DriverInfo::new("sim", "Sim", "")))
            .unwrap();
        Arc::new(barn)
    }

    #[test]
    fn test_zero_interval_uses_default() {
        let scheduler = RefreshScheduler::new(Arc::new(Barn::new()), Duration::ZERO);
        assert_eq!(scheduler.interval(), Duration::from_secs(10));
    }

    #[test_log::test(tokio::test)]
    async fn test_scheduler_refreshes_every_driver_repeatedly() {
        let barn = barn_with_dummies();
        let mut events = barn.subscribe();
        let scheduler = RefreshScheduler::new(barn, Duration::from_millis(20));

        scheduler.start().await.unwrap();
        assert!(scheduler.is_running().await);

        let mut refreshed = Vec::new();
        timeout(Duration::from_secs(5), async {
            while refreshed.len() < 4 {
                if let Ok(RegistryEvent::DriverRefreshed { id, error, .. }) = events.recv().await {
                    assert!(error.is_none());
                    refreshed.push(id);
                }
            }
        })
        .await
        .unwrap();

        let distinct: HashSet<_> = refreshed.iter().cloned().collect();
        assert!(distinct.contains(&DriverId::from("roof")));
        assert!(distinct.contains(&DriverId::from("sim")));
        assert!(scheduler.rounds() >= 2);

        scheduler.stop().await.unwrap();
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let scheduler = RefreshScheduler::new(barn_with_dummies(), Duration::from_secs(60));
        tokio_test::assert_ok!(scheduler.start().await);
        tokio_test::assert_ok!(scheduler.start().await);
        tokio_test::assert_ok!(scheduler.stop().await);
        tokio_test::assert_ok!(scheduler.stop().await);
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test]
    async fn test_failing_driver_does_not_block_others() {
        let closed = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let barn = barn_with_dummies();
        let broken = ObservingConditions::http(
            DriverInfo::new("broken", "Broken", ""),
            format!("http://{}/weather", closed),
        )
        .await
        .unwrap();
        barn.weather().add(broken).unwrap();

        let mut events = barn.subscribe();
        let scheduler = RefreshScheduler::new(Arc::clone(&barn), Duration::from_secs(60));
        assert_eq!(scheduler.refresh_now().await.unwrap(), 3);

        let mut outcomes = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let RegistryEvent::DriverRefreshed { id, error, .. } = event {
                outcomes.push((id.to_string(), error.is_some()));
            }
        }
        outcomes.sort();
        assert_eq!(
            outcomes,
            vec![
                ("broken".to_string(), true),
                ("roof".to_string(), false),
                ("sim".to_string(), false),
            ]
        );
    }
}
