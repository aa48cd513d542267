//! In-process schedule for the crowdfunding finalizer.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use super::finalizer::CrowdfundingFinalizer;

#[derive(Debug, Clone)]
pub struct FinalizerSchedule {
    pub interval: Duration,
}

impl Default for FinalizerSchedule {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Handle for the running schedule.
#[derive(Debug)]
pub struct FinalizerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl FinalizerHandle {
    /// Stop the schedule. A pass in progress finishes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            error!(error = %e, "finalizer task panicked");
        }
    }
}

impl FinalizerSchedule {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Run the finalizer once now, then every `interval`.
    ///
    /// Passes never overlap: a slow pass delays the next tick instead of queueing
    /// a burst. A failed pass is logged and the next tick tries again.
    pub fn spawn(&self, finalizer: Arc<CrowdfundingFinalizer>) -> FinalizerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(schedule_loop(self.interval, finalizer, shutdown_rx));
        FinalizerHandle {
            shutdown: shutdown_tx,
            join,
        }
    }
}

async fn schedule_loop(interval: Duration, finalizer: Arc<CrowdfundingFinalizer>, mut shutdown_rx: watch::Receiver<bool>) {
    info!(interval_secs = interval.as_secs(), "crowdfunding finalizer schedule started");

    // tokio panics on a zero period.
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown_rx.changed() => break,
        }
        if *shutdown_rx.borrow() {
            break;
        }

        if let Err(e) = finalizer.run(Utc::now()).await {
            error!(error = %e, "crowdfunding finalizer pass failed");
        }
    }

    info!("crowdfunding finalizer schedule stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;

    use backoffice_catalog::CrowdfundingStatus;

    use crate::jobs::InMemoryJobStore;
    use crate::repository::{CrowdfundingRepository, InMemoryStore, ProductRepository};
    use crate::testing;

    #[tokio::test]
    async fn runs_at_startup_and_stops_on_shutdown() {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        let product = testing::crowdfunding_product(dec!(100), dec!(150), now - ChronoDuration::hours(1), now);
        store.save(&testing::changes(&product)).await.unwrap();
        let finalizer = Arc::new(CrowdfundingFinalizer::new(store.clone(), InMemoryJobStore::arc()));

        let handle = FinalizerSchedule::new(Duration::from_secs(3600)).spawn(finalizer);

        let mut status = CrowdfundingStatus::Funding;
        for _ in 0..100 {
            status = CrowdfundingRepository::get(&*store, product.id).await.unwrap().unwrap().status;
            if status != CrowdfundingStatus::Funding {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, CrowdfundingStatus::Success);

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("schedule did not stop");
    }

    #[tokio::test]
    async fn zero_interval_does_not_panic_the_schedule() {
        let finalizer = Arc::new(CrowdfundingFinalizer::new(
            Arc::new(InMemoryStore::new()),
            InMemoryJobStore::arc(),
        ));

        let handle = FinalizerSchedule::new(Duration::ZERO).spawn(finalizer);
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("schedule did not stop");
    }
}
