use log::{debug, info, warn};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    time::{interval, MissedTickBehavior},
};

use crate::{engine::RaffleEngine, error::RaffleError, vrf::RequestId};

/// Result of one scheduler poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpkeepOutcome {
    /// The eligibility check came back false
    NotNeeded,
    /// Upkeep ran and issued this randomness request
    Performed(RequestId),
    /// The check passed but upkeep failed, retried on the next poll
    Failed(RaffleError),
}

/// Periodically checks the raffle and performs upkeep when it is due
pub struct UpkeepScheduler {
    engine: Arc<RaffleEngine>,
    period: Duration,
}

impl UpkeepScheduler {
    pub fn new(engine: Arc<RaffleEngine>, period: Duration) -> Self {
        Self { engine, period }
    }

    pub async fn poll_once(&self) -> UpkeepOutcome {
        let (upkeep_needed, perform_data) = self.engine.check_upkeep(&[]).await;
        if !upkeep_needed {
            return UpkeepOutcome::NotNeeded;
        }

        // State may have changed since the check, failure here is expected
        match self.engine.perform_upkeep(&perform_data).await {
            Ok(request_id) => UpkeepOutcome::Performed(request_id),
            Err(e) => UpkeepOutcome::Failed(e),
        }
    }

    /// Poll every period until `shutdown` turns true.
    ///
    /// Returns the number of upkeeps performed.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> usize {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut performed = 0;

        info!("Upkeep scheduler started, polling every {:?}", self.period);
        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    // Sender dropped counts as shutdown
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            match self.poll_once().await {
                UpkeepOutcome::NotNeeded => debug!("Upkeep not needed"),
                UpkeepOutcome::Performed(request_id) => {
                    performed += 1;
                    info!("Upkeep performed, randomness request {}", request_id);
                }
                UpkeepOutcome::Failed(e) => warn!("Upkeep failed, retrying next cycle: {}", e),
            }
        }

        info!("Upkeep scheduler stopped after {} upkeeps", performed);
        performed
    }
}
