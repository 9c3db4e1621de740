use solana_program::clock::UnixTimestamp;
use std::{
    sync::atomic::{AtomicI64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

/// Source of the current time for round bookkeeping
pub trait TimeSource: Send + Sync {
    fn unix_timestamp(&self) -> UnixTimestamp;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn unix_timestamp(&self) -> UnixTimestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as UnixTimestamp)
            .unwrap_or_default()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: UnixTimestamp) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }

    pub fn set(&self, timestamp: UnixTimestamp) {
        self.now.store(timestamp, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn unix_timestamp(&self) -> UnixTimestamp {
        self.now.load(Ordering::SeqCst)
    }
}
