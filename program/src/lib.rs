// Upkeep Raffle
// A periodic raffle settled with randomness from an external oracle

// Core modules
pub mod clock;
pub mod engine;
pub mod error;
pub mod event;
pub mod instruction;
pub mod ledger;
pub mod processor;
pub mod state;

// Randomness gateway and its adapters
pub mod vrf;
pub mod vrf_mock;
pub mod vrf_oracle;

// Automation
pub mod scheduler;

pub use engine::RaffleEngine;
pub use error::RaffleError;
pub use scheduler::{UpkeepOutcome, UpkeepScheduler};
