use solana_program::pubkey::Pubkey;
use thiserror::Error;

use crate::{ledger::LedgerError, state::RaffleState, vrf::{GatewayError, RequestId}};

/// Errors that may be returned by the raffle engine
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RaffleError {
    /// Entry paid less than the entrance fee
    #[error("Not enough funds sent to enter the raffle")]
    NotEnoughFunds,

    /// Entry attempted while a winner is being calculated
    #[error("Raffle is not open")]
    RaffleNotOpen,

    /// Upkeep was triggered while the eligibility predicate was false
    #[error("Upkeep not needed (balance: {balance}, players: {num_players}, state: {raffle_state})")]
    UpkeepNotNeeded {
        balance: u64,
        num_players: u64,
        raffle_state: RaffleState,
    },

    /// Fulfilment for a request that is not outstanding
    #[error("Nonexistent request {0}")]
    UnrecognizedRequest(RequestId),

    /// Paying the prize pool to the winner failed
    #[error("Transfer of {lamports} lamports to winner {winner} failed")]
    TransferFailed { winner: Pubkey, lamports: u64 },

    /// Fulfilment did not come from the configured gateway
    #[error("Only gateway {expected} can fulfill, got {caller}")]
    OnlyGatewayCanFulfill { caller: Pubkey, expected: Pubkey },

    /// Fulfilment carried no random words
    #[error("No random words delivered")]
    MissingRandomWords,

    /// Invalid instruction data passed
    #[error("Invalid instruction data")]
    InvalidInstructionData,

    /// Construction parameters rejected
    #[error("Invalid raffle configuration: {0}")]
    InvalidConfig(&'static str),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}
