use arrayref::{array_mut_ref, array_ref, array_refs, mut_array_refs};
use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    clock::UnixTimestamp,
    native_token::LAMPORTS_PER_SOL,
    program_error::ProgramError,
    program_pack::{Pack, Sealed},
    pubkey::Pubkey,
};
use std::fmt;

use crate::{error::RaffleError, vrf::RequestId};

/// Status of the current round
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RaffleState {
    /// Accepting entries, eligible for upkeep evaluation
    Open,
    /// A randomness request is outstanding, entries are rejected
    Calculating,
}

impl TryFrom<u8> for RaffleState {
    type Error = &'static str;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        match val {
            0 => Ok(RaffleState::Open),
            1 => Ok(RaffleState::Calculating),
            _ => Err("Invalid raffle state"),
        }
    }
}

impl From<RaffleState> for u8 {
    fn from(state: RaffleState) -> Self {
        match state {
            RaffleState::Open => 0,
            RaffleState::Calculating => 1,
        }
    }
}

impl fmt::Display for RaffleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaffleState::Open => write!(f, "OPEN"),
            RaffleState::Calculating => write!(f, "CALCULATING"),
        }
    }
}

/// Construction parameters, immutable for the lifetime of an engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RaffleConfig {
    /// Minimum payment to enter, in lamports
    pub entrance_fee: u64,
    /// Minimum seconds between rounds
    pub interval: u64,
    /// The only identity allowed to deliver randomness
    pub gateway: Pubkey,
    /// Gas lane of the randomness request
    pub key_hash: [u8; 32],
    /// Subscription the randomness requests are billed to
    pub subscription_id: u64,
    pub callback_gas_limit: u32,
    pub request_confirmations: u16,
    /// Random words requested per round
    pub num_words: u32,
}

impl Default for RaffleConfig {
    fn default() -> Self {
        Self {
            entrance_fee: LAMPORTS_PER_SOL / 100, // 0.01 SOL
            interval: 30,
            gateway: Pubkey::default(),
            key_hash: [0u8; 32],
            subscription_id: 0,
            callback_gas_limit: 500_000,
            request_confirmations: 3,
            num_words: 1,
        }
    }
}

impl RaffleConfig {
    pub fn validate(&self) -> Result<(), RaffleError> {
        if self.num_words == 0 {
            return Err(RaffleError::InvalidConfig("num_words must be at least 1"));
        }
        Ok(())
    }
}

/// Raffle round state
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct Raffle {
    /// Ledger account holding the prize pool
    pub address: Pubkey,
    /// Entrance fee in lamports
    pub entrance_fee: u64,
    /// Minimum round length in seconds
    pub interval: u64,
    /// Start of the current round
    pub last_timestamp: UnixTimestamp,
    /// Entrants of the current round, in entry order
    pub players: Vec<Pubkey>,
    pub raffle_state: RaffleState,
    /// Winner of the last settled round
    pub recent_winner: Option<Pubkey>,
    /// Randomness request outstanding while calculating
    pub pending_request: Option<RequestId>,
}

impl Raffle {
    pub fn new(address: Pubkey, config: &RaffleConfig, now: UnixTimestamp) -> Self {
        Self {
            address,
            entrance_fee: config.entrance_fee,
            interval: config.interval,
            last_timestamp: now,
            players: Vec::new(),
            raffle_state: RaffleState::Open,
            recent_winner: None,
            pending_request: None,
        }
    }

    /// Evaluate every upkeep condition against `balance` at `now`
    pub fn upkeep_diagnostics(&self, balance: u64, now: UnixTimestamp) -> UpkeepDiagnostics {
        let elapsed = now.saturating_sub(self.last_timestamp).max(0) as u64;

        UpkeepDiagnostics {
            time_passed: elapsed >= self.interval,
            is_open: self.raffle_state == RaffleState::Open,
            has_balance: balance > 0,
            has_players: !self.players.is_empty(),
            balance,
            num_players: self.players.len() as u64,
            raffle_state: self.raffle_state,
        }
    }
}

/// Snapshot returned as the payload of an upkeep check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpkeepDiagnostics {
    pub time_passed: bool,
    pub is_open: bool,
    pub has_balance: bool,
    pub has_players: bool,
    pub balance: u64,
    pub num_players: u64,
    pub raffle_state: RaffleState,
}

impl UpkeepDiagnostics {
    pub fn upkeep_needed(&self) -> bool {
        self.time_passed && self.is_open && self.has_balance && self.has_players
    }

    /// Error reported when upkeep is forced while not needed
    pub fn not_needed(&self) -> RaffleError {
        RaffleError::UpkeepNotNeeded {
            balance: self.balance,
            num_players: self.num_players,
            raffle_state: self.raffle_state,
        }
    }
}

impl Sealed for UpkeepDiagnostics {}

impl Pack for UpkeepDiagnostics {
    const LEN: usize = 1 + 1 + 1 + 1 + 8 + 8 + 1;

    fn unpack_from_slice(src: &[u8]) -> Result<Self, ProgramError> {
        let src = array_ref![src, 0, UpkeepDiagnostics::LEN];
        let (time_passed, is_open, has_balance, has_players, balance, num_players, raffle_state) =
            array_refs![src, 1, 1, 1, 1, 8, 8, 1];

        let raffle_state = match RaffleState::try_from(raffle_state[0]) {
            Ok(state) => state,
            Err(_) => return Err(ProgramError::InvalidAccountData),
        };

        Ok(UpkeepDiagnostics {
            time_passed: time_passed[0] != 0,
            is_open: is_open[0] != 0,
            has_balance: has_balance[0] != 0,
            has_players: has_players[0] != 0,
            balance: u64::from_le_bytes(*balance),
            num_players: u64::from_le_bytes(*num_players),
            raffle_state,
        })
    }

    fn pack_into_slice(&self, dst: &mut [u8]) {
        let dst = array_mut_ref![dst, 0, UpkeepDiagnostics::LEN];
        let (
            time_passed_dst,
            is_open_dst,
            has_balance_dst,
            has_players_dst,
            balance_dst,
            num_players_dst,
            raffle_state_dst,
        ) = mut_array_refs![dst, 1, 1, 1, 1, 8, 8, 1];

        time_passed_dst[0] = self.time_passed as u8;
        is_open_dst[0] = self.is_open as u8;
        has_balance_dst[0] = self.has_balance as u8;
        has_players_dst[0] = self.has_players as u8;
        *balance_dst = self.balance.to_le_bytes();
        *num_players_dst = self.num_players.to_le_bytes();
        raffle_state_dst[0] = self.raffle_state.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_raffle_with_players(count: usize) -> Raffle {
        let config = RaffleConfig::default();
        let mut raffle = Raffle::new(Pubkey::new_unique(), &config, 1_000);
        for _ in 0..count {
            raffle.players.push(Pubkey::new_unique());
        }
        raffle
    }

    #[test]
    fn test_upkeep_needs_every_condition() {
        let raffle = open_raffle_with_players(1);
        assert!(raffle.upkeep_diagnostics(10, 1_030).upkeep_needed());

        // Interval not elapsed
        assert!(!raffle.upkeep_diagnostics(10, 1_029).upkeep_needed());
        // Empty pool
        assert!(!raffle.upkeep_diagnostics(0, 1_030).upkeep_needed());
        // No players
        let empty = open_raffle_with_players(0);
        assert!(!empty.upkeep_diagnostics(10, 1_030).upkeep_needed());
        // Calculating
        let mut calculating = open_raffle_with_players(1);
        calculating.raffle_state = RaffleState::Calculating;
        assert!(!calculating.upkeep_diagnostics(10, 1_030).upkeep_needed());
    }

    #[test]
    fn test_clock_going_backwards_counts_as_no_time() {
        let raffle = open_raffle_with_players(1);
        let diagnostics = raffle.upkeep_diagnostics(10, 900);
        assert!(!diagnostics.time_passed);
    }

    #[test]
    fn test_diagnostics_pack_layout() {
        let diagnostics = open_raffle_with_players(3).upkeep_diagnostics(42, 1_000);
        let mut packed = vec![0u8; UpkeepDiagnostics::LEN];
        diagnostics.pack_into_slice(&mut packed);

        assert_eq!(packed[0], 0);
        assert_eq!(packed[1], 1);
        assert_eq!(&packed[4..12], &42u64.to_le_bytes());
        assert_eq!(&packed[12..20], &3u64.to_le_bytes());
        assert_eq!(UpkeepDiagnostics::unpack_unchecked(&packed).unwrap(), diagnostics);
    }

    #[test]
    fn test_invalid_state_byte_rejected() {
        let mut packed = vec![0u8; UpkeepDiagnostics::LEN];
        packed[UpkeepDiagnostics::LEN - 1] = 7;
        assert_eq!(
            UpkeepDiagnostics::unpack_unchecked(&packed),
            Err(ProgramError::InvalidAccountData)
        );
    }

    #[test]
    fn test_zero_words_rejected() {
        let config = RaffleConfig {
            num_words: 0,
            ..RaffleConfig::default()
        };
        assert!(matches!(config.validate(), Err(RaffleError::InvalidConfig(_))));
    }
}
