// Raffle state machine, applied to a working copy of the bank
use log::{debug, info};
use solana_program::{clock::UnixTimestamp, pubkey::Pubkey};

use crate::{
    error::RaffleError,
    event::RaffleEvent,
    ledger::Ledger,
    state::{Raffle, RaffleConfig, RaffleState, UpkeepDiagnostics},
    vrf::{self, RandomnessGateway, RandomnessRequest, RequestId},
};

/// Everything a transaction may touch
#[derive(Clone, Debug)]
pub struct Bank {
    pub raffle: Raffle,
    pub ledger: Ledger,
}

impl Bank {
    pub fn new(raffle: Raffle) -> Self {
        Self {
            raffle,
            ledger: Ledger::new(),
        }
    }

    /// Lamports in the prize pool
    pub fn raffle_balance(&self) -> u64 {
        self.ledger.balance(&self.raffle.address)
    }
}

/// Program state handler.
pub struct Processor;

impl Processor {
    /// Process an entry into the current round.
    ///
    /// Nothing is written until the fee, state and ledger checks have passed.
    pub fn process_enter_raffle(
        bank: &mut Bank,
        events: &mut Vec<RaffleEvent>,
        player: &Pubkey,
        amount: u64,
    ) -> Result<(), RaffleError> {
        // Check entrance fee
        if amount < bank.raffle.entrance_fee {
            debug!("Entry of {} lamports below fee {}", amount, bank.raffle.entrance_fee);
            return Err(RaffleError::NotEnoughFunds);
        }

        // Entries are closed while a winner is being calculated
        if bank.raffle.raffle_state != RaffleState::Open {
            return Err(RaffleError::RaffleNotOpen);
        }

        // Move the payment into the prize pool
        let raffle_address = bank.raffle.address;
        bank.ledger.transfer(player, &raffle_address, amount)?;

        bank.raffle.players.push(*player);
        events.push(RaffleEvent::EnteredRaffle { player: *player });

        info!(
            "Player {} entered with {} lamports ({} players)",
            player,
            amount,
            bank.raffle.players.len()
        );
        Ok(())
    }

    /// Evaluate upkeep eligibility without touching state
    pub fn process_check_upkeep(bank: &Bank, now: UnixTimestamp) -> UpkeepDiagnostics {
        bank.raffle.upkeep_diagnostics(bank.raffle_balance(), now)
    }

    /// Close the round and request randomness
    pub fn process_perform_upkeep(
        bank: &mut Bank,
        events: &mut Vec<RaffleEvent>,
        config: &RaffleConfig,
        gateway: &dyn RandomnessGateway,
        now: UnixTimestamp,
    ) -> Result<RequestId, RaffleError> {
        // Re-check, upkeep may be triggered without a prior check
        let diagnostics = Self::process_check_upkeep(bank, now);
        if !diagnostics.upkeep_needed() {
            return Err(diagnostics.not_needed());
        }

        bank.raffle.raffle_state = RaffleState::Calculating;

        let request = RandomnessRequest {
            key_hash: config.key_hash,
            subscription_id: config.subscription_id,
            request_confirmations: config.request_confirmations,
            callback_gas_limit: config.callback_gas_limit,
            num_words: config.num_words,
            consumer: bank.raffle.address,
        };
        let request_id = gateway.request_random_words(&request)?;

        bank.raffle.pending_request = Some(request_id);
        events.push(RaffleEvent::RequestedRaffleWinner { request_id });

        info!(
            "Requested raffle winner, request {} for {} players and {} lamports",
            request_id, diagnostics.num_players, diagnostics.balance
        );
        Ok(request_id)
    }

    /// Settle the round with delivered randomness
    pub fn process_fulfill_random_words(
        bank: &mut Bank,
        events: &mut Vec<RaffleEvent>,
        config: &RaffleConfig,
        caller: &Pubkey,
        request_id: RequestId,
        random_words: &[u64],
        now: UnixTimestamp,
    ) -> Result<Pubkey, RaffleError> {
        // Only the configured gateway delivers randomness
        if *caller != config.gateway {
            return Err(RaffleError::OnlyGatewayCanFulfill {
                caller: *caller,
                expected: config.gateway,
            });
        }

        // The request must be the one outstanding for this round
        if bank.raffle.pending_request != Some(request_id) {
            return Err(RaffleError::UnrecognizedRequest(request_id));
        }

        let random_word = *random_words.first().ok_or(RaffleError::MissingRandomWords)?;

        // Pick the winner
        let index = vrf::winner_index(random_word, bank.raffle.players.len());
        let winner = bank.raffle.players[index];

        // Reset the round
        bank.raffle.recent_winner = Some(winner);
        bank.raffle.raffle_state = RaffleState::Open;
        bank.raffle.players.clear();
        bank.raffle.last_timestamp = now;
        bank.raffle.pending_request = None;

        // Pay out the whole pool
        let prize = bank.raffle_balance();
        let raffle_address = bank.raffle.address;
        bank.ledger
            .transfer(&raffle_address, &winner, prize)
            .map_err(|err| {
                debug!("Prize transfer failed: {}", err);
                RaffleError::TransferFailed {
                    winner,
                    lamports: prize,
                }
            })?;

        events.push(RaffleEvent::PickedWinner { winner });

        info!(
            "Picked winner {} (index {}) for request {}, paid {} lamports",
            winner, index, request_id, prize
        );
        Ok(winner)
    }
}
