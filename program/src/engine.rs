use async_trait::async_trait;
use log::{debug, info, warn};
use solana_program::{clock::UnixTimestamp, program_pack::Pack, pubkey::Pubkey};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::{
    clock::TimeSource,
    error::RaffleError,
    event::RaffleEvent,
    instruction::RaffleInstruction,
    processor::{Bank, Processor},
    state::{Raffle, RaffleConfig, RaffleState, UpkeepDiagnostics},
    vrf::{RandomnessConsumer, RandomnessGateway, RequestId},
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Committed state plus the log of events it produced
struct Chain {
    bank: Bank,
    events: Vec<RaffleEvent>,
}

/// Handle to one raffle deployment.
///
/// Every mutation runs under the write lock and is committed only if it
/// succeeds, so a failed call leaves no trace. Upkeep and settlement work on
/// a clone of the bank; entries and airdrops validate before writing and
/// apply in place.
pub struct RaffleEngine {
    address: Pubkey,
    config: RaffleConfig,
    chain: RwLock<Chain>,
    gateway: Arc<dyn RandomnessGateway>,
    clock: Arc<dyn TimeSource>,
    notifier: broadcast::Sender<RaffleEvent>,
}

impl RaffleEngine {
    pub fn new(
        address: Pubkey,
        config: RaffleConfig,
        gateway: Arc<dyn RandomnessGateway>,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, RaffleError> {
        config.validate()?;
        if gateway.address() != config.gateway {
            return Err(RaffleError::InvalidConfig(
                "gateway handle does not match configured gateway address",
            ));
        }

        let raffle = Raffle::new(address, &config, clock.unix_timestamp());
        let (notifier, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        info!(
            "Raffle {} deployed: entrance fee {} lamports, interval {}s, gateway {}",
            address, config.entrance_fee, config.interval, config.gateway
        );

        Ok(Self {
            address,
            config,
            chain: RwLock::new(Chain {
                bank: Bank::new(raffle),
                events: Vec::new(),
            }),
            gateway,
            clock,
            notifier,
        })
    }

    /// Apply a multi-step transition to a working copy of the bank, committed on success
    async fn transact<T, F>(&self, name: &str, apply: F) -> Result<T, RaffleError>
    where
        F: FnOnce(&mut Bank, &mut Vec<RaffleEvent>, UnixTimestamp) -> Result<T, RaffleError>,
    {
        let mut chain = self.chain.write().await;
        let mut working = chain.bank.clone();
        let mut emitted = Vec::new();
        let now = self.clock.unix_timestamp();

        match apply(&mut working, &mut emitted, now) {
            Ok(output) => {
                chain.bank = working;
                self.publish(&mut chain, emitted);
                Ok(output)
            }
            Err(err) => {
                debug!("{} rolled back: {}", name, err);
                Err(err)
            }
        }
    }

    /// Apply a transition directly to the committed bank.
    ///
    /// `apply` must check every precondition before its first write, so an
    /// error leaves the bank untouched without paying for a copy.
    async fn transact_in_place<T, F>(&self, name: &str, apply: F) -> Result<T, RaffleError>
    where
        F: FnOnce(&mut Bank, &mut Vec<RaffleEvent>, UnixTimestamp) -> Result<T, RaffleError>,
    {
        let mut chain = self.chain.write().await;
        let mut emitted = Vec::new();
        let now = self.clock.unix_timestamp();

        match apply(&mut chain.bank, &mut emitted, now) {
            Ok(output) => {
                self.publish(&mut chain, emitted);
                Ok(output)
            }
            Err(err) => {
                debug!("{} rejected: {}", name, err);
                Err(err)
            }
        }
    }

    fn publish(&self, chain: &mut Chain, emitted: Vec<RaffleEvent>) {
        for event in emitted {
            // No subscribers is fine
            let _ = self.notifier.send(event);
            chain.events.push(event);
        }
    }

    /// Enter the current round, paying `amount` lamports from `player`
    pub async fn enter_raffle(&self, player: &Pubkey, amount: u64) -> Result<(), RaffleError> {
        self.transact_in_place("enter_raffle", |bank, events, _| {
            Processor::process_enter_raffle(bank, events, player, amount)
        })
        .await
    }

    /// Whether upkeep should run, with the packed diagnostics as payload
    pub async fn check_upkeep(&self, _check_data: &[u8]) -> (bool, Vec<u8>) {
        let diagnostics = self.upkeep_diagnostics().await;
        let mut perform_data = vec![0u8; UpkeepDiagnostics::LEN];
        diagnostics.pack_into_slice(&mut perform_data);
        (diagnostics.upkeep_needed(), perform_data)
    }

    pub async fn upkeep_diagnostics(&self) -> UpkeepDiagnostics {
        let chain = self.chain.read().await;
        Processor::process_check_upkeep(&chain.bank, self.clock.unix_timestamp())
    }

    /// Close the round and request randomness for the winner
    pub async fn perform_upkeep(&self, _perform_data: &[u8]) -> Result<RequestId, RaffleError> {
        let config = &self.config;
        let gateway = self.gateway.as_ref();
        self.transact("perform_upkeep", |bank, events, now| {
            Processor::process_perform_upkeep(bank, events, config, gateway, now)
        })
        .await
    }

    /// Settle the round; returns the winner
    pub async fn fulfill_random_words(
        &self,
        caller: &Pubkey,
        request_id: RequestId,
        random_words: &[u64],
    ) -> Result<Pubkey, RaffleError> {
        let config = &self.config;
        let result = self
            .transact("fulfill_random_words", |bank, events, now| {
                Processor::process_fulfill_random_words(
                    bank,
                    events,
                    config,
                    caller,
                    request_id,
                    random_words,
                    now,
                )
            })
            .await;

        if let Err(err) = &result {
            warn!("Rejected fulfilment of request {} from {}: {}", request_id, caller, err);
        }
        result
    }

    /// Decode and dispatch a packed instruction on behalf of `caller`
    pub async fn process_instruction(
        &self,
        caller: &Pubkey,
        instruction_data: &[u8],
    ) -> Result<(), RaffleError> {
        let instruction = RaffleInstruction::unpack(instruction_data)?;

        match instruction {
            RaffleInstruction::EnterRaffle { amount } => {
                debug!("Instruction: Enter Raffle");
                self.enter_raffle(caller, amount).await
            }
            RaffleInstruction::PerformUpkeep { perform_data } => {
                debug!("Instruction: Perform Upkeep");
                self.perform_upkeep(&perform_data).await.map(|_| ())
            }
            RaffleInstruction::FulfillRandomWords {
                request_id,
                random_words,
            } => {
                debug!("Instruction: Fulfill Random Words");
                self.fulfill_random_words(caller, request_id, &random_words)
                    .await
                    .map(|_| ())
            }
        }
    }

    /// Credit lamports to any ledger account
    pub async fn airdrop(&self, account: &Pubkey, lamports: u64) -> Result<(), RaffleError> {
        self.transact_in_place("airdrop", |bank, _, _| {
            bank.ledger.deposit(account, lamports)?;
            Ok(())
        })
        .await
    }

    /// Make `account` refuse (or accept again) incoming transfers
    pub async fn set_rejects_transfers(&self, account: &Pubkey, rejects: bool) {
        let mut chain = self.chain.write().await;
        chain.bank.ledger.set_rejects_transfers(account, rejects);
    }

    /// Receive events as they are committed
    pub fn subscribe(&self) -> broadcast::Receiver<RaffleEvent> {
        self.notifier.subscribe()
    }

    pub fn address(&self) -> Pubkey {
        self.address
    }

    pub fn config(&self) -> &RaffleConfig {
        &self.config
    }

    pub fn entrance_fee(&self) -> u64 {
        self.config.entrance_fee
    }

    pub fn interval(&self) -> u64 {
        self.config.interval
    }

    pub fn num_words(&self) -> u32 {
        self.config.num_words
    }

    pub fn request_confirmations(&self) -> u16 {
        self.config.request_confirmations
    }

    pub async fn raffle_state(&self) -> RaffleState {
        self.chain.read().await.bank.raffle.raffle_state
    }

    pub async fn player(&self, index: usize) -> Option<Pubkey> {
        self.chain.read().await.bank.raffle.players.get(index).copied()
    }

    pub async fn number_of_players(&self) -> usize {
        self.chain.read().await.bank.raffle.players.len()
    }

    pub async fn recent_winner(&self) -> Option<Pubkey> {
        self.chain.read().await.bank.raffle.recent_winner
    }

    pub async fn last_timestamp(&self) -> UnixTimestamp {
        self.chain.read().await.bank.raffle.last_timestamp
    }

    pub async fn pending_request(&self) -> Option<RequestId> {
        self.chain.read().await.bank.raffle.pending_request
    }

    /// Lamports in the prize pool
    pub async fn balance(&self) -> u64 {
        self.chain.read().await.bank.raffle_balance()
    }

    pub async fn balance_of(&self, account: &Pubkey) -> u64 {
        self.chain.read().await.bank.ledger.balance(account)
    }

    pub async fn snapshot(&self) -> Raffle {
        self.chain.read().await.bank.raffle.clone()
    }

    /// Every event committed so far, oldest first.
    ///
    /// The log is kept for the lifetime of the engine and never pruned.
    /// Long-running consumers should follow `subscribe` instead.
    pub async fn events(&self) -> Vec<RaffleEvent> {
        self.chain.read().await.events.clone()
    }
}

#[async_trait]
impl RandomnessConsumer for RaffleEngine {
    async fn raw_fulfill_random_words(
        &self,
        caller: Pubkey,
        request_id: RequestId,
        random_words: Vec<u64>,
    ) -> Result<(), RaffleError> {
        self.fulfill_random_words(&caller, request_id, &random_words)
            .await
            .map(|_| ())
    }
}
