// Deterministic randomness gateway for tests
use dashmap::DashMap;
use log::debug;
use solana_program::pubkey::Pubkey;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::{
    error::RaffleError,
    vrf::{self, GatewayError, RandomnessConsumer, RandomnessGateway, RandomnessRequest, RequestId},
};

/// Issues sequential request ids and fulfils them on demand.
///
/// Fulfilment is delivered to the consumer even for ids this gateway never
/// issued, so consumers can be tested against bogus callbacks.
pub struct MockGateway {
    address: Pubkey,
    last_request_id: AtomicU64,
    requests: DashMap<RequestId, RandomnessRequest>,
    fail_requests: AtomicBool,
}

impl MockGateway {
    pub fn new(address: Pubkey) -> Self {
        Self {
            address,
            last_request_id: AtomicU64::new(0),
            requests: DashMap::new(),
            fail_requests: AtomicBool::new(false),
        }
    }

    /// Make subsequent requests fail as if the oracle were down
    pub fn set_fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    /// Ids issued and not yet accepted by their consumer
    pub fn pending_requests(&self) -> Vec<RequestId> {
        let mut ids: Vec<RequestId> = self.requests.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn request(&self, request_id: RequestId) -> Option<RandomnessRequest> {
        self.requests.get(&request_id).map(|entry| entry.value().clone())
    }

    /// Deliver `keccak(request_id || i)` words for `request_id`
    pub async fn fulfill_random_words(
        &self,
        request_id: RequestId,
        consumer: &dyn RandomnessConsumer,
    ) -> Result<(), RaffleError> {
        let num_words = self
            .requests
            .get(&request_id)
            .map(|entry| entry.num_words)
            .unwrap_or(1);
        let words = vrf::expand_random_words(request_id, num_words);
        self.fulfill_random_words_with_override(request_id, consumer, words)
            .await
    }

    /// Deliver caller-chosen words for `request_id`
    pub async fn fulfill_random_words_with_override(
        &self,
        request_id: RequestId,
        consumer: &dyn RandomnessConsumer,
        random_words: Vec<u64>,
    ) -> Result<(), RaffleError> {
        debug!("Mock fulfilling request {} with {:?}", request_id, random_words);
        consumer
            .raw_fulfill_random_words(self.address, request_id, random_words)
            .await?;
        self.requests.remove(&request_id);
        Ok(())
    }
}

impl RandomnessGateway for MockGateway {
    fn address(&self) -> Pubkey {
        self.address
    }

    fn request_random_words(&self, request: &RandomnessRequest) -> Result<RequestId, GatewayError> {
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(GatewayError::OracleUnavailable);
        }
        let request_id = self.last_request_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.insert(request_id, request.clone());
        Ok(request_id)
    }
}
