// Randomness gateway boundary
use arrayref::array_ref;
use async_trait::async_trait;
use solana_program::{keccak, pubkey::Pubkey};
use thiserror::Error;

use crate::error::RaffleError;

/// Opaque handle tying a fulfilment to its request
pub type RequestId = u64;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Randomness oracle is unavailable")]
    OracleUnavailable,

    #[error("Requested {requested} random words, max is {max}")]
    TooManyWords { requested: u32, max: u32 },

    #[error("Request confirmations {requested} outside [{min}, {max}]")]
    InvalidConfirmations { requested: u16, min: u16, max: u16 },
}

/// Parameters of one randomness request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RandomnessRequest {
    pub key_hash: [u8; 32],
    pub subscription_id: u64,
    pub request_confirmations: u16,
    pub callback_gas_limit: u32,
    pub num_words: u32,
    /// Who the fulfilment is delivered to
    pub consumer: Pubkey,
}

/// Issues randomness requests. Fulfilment arrives later, out of band.
pub trait RandomnessGateway: Send + Sync {
    /// Identity fulfilments are delivered from
    fn address(&self) -> Pubkey;

    fn request_random_words(&self, request: &RandomnessRequest) -> Result<RequestId, GatewayError>;
}

/// Receives fulfilments from a gateway
#[async_trait]
pub trait RandomnessConsumer: Send + Sync {
    async fn raw_fulfill_random_words(
        &self,
        caller: Pubkey,
        request_id: RequestId,
        random_words: Vec<u64>,
    ) -> Result<(), RaffleError>;
}

/// Read a little-endian u64 from the first 8 bytes of a 32-byte digest
pub fn word_from_digest(digest: &[u8; 32]) -> u64 {
    u64::from_le_bytes(*array_ref![digest, 0, 8])
}

/// Request id derived from the request parameters and a per-gateway nonce
pub fn derive_request_id(
    key_hash: &[u8; 32],
    consumer: &Pubkey,
    subscription_id: u64,
    nonce: u64,
) -> RequestId {
    let digest = keccak::hashv(&[
        &key_hash[..],
        consumer.as_ref(),
        &subscription_id.to_le_bytes(),
        &nonce.to_le_bytes(),
    ]);
    word_from_digest(&digest.to_bytes())
}

/// Deterministic words for a request, `keccak(request_id || i)`
pub fn expand_random_words(request_id: RequestId, num_words: u32) -> Vec<u64> {
    (0..num_words as u64)
        .map(|i| {
            let digest = keccak::hashv(&[&request_id.to_le_bytes(), &i.to_le_bytes()]);
            word_from_digest(&digest.to_bytes())
        })
        .collect()
}

/// Pick a winner index from a random word
pub fn winner_index(random_word: u64, num_players: usize) -> usize {
    assert!(num_players > 0, "winner drawn from an empty round");
    (random_word % num_players as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_winner_index_wraps() {
        assert_eq!(winner_index(7, 6), 1);
        assert_eq!(winner_index(5, 6), 5);
        assert_eq!(winner_index(u64::MAX, 1), 0);
    }

    #[test]
    #[should_panic(expected = "empty round")]
    fn test_winner_index_empty_round_aborts() {
        winner_index(7, 0);
    }

    #[test]
    fn test_expand_random_words_is_deterministic() {
        let words = expand_random_words(1, 3);
        assert_eq!(words.len(), 3);
        assert_eq!(words, expand_random_words(1, 3));
        assert_ne!(words[0], words[1]);
        assert_ne!(expand_random_words(2, 1)[0], words[0]);
    }

    #[test]
    fn test_request_id_depends_on_nonce_and_consumer() {
        let key_hash = [1u8; 32];
        let consumer = Pubkey::new_unique();
        let first = derive_request_id(&key_hash, &consumer, 1, 0);

        assert_eq!(first, derive_request_id(&key_hash, &consumer, 1, 0));
        assert_ne!(first, derive_request_id(&key_hash, &consumer, 1, 1));
        assert_ne!(first, derive_request_id(&key_hash, &Pubkey::new_unique(), 1, 0));
    }
}
