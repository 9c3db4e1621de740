// Randomness gateway backed by an external oracle service
use log::{info, warn};
use solana_program::pubkey::Pubkey;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::mpsc;

use crate::vrf::{
    self, GatewayError, RandomnessConsumer, RandomnessGateway, RandomnessRequest, RequestId,
};

pub const MAX_NUM_WORDS: u32 = 500;
pub const MIN_REQUEST_CONFIRMATIONS: u16 = 3;
pub const MAX_REQUEST_CONFIRMATIONS: u16 = 200;

/// Request handed to the oracle service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OracleRequest {
    pub request_id: RequestId,
    pub request: RandomnessRequest,
}

/// Answer coming back from the oracle service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OracleFulfillment {
    pub request_id: RequestId,
    pub random_words: Vec<u64>,
}

/// Forwards requests to an oracle over a channel and relays its answers to
/// the consumer under the gateway's identity.
pub struct OracleGateway {
    address: Pubkey,
    nonce: AtomicU64,
    requests: mpsc::UnboundedSender<OracleRequest>,
}

impl OracleGateway {
    /// Create the gateway and the receiving end the oracle listens on
    pub fn new(address: Pubkey) -> (Self, mpsc::UnboundedReceiver<OracleRequest>) {
        let (requests, receiver) = mpsc::unbounded_channel();
        let gateway = Self {
            address,
            nonce: AtomicU64::new(0),
            requests,
        };
        (gateway, receiver)
    }

    /// Relay oracle answers to `consumer` until the channel closes.
    ///
    /// Returns the number of fulfilments the consumer accepted.
    pub async fn deliver(
        &self,
        mut fulfillments: mpsc::Receiver<OracleFulfillment>,
        consumer: Arc<dyn RandomnessConsumer>,
    ) -> usize {
        let mut accepted = 0;
        while let Some(fulfillment) = fulfillments.recv().await {
            let request_id = fulfillment.request_id;
            match consumer
                .raw_fulfill_random_words(self.address, request_id, fulfillment.random_words)
                .await
            {
                Ok(()) => {
                    accepted += 1;
                    info!("Delivered randomness for request {}", request_id);
                }
                Err(e) => {
                    warn!("Consumer rejected randomness for request {}: {}", request_id, e);
                }
            }
        }
        accepted
    }
}

impl RandomnessGateway for OracleGateway {
    fn address(&self) -> Pubkey {
        self.address
    }

    fn request_random_words(&self, request: &RandomnessRequest) -> Result<RequestId, GatewayError> {
        if request.num_words > MAX_NUM_WORDS {
            return Err(GatewayError::TooManyWords {
                requested: request.num_words,
                max: MAX_NUM_WORDS,
            });
        }
        if request.request_confirmations < MIN_REQUEST_CONFIRMATIONS
            || request.request_confirmations > MAX_REQUEST_CONFIRMATIONS
        {
            return Err(GatewayError::InvalidConfirmations {
                requested: request.request_confirmations,
                min: MIN_REQUEST_CONFIRMATIONS,
                max: MAX_REQUEST_CONFIRMATIONS,
            });
        }

        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let request_id = vrf::derive_request_id(
            &request.key_hash,
            &request.consumer,
            request.subscription_id,
            nonce,
        );

        self.requests
            .send(OracleRequest {
                request_id,
                request: request.clone(),
            })
            .map_err(|_| GatewayError::OracleUnavailable)?;
        Ok(request_id)
    }
}
