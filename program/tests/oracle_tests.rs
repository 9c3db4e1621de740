use solana_sdk::{
    native_token::LAMPORTS_PER_SOL,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::sync::Arc;
use tokio::sync::mpsc;

use upkeep_raffle::{
    clock::ManualClock,
    state::{RaffleConfig, RaffleState},
    vrf::{self, GatewayError, RandomnessConsumer, RandomnessGateway, RandomnessRequest},
    vrf_oracle::{OracleFulfillment, OracleGateway, OracleRequest, MAX_NUM_WORDS},
    RaffleEngine, RaffleError,
};

const ENTRANCE_FEE: u64 = LAMPORTS_PER_SOL / 100;
const INTERVAL: u64 = 30;
const KEY_HASH: [u8; 32] = [7u8; 32];
const SUBSCRIPTION_ID: u64 = 42;

fn setup() -> (
    Arc<RaffleEngine>,
    Arc<OracleGateway>,
    mpsc::UnboundedReceiver<OracleRequest>,
    Arc<ManualClock>,
) {
    let (gateway, oracle_requests) = OracleGateway::new(Keypair::new().pubkey());
    let gateway = Arc::new(gateway);
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let config = RaffleConfig {
        entrance_fee: ENTRANCE_FEE,
        interval: INTERVAL,
        gateway: gateway.address(),
        key_hash: KEY_HASH,
        subscription_id: SUBSCRIPTION_ID,
        ..RaffleConfig::default()
    };
    let engine = RaffleEngine::new(
        Keypair::new().pubkey(),
        config,
        gateway.clone(),
        clock.clone(),
    )
    .unwrap();
    (Arc::new(engine), gateway, oracle_requests, clock)
}

async fn ready_for_upkeep(engine: &RaffleEngine, clock: &ManualClock) -> Pubkey {
    let player = Keypair::new().pubkey();
    engine.airdrop(&player, LAMPORTS_PER_SOL).await.unwrap();
    engine.enter_raffle(&player, ENTRANCE_FEE).await.unwrap();
    clock.advance(INTERVAL as i64 + 1);
    player
}

fn request(num_words: u32, request_confirmations: u16) -> RandomnessRequest {
    RandomnessRequest {
        key_hash: KEY_HASH,
        subscription_id: SUBSCRIPTION_ID,
        request_confirmations,
        callback_gas_limit: 500_000,
        num_words,
        consumer: Keypair::new().pubkey(),
    }
}

#[tokio::test]
async fn test_request_forwarded_to_oracle() {
    let (engine, _gateway, mut oracle_requests, clock) = setup();
    ready_for_upkeep(&engine, &clock).await;

    let request_id = engine.perform_upkeep(&[]).await.unwrap();
    let forwarded = oracle_requests.recv().await.unwrap();

    assert_eq!(forwarded.request_id, request_id);
    assert_eq!(forwarded.request.consumer, engine.address());
    assert_eq!(forwarded.request.key_hash, KEY_HASH);
    assert_eq!(forwarded.request.subscription_id, SUBSCRIPTION_ID);
    assert_eq!(
        request_id,
        vrf::derive_request_id(&KEY_HASH, &engine.address(), SUBSCRIPTION_ID, 0)
    );
}

#[tokio::test]
async fn test_request_ids_use_fresh_nonce() {
    let (gateway, _oracle_requests) = OracleGateway::new(Keypair::new().pubkey());
    let request = request(1, 3);

    let first = gateway.request_random_words(&request).unwrap();
    let second = gateway.request_random_words(&request).unwrap();

    assert_ne!(first, second);
}

#[tokio::test]
async fn test_request_validation() {
    let (gateway, _oracle_requests) = OracleGateway::new(Keypair::new().pubkey());

    assert_eq!(
        gateway.request_random_words(&request(MAX_NUM_WORDS + 1, 3)),
        Err(GatewayError::TooManyWords {
            requested: MAX_NUM_WORDS + 1,
            max: MAX_NUM_WORDS,
        })
    );
    assert!(matches!(
        gateway.request_random_words(&request(1, 2)),
        Err(GatewayError::InvalidConfirmations { requested: 2, .. })
    ));
    assert!(matches!(
        gateway.request_random_words(&request(1, 201)),
        Err(GatewayError::InvalidConfirmations { requested: 201, .. })
    ));
    assert!(gateway.request_random_words(&request(MAX_NUM_WORDS, 200)).is_ok());
}

#[tokio::test]
async fn test_oracle_gone_keeps_raffle_open() {
    let (engine, _gateway, oracle_requests, clock) = setup();
    ready_for_upkeep(&engine, &clock).await;
    drop(oracle_requests);

    assert_eq!(
        engine.perform_upkeep(&[]).await,
        Err(RaffleError::Gateway(GatewayError::OracleUnavailable))
    );
    assert_eq!(engine.raffle_state().await, RaffleState::Open);
    assert_eq!(engine.pending_request().await, None);
}

#[tokio::test]
async fn test_delivered_fulfillment_settles_round() {
    let (engine, gateway, mut oracle_requests, clock) = setup();
    let player = ready_for_upkeep(&engine, &clock).await;
    engine.perform_upkeep(&[]).await.unwrap();
    let request_id = oracle_requests.recv().await.unwrap().request_id;

    let (fulfillment_tx, fulfillment_rx) = mpsc::channel(4);
    let consumer: Arc<dyn RandomnessConsumer> = engine.clone();
    let relay = gateway.clone();
    let delivery = tokio::spawn(async move { relay.deliver(fulfillment_rx, consumer).await });

    // Unknown id, the real answer, then a replay
    for id in [request_id.wrapping_add(1), request_id, request_id] {
        fulfillment_tx
            .send(OracleFulfillment {
                request_id: id,
                random_words: vec![5],
            })
            .await
            .unwrap();
    }
    drop(fulfillment_tx);

    assert_eq!(delivery.await.unwrap(), 1);
    assert_eq!(engine.recent_winner().await, Some(player));
    assert_eq!(engine.raffle_state().await, RaffleState::Open);
    assert_eq!(engine.balance_of(&player).await, LAMPORTS_PER_SOL);
}
