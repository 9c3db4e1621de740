// Raffle keeper
//
// Deploys a raffle against a simulated randomness oracle, runs the upkeep
// scheduler and feeds each round with funded demo entrants.
//
// Usage:
//   cargo run --bin raffle-keeper -- --interval 10 --players 6 --rounds 2

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use rand::Rng;
use solana_program::{
    native_token::{lamports_to_sol, sol_to_lamports},
    pubkey::Pubkey,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::{broadcast::error::RecvError, mpsc, watch};

use upkeep_raffle::{
    clock::SystemClock,
    event::RaffleEvent,
    state::RaffleConfig,
    vrf::RandomnessConsumer,
    vrf_oracle::{OracleFulfillment, OracleGateway},
    RaffleEngine, RaffleError, UpkeepScheduler,
};

#[derive(Parser, Debug)]
#[command(name = "raffle-keeper")]
#[command(about = "Run a raffle with automated upkeep and a simulated oracle", long_about = None)]
struct Args {
    /// Entrance fee in SOL
    #[arg(long, default_value_t = 0.01)]
    entrance_fee: f64,

    /// Minimum round length in seconds
    #[arg(long, default_value_t = 30)]
    interval: u64,

    /// Scheduler poll period in milliseconds
    #[arg(long, default_value_t = 1000)]
    poll_ms: u64,

    /// Delay before the oracle answers, in milliseconds
    #[arg(long, default_value_t = 2000)]
    oracle_delay_ms: u64,

    /// Entrants per round
    #[arg(short, long, default_value_t = 6)]
    players: usize,

    /// Rounds to settle before exiting
    #[arg(short, long, default_value_t = 1)]
    rounds: usize,

    /// Subscription billed for randomness
    #[arg(long, default_value_t = 1)]
    subscription_id: u64,

    /// Gas limit for the randomness callback
    #[arg(long, default_value_t = 500_000)]
    callback_gas_limit: u32,
}

// A round can only close with at least one paying entrant
fn check_args(args: &Args) -> Result<()> {
    if args.players == 0 {
        bail!("--players must be at least 1");
    }
    if sol_to_lamports(args.entrance_fee) == 0 {
        bail!("--entrance-fee must be at least 1 lamport");
    }
    if args.poll_ms == 0 {
        bail!("--poll-ms must be at least 1");
    }
    Ok(())
}

/// Fund and enter up to `players` demo entrants.
///
/// Stops early once the scheduler has closed the round. Returns how many
/// entered.
async fn enter_round(engine: &RaffleEngine, players: usize, round: usize) -> Result<usize> {
    let entrance_fee = engine.entrance_fee();
    for entered in 0..players {
        let player = Pubkey::new_unique();
        engine.airdrop(&player, entrance_fee).await?;
        match engine.enter_raffle(&player, entrance_fee).await {
            Ok(()) => {}
            Err(RaffleError::RaffleNotOpen) => {
                warn!("Round {} closed after {} of {} players", round, entered, players);
                return Ok(entered);
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Player {} could not enter round {}", player, round))
            }
        }
    }
    Ok(players)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    check_args(&args)?;

    let gateway_address = Pubkey::new_unique();
    let (gateway, mut oracle_requests) = OracleGateway::new(gateway_address);
    let gateway = Arc::new(gateway);

    let config = RaffleConfig {
        entrance_fee: sol_to_lamports(args.entrance_fee),
        interval: args.interval,
        gateway: gateway_address,
        subscription_id: args.subscription_id,
        callback_gas_limit: args.callback_gas_limit,
        ..RaffleConfig::default()
    };
    let engine = Arc::new(
        RaffleEngine::new(
            Pubkey::new_unique(),
            config,
            gateway.clone(),
            Arc::new(SystemClock),
        )
        .context("Failed to deploy raffle")?,
    );

    // Simulated oracle: answer every request with fresh randomness
    let (fulfillment_tx, fulfillment_rx) = mpsc::channel(16);
    let oracle_delay = Duration::from_millis(args.oracle_delay_ms);
    tokio::spawn(async move {
        while let Some(request) = oracle_requests.recv().await {
            tokio::time::sleep(oracle_delay).await;
            let random_words: Vec<u64> = {
                let mut rng = rand::thread_rng();
                (0..request.request.num_words).map(|_| rng.gen()).collect()
            };
            let fulfillment = OracleFulfillment {
                request_id: request.request_id,
                random_words,
            };
            if fulfillment_tx.send(fulfillment).await.is_err() {
                break;
            }
        }
    });

    // Relay oracle answers back into the raffle
    let consumer: Arc<dyn RandomnessConsumer> = engine.clone();
    let relay = gateway.clone();
    tokio::spawn(async move { relay.deliver(fulfillment_rx, consumer).await });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = UpkeepScheduler::new(engine.clone(), Duration::from_millis(args.poll_ms));
    let keeper = tokio::spawn(scheduler.run(shutdown_rx));

    let mut events = engine.subscribe();
    for round in 1..=args.rounds {
        let entered = enter_round(&engine, args.players, round).await?;
        info!(
            "Round {}: {} players entered, pool {} SOL",
            round,
            entered,
            lamports_to_sol(engine.balance().await)
        );

        // Wait for settlement
        loop {
            match events.recv().await {
                Ok(RaffleEvent::PickedWinner { winner }) => {
                    println!(
                        "Round {} winner: {} ({} SOL)",
                        round,
                        winner,
                        lamports_to_sol(engine.balance_of(&winner).await)
                    );
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Missed {} raffle events", skipped),
                Err(RecvError::Closed) => bail!("Raffle event stream closed"),
            }
        }
    }

    shutdown_tx.send(true)?;
    let performed = keeper.await?;
    info!("Keeper finished, {} upkeeps performed", performed);
    Ok(())
}
