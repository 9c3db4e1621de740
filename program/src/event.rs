use solana_program::pubkey::Pubkey;

use crate::vrf::RequestId;

/// Observable state changes, one per committed transition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RaffleEvent {
    EnteredRaffle { player: Pubkey },
    RequestedRaffleWinner { request_id: RequestId },
    PickedWinner { winner: Pubkey },
}
