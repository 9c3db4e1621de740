use borsh::{BorshDeserialize, BorshSerialize};

use crate::{error::RaffleError, vrf::RequestId};

/// Mutating operations accepted by `RaffleEngine::process_instruction`.
///
/// Upkeep checks are read-only and have no instruction.
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum RaffleInstruction {
    /// Enter the current round
    ///
    /// Caller: the entrant, who pays `amount` lamports into the prize pool
    EnterRaffle {
        /// Lamports paid, at least the entrance fee
        amount: u64,
    },

    /// Close the round and request randomness for the winner
    ///
    /// Caller: anyone, usually the upkeep scheduler
    PerformUpkeep {
        /// Opaque payload, ignored
        perform_data: Vec<u8>,
    },

    /// Settle the round with delivered randomness
    ///
    /// Caller: the configured randomness gateway only
    FulfillRandomWords {
        request_id: RequestId,
        random_words: Vec<u64>,
    },
}

impl RaffleInstruction {
    /// Unpacks a byte buffer into a RaffleInstruction
    pub fn unpack(input: &[u8]) -> Result<Self, RaffleError> {
        Self::try_from_slice(input).map_err(|_| RaffleError::InvalidInstructionData)
    }

    /// Packs a RaffleInstruction into a byte buffer
    pub fn pack(&self) -> Result<Vec<u8>, RaffleError> {
        borsh::to_vec(self).map_err(|_| RaffleError::InvalidInstructionData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_layout() {
        let mut expected = vec![0u8];
        expected.extend_from_slice(&10_000_000u64.to_le_bytes());
        assert_eq!(
            RaffleInstruction::EnterRaffle { amount: 10_000_000 }.pack().unwrap(),
            expected
        );

        let mut expected = vec![1u8];
        expected.extend_from_slice(&3u32.to_le_bytes());
        expected.extend_from_slice(&[4, 5, 6]);
        assert_eq!(
            RaffleInstruction::PerformUpkeep {
                perform_data: vec![4, 5, 6],
            }
            .pack()
            .unwrap(),
            expected
        );

        let mut expected = vec![2u8];
        expected.extend_from_slice(&9u64.to_le_bytes());
        expected.extend_from_slice(&2u32.to_le_bytes());
        expected.extend_from_slice(&7u64.to_le_bytes());
        expected.extend_from_slice(&8u64.to_le_bytes());
        assert_eq!(
            RaffleInstruction::FulfillRandomWords {
                request_id: 9,
                random_words: vec![7, 8],
            }
            .pack()
            .unwrap(),
            expected
        );
    }

    #[test]
    fn test_unpack_reads_packed_instruction() {
        let instruction = RaffleInstruction::FulfillRandomWords {
            request_id: u64::MAX,
            random_words: vec![],
        };
        let data = instruction.pack().unwrap();
        assert_eq!(RaffleInstruction::unpack(&data).unwrap(), instruction);
    }

    #[test]
    fn test_unpack_enter_raffle() {
        let mut data = vec![0u8];
        data.extend_from_slice(&10_000_000u64.to_le_bytes());
        assert_eq!(
            RaffleInstruction::unpack(&data).unwrap(),
            RaffleInstruction::EnterRaffle { amount: 10_000_000 }
        );
    }

    #[test]
    fn test_unpack_rejects_garbage() {
        assert_eq!(
            RaffleInstruction::unpack(&[]),
            Err(RaffleError::InvalidInstructionData)
        );
        assert_eq!(
            RaffleInstruction::unpack(&[3]),
            Err(RaffleError::InvalidInstructionData)
        );
        // Truncated amount
        assert_eq!(
            RaffleInstruction::unpack(&[0, 1, 2]),
            Err(RaffleError::InvalidInstructionData)
        );
        // Trailing bytes
        let mut data = RaffleInstruction::EnterRaffle { amount: 1 }.pack().unwrap();
        data.push(0);
        assert_eq!(
            RaffleInstruction::unpack(&data),
            Err(RaffleError::InvalidInstructionData)
        );
    }
}
