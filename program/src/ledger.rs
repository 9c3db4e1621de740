use solana_program::pubkey::Pubkey;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient funds in {account}: balance {balance}, needed {needed}")]
    InsufficientFunds {
        account: Pubkey,
        balance: u64,
        needed: u64,
    },

    #[error("Account {account} rejects incoming transfers")]
    TransferRejected { account: Pubkey },

    #[error("Lamport balance overflow")]
    Overflow,
}

/// In-process lamport balances
#[derive(Clone, Debug, Default)]
pub struct Ledger {
    balances: HashMap<Pubkey, u64>,
    rejecting: HashSet<Pubkey>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, account: &Pubkey) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Credit lamports from outside the ledger
    pub fn deposit(&mut self, account: &Pubkey, lamports: u64) -> Result<(), LedgerError> {
        let balance = self
            .balance(account)
            .checked_add(lamports)
            .ok_or(LedgerError::Overflow)?;
        self.balances.insert(*account, balance);
        Ok(())
    }

    /// Mark `account` as refusing every incoming transfer
    pub fn set_rejects_transfers(&mut self, account: &Pubkey, rejects: bool) {
        if rejects {
            self.rejecting.insert(*account);
        } else {
            self.rejecting.remove(account);
        }
    }

    pub fn transfer(&mut self, from: &Pubkey, to: &Pubkey, lamports: u64) -> Result<(), LedgerError> {
        if self.rejecting.contains(to) {
            return Err(LedgerError::TransferRejected { account: *to });
        }

        let from_balance = self.balance(from);
        if from_balance < lamports {
            return Err(LedgerError::InsufficientFunds {
                account: *from,
                balance: from_balance,
                needed: lamports,
            });
        }
        if from == to {
            return Ok(());
        }

        let to_balance = self
            .balance(to)
            .checked_add(lamports)
            .ok_or(LedgerError::Overflow)?;
        self.balances.insert(*from, from_balance - lamports);
        self.balances.insert(*to, to_balance);
        Ok(())
    }
}
