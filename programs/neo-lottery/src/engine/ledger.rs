use anchor_lang::prelude::*;

use super::RoundStore;
use crate::error::ErrorCode;
use crate::state::Round;

/// Every round in memory, in index order. Used off-chain to replay or
/// simulate a lottery.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ledger {
    pub rounds: Vec<Round>,
}

impl Ledger {
    /// A ledger whose round 0 is open since `opened_at`.
    pub fn new(opened_at: u64) -> Self {
        Self {
            rounds: vec![Round::new(0, opened_at, 0)],
        }
    }

    pub fn round_count(&self) -> u64 {
        self.rounds.len() as u64
    }
}

impl RoundStore for Ledger {
    fn round(&self, index: u64) -> Result<&Round> {
        self.rounds
            .get(index as usize)
            .ok_or_else(|| error!(ErrorCode::RoundNotFound))
    }

    fn round_mut(&mut self, index: u64) -> Result<&mut Round> {
        self.rounds
            .get_mut(index as usize)
            .ok_or_else(|| error!(ErrorCode::RoundNotFound))
    }

    fn can_insert(&self, index: u64) -> Result<()> {
        require_eq!(index, self.round_count(), ErrorCode::RoundNotFound);
        Ok(())
    }

    fn insert(&mut self, round: Round) -> Result<()> {
        self.can_insert(round.index)?;
        self.rounds.push(round);
        Ok(())
    }
}
