//! Round engine.
//!
//! Everything here runs on account data alone. Rounds come in through
//! [`RoundStore`], tokens through [`TokenGateway`] and entropy through
//! [`EntropySource`], so the same code runs inside instructions and in host
//! tests. Operations check everything they can and settle tokens before they
//! write any state.

pub mod draw;
pub mod ledger;
pub mod lifecycle;
pub mod payout;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use draw::*;
pub use ledger::*;
pub use lifecycle::*;
pub use payout::*;

use anchor_lang::prelude::*;

use crate::error::ErrorCode;
use crate::state::{NumberSet, Round, Ticket};

/// One balance movement between a player and the escrow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Movement {
    /// Stake pulled from `owner` into escrow, using the allowance `owner`
    /// granted to the lottery.
    Pull { owner: Pubkey, amount: u64 },
    /// Prize pushed from escrow to `owner`.
    Push { owner: Pubkey, amount: u64 },
}

/// Fungible balance movements between players and the escrow.
pub trait TokenGateway {
    /// Applies `movements` in order. Either all of them take effect or, on
    /// error, none does.
    fn settle(&mut self, movements: &[Movement]) -> Result<()>;

    fn balance_of(&self, owner: &Pubkey) -> u64;
}

/// Block heights and the hashes of recent heights.
pub trait EntropySource {
    fn current_height(&self) -> u64;

    /// Hash of `height`, or `None` once it left the retained history or when
    /// no block was produced at that height.
    fn hash_at(&self, height: u64) -> Option<[u8; 32]>;
}

/// The rounds an operation may read and write.
///
/// A missing round is an error, so an operation can only touch the rounds
/// its caller loaded.
pub trait RoundStore {
    fn round(&self, index: u64) -> Result<&Round>;

    fn round_mut(&mut self, index: u64) -> Result<&mut Round>;

    /// Fails unless a round with `index` can be inserted.
    fn can_insert(&self, index: u64) -> Result<()>;

    fn insert(&mut self, round: Round) -> Result<()>;

    fn ticket_count(&self, index: u64) -> Result<u32> {
        Ok(self.round(index)?.ticket_count)
    }

    /// `None` until the round is drawn.
    fn winning_numbers(&self, index: u64) -> Result<Option<NumberSet>> {
        Ok(self.round(index)?.winning_numbers)
    }

    fn prize_fund(&self, index: u64) -> Result<u64> {
        Ok(self.round(index)?.prize_fund)
    }

    fn reference_round(&self, index: u64) -> Result<u64> {
        Ok(self.round(index)?.reference_round)
    }
}

/// A deferred win paid out when a round opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Release {
    pub resolving_round: u64,
    pub ticket_round: u64,
    pub ticket_index: u32,
    pub player: Pubkey,
    pub amount: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundOpening {
    pub round_index: u64,
    pub opened_at: u64,
    pub released: Vec<Release>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct BetReceipt {
    pub round_index: u64,
    pub ticket_index: u32,
    /// Lottery-wide sequence number of the ticket.
    pub sequence: u64,
    /// The ticket to store under `sequence`.
    pub ticket: Ticket,
    /// Set when the open round was full and this stake opened the next one.
    pub opened: Option<RoundOpening>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub resolving_round: u64,
    pub amount: u64,
    pub deferred: bool,
}

pub(crate) fn checked_add(a: u64, b: u64) -> Result<u64> {
    a.checked_add(b).ok_or_else(|| error!(ErrorCode::MathOverflow))
}
