//! In-memory token, slot clock and lottery table for host tests.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;

use anchor_lang::error::Error;
use anchor_lang::prelude::*;

use super::{
    BetReceipt, ClaimReceipt, DrawOutcome, EntropySource, Ledger, Movement, RoundOpening, RoundStore,
    TokenGateway,
};
use crate::error::ErrorCode;
use crate::state::{Lottery, NumberSet, Policy, Round, Ticket};

/// In-memory token with allowances granted to the lottery escrow.
#[derive(Clone, Default)]
pub struct MockToken {
    pub escrow: Pubkey,
    pub balances: HashMap<Pubkey, u64>,
    pub allowances: HashMap<Pubkey, u64>,
    /// Fails every push out of escrow, like a recipient account that
    /// cannot receive.
    pub refuse_payouts: bool,
}

impl MockToken {
    pub fn new() -> Self {
        Self {
            escrow: Pubkey::new_unique(),
            ..Self::default()
        }
    }

    pub fn mint(&mut self, owner: Pubkey, amount: u64) {
        *self.balances.entry(owner).or_default() += amount;
    }

    pub fn approve(&mut self, owner: Pubkey, amount: u64) {
        self.allowances.insert(owner, amount);
    }

    pub fn escrow_balance(&self) -> u64 {
        self.balance_of(&self.escrow)
    }

    fn apply(&mut self, movement: &Movement) -> Result<()> {
        match *movement {
            Movement::Pull { owner, amount } => {
                let allowance = self.allowances.get(&owner).copied().unwrap_or(0);
                let balance = self.balance_of(&owner);
                require!(
                    allowance >= amount && balance >= amount,
                    ErrorCode::InsufficientAllowance
                );
                self.allowances.insert(owner, allowance - amount);
                self.balances.insert(owner, balance - amount);
                let escrow = self.escrow;
                self.mint(escrow, amount);
            }
            Movement::Push { owner, amount } => {
                require!(!self.refuse_payouts, ErrorCode::RecipientNotProvided);
                let escrow = self.escrow_balance();
                require!(escrow >= amount, ErrorCode::EscrowShortfall);
                self.balances.insert(self.escrow, escrow - amount);
                self.mint(owner, amount);
            }
        }
        Ok(())
    }
}

impl TokenGateway for MockToken {
    fn settle(&mut self, movements: &[Movement]) -> Result<()> {
        let mut staged = self.clone();
        for movement in movements {
            staged.apply(movement)?;
        }
        *self = staged;
        Ok(())
    }

    fn balance_of(&self, owner: &Pubkey) -> u64 {
        self.balances.get(owner).copied().unwrap_or(0)
    }
}

/// Slot clock retaining the hashes of the last 512 slots.
pub struct MockEntropy {
    pub height: u64,
    pub skipped: BTreeSet<u64>,
}

impl MockEntropy {
    pub const RETAINED: u64 = 512;

    pub fn at(height: u64) -> Self {
        Self {
            height,
            skipped: BTreeSet::new(),
        }
    }

    pub fn skipping(mut self, heights: &[u64]) -> Self {
        self.skipped.extend(heights.iter().copied());
        self
    }

    pub fn hash_for(height: u64) -> [u8; 32] {
        let mut hash = [0xa5; 32];
        hash[..8].copy_from_slice(&height.to_le_bytes());
        hash
    }
}

impl EntropySource for MockEntropy {
    fn current_height(&self) -> u64 {
        self.height
    }

    fn hash_at(&self, height: u64) -> Option<[u8; 32]> {
        let retained = height < self.height && self.height - height <= Self::RETAINED;
        (retained && !self.skipped.contains(&height)).then(|| Self::hash_for(height))
    }
}

/// A lottery with every round and ticket held in memory, the way the
/// program holds them in accounts.
pub struct Table {
    pub lottery: Lottery,
    pub rounds: Ledger,
    /// Tickets by sequence number.
    pub tickets: Vec<Ticket>,
    pub token: MockToken,
}

impl Table {
    pub fn new(policy: Policy, opened_at: u64) -> Self {
        let lottery = Lottery::new(Pubkey::new_unique(), Pubkey::new_unique(), 255, 254, policy)
            .expect("valid policy");
        Self {
            lottery,
            rounds: Ledger::new(opened_at),
            tickets: Vec::new(),
            token: MockToken::new(),
        }
    }

    /// A player holding and approving `amount` tokens.
    pub fn player(&mut self, amount: u64) -> Pubkey {
        let player = Pubkey::new_unique();
        self.token.mint(player, amount);
        self.token.approve(player, amount);
        player
    }

    pub fn seed_reserve(&mut self, amount: u64) -> u64 {
        let escrow = self.token.escrow;
        self.token.mint(escrow, amount);
        self.lottery.credit_reserve(amount).expect("reserve fits")
    }

    pub fn bet(&mut self, player: Pubkey, stake: u64, numbers: NumberSet, height: u64) -> Result<BetReceipt> {
        let receipt = self.lottery.place_bet(
            &mut self.rounds,
            player,
            stake,
            numbers,
            height,
            &mut self.token,
        )?;
        assert_eq!(receipt.sequence, self.tickets.len() as u64);
        self.tickets.push(receipt.ticket.clone());
        Ok(receipt)
    }

    pub fn close(&mut self, height: u64) -> Result<RoundOpening> {
        self.lottery.close_round(&mut self.rounds, height, &mut self.token)
    }

    pub fn draw(&mut self, index: u64, entropy: &MockEntropy) -> Result<DrawOutcome> {
        self.lottery
            .request_draw(&mut self.rounds, index, entropy, &mut self.token)
    }

    pub fn record(&mut self, index: u64, numbers: NumberSet, height: u64) -> Result<DrawOutcome> {
        self.lottery
            .record_draw(&mut self.rounds, index, numbers, height, &mut self.token)
    }

    pub fn claim(&mut self, round_index: u64, ticket_index: u32) -> Result<ClaimReceipt> {
        let sequence = self.sequence(round_index, ticket_index)?;
        self.lottery.request_prize(
            &mut self.rounds,
            &mut self.tickets[sequence],
            &mut self.token,
        )
    }

    pub fn multiplier(&self, round_index: u64, ticket_index: u32) -> Result<u64> {
        let ticket = self.ticket(round_index, ticket_index)?;
        self.lottery.multiplier(&self.rounds, ticket)
    }

    pub fn ticket(&self, round_index: u64, ticket_index: u32) -> Result<&Ticket> {
        Ok(&self.tickets[self.sequence(round_index, ticket_index)?])
    }

    pub fn round(&self, index: u64) -> &Round {
        self.rounds.round(index).expect("round exists")
    }

    pub fn round_mut(&mut self, index: u64) -> &mut Round {
        self.rounds.round_mut(index).expect("round exists")
    }

    fn sequence(&self, round_index: u64, ticket_index: u32) -> Result<usize> {
        let round = self.rounds.round(round_index)?;
        require!(
            ticket_index < round.ticket_count,
            ErrorCode::TicketNotFound
        );
        Ok(round.ticket_sequence(ticket_index) as usize)
    }
}

pub fn assert_error<T: Debug>(result: Result<T>, expected: ErrorCode) {
    match result {
        Err(Error::AnchorError(err)) => {
            assert_eq!(err.error_code_number, u32::from(expected), "{}", err.error_name)
        }
        other => panic!("expected {:?}, got {:?}", expected, other),
    }
}
