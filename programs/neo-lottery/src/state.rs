use anchor_lang::prelude::*;
use anchor_lang::solana_program::slot_hashes::MAX_ENTRIES;

use crate::constants::*;
use crate::error::ErrorCode;

/// Tunable policy of a lottery, fixed at initialization.
#[derive(AnchorSerialize, AnchorDeserialize, InitSpace, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Policy {
    /// Tickets a round accepts before the next round is opened.
    pub max_tickets_per_round: u32,

    /// Slots after a round closed during which it can still be drawn.
    pub lookback_window: u64,

    /// Offset from the closing slot of the slot hash seeding the draw.
    pub entropy_offset: u64,

    /// Share of round stakes moved into the round's prize fund, in bps.
    pub prize_fund_bps: u16,

    /// Share of the reserve added to each drawn round's fund, in bps.
    pub reserve_allocation_bps: u16,

    /// Prizes at or above this share of the live fund are deferred, in bps.
    pub large_win_threshold_bps: u16,

    /// Round openings a deferred prize waits for.
    pub deferral_rounds: u64,

    /// Stake unit used to turn the jackpot fund into a multiplier.
    pub unit_stake: u64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_tickets_per_round: DEFAULT_MAX_TICKETS_PER_ROUND,
            lookback_window: DEFAULT_LOOKBACK_WINDOW,
            entropy_offset: DEFAULT_ENTROPY_OFFSET,
            prize_fund_bps: DEFAULT_PRIZE_FUND_BPS,
            reserve_allocation_bps: DEFAULT_RESERVE_ALLOCATION_BPS,
            large_win_threshold_bps: DEFAULT_LARGE_WIN_THRESHOLD_BPS,
            deferral_rounds: DEFAULT_DEFERRAL_ROUNDS,
            unit_stake: DEFAULT_UNIT_STAKE,
        }
    }
}

impl Policy {
    pub fn validate(&self) -> Result<()> {
        let bps = BPS_DENOMINATOR as u16;
        require!(self.max_tickets_per_round > 0, ErrorCode::InvalidPolicy);
        require!(self.lookback_window > 0, ErrorCode::InvalidPolicy);
        // the seeding slot must be reachable before the window closes
        require!(
            self.entropy_offset < self.lookback_window,
            ErrorCode::InvalidPolicy
        );
        // and still be in the SlotHashes history when the window closes
        require!(
            self.lookback_window
                .checked_add(self.entropy_offset)
                .is_some_and(|span| span <= MAX_ENTRIES as u64),
            ErrorCode::InvalidPolicy
        );
        require!(self.prize_fund_bps <= bps, ErrorCode::InvalidPolicy);
        require!(self.reserve_allocation_bps <= bps, ErrorCode::InvalidPolicy);
        require!(
            self.large_win_threshold_bps > 0 && self.large_win_threshold_bps <= bps,
            ErrorCode::InvalidPolicy
        );
        require!(self.deferral_rounds > 0, ErrorCode::InvalidPolicy);
        require!(self.unit_stake > 0, ErrorCode::InvalidPolicy);
        Ok(())
    }
}

/// Five main numbers plus a bonus number, used for picks and for draws.
#[derive(AnchorSerialize, AnchorDeserialize, InitSpace, Clone, Copy, Debug, PartialEq, Eq)]
pub struct NumberSet {
    pub main: [u8; 5],
    pub bonus: u8,
}

impl NumberSet {
    pub fn new(main: [u8; MAIN_PICKS], bonus: u8) -> Self {
        Self { main, bonus }
    }

    pub fn validate(&self) -> Result<()> {
        for (i, number) in self.main.iter().enumerate() {
            require!(
                (1..=MAIN_NUMBER_MAX).contains(number),
                ErrorCode::InvalidStake
            );
            require!(!self.main[..i].contains(number), ErrorCode::InvalidStake);
        }
        require!(
            (1..=BONUS_NUMBER_MAX).contains(&self.bonus),
            ErrorCode::InvalidStake
        );
        Ok(())
    }

    /// Main numbers of `self` that also appear in `other`.
    pub fn main_matches(&self, other: &NumberSet) -> usize {
        self.main
            .iter()
            .filter(|number| other.main.contains(number))
            .count()
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, InitSpace, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundStatus {
    /// Accepting stakes. Only the last round is ever open.
    Open,
    /// Closed to stakes, waiting for its draw.
    Full,
    /// Winning numbers written.
    Drawn,
    /// Aged out of the lookback window without a draw.
    Expired,
}

/// A round of the lottery. PDA seeded by `ROUND_SEED` and `index`.
#[account]
#[derive(InitSpace, Debug, PartialEq, Eq)]
pub struct Round {
    pub bump: u8,

    /// Dense position among all rounds, starting at 0.
    pub index: u64,

    /// Slot at which the round was opened.
    pub opened_at: u64,

    /// Slot at which the round stopped accepting stakes. The draw is seeded
    /// from here and the lookback window counts from here.
    pub closed_at: Option<u64>,

    pub status: RoundStatus,

    /// Lottery-wide sequence number of ticket 0. Tickets of a round are
    /// contiguous in the sequence.
    pub first_ticket: u64,

    pub ticket_count: u32,

    /// Sum of all stakes escrowed for this round.
    pub total_stakes: u64,

    /// Written exactly once by a successful draw.
    pub winning_numbers: Option<NumberSet>,

    /// Tokens still available to pay prizes resolved against this round.
    pub prize_fund: u64,

    /// Part of `prize_fund` promised to deferred wins not yet released.
    pub pending_deferred: u64,

    /// Round whose numbers resolve this round's tickets. Self until the
    /// round expires and a later round is drawn.
    pub reference_round: u64,
}

impl Round {
    pub fn new(index: u64, opened_at: u64, first_ticket: u64) -> Self {
        Self {
            bump: 0,
            index,
            opened_at,
            closed_at: None,
            status: RoundStatus::Open,
            first_ticket,
            ticket_count: 0,
            total_stakes: 0,
            winning_numbers: None,
            prize_fund: 0,
            pending_deferred: 0,
            reference_round: index,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == RoundStatus::Open
    }

    /// Fund not yet promised to deferred wins.
    pub fn available_fund(&self) -> u64 {
        self.prize_fund.saturating_sub(self.pending_deferred)
    }

    pub fn has_reference(&self) -> bool {
        self.reference_round != self.index
    }

    /// Sequence number of ticket `ticket_index` of this round.
    pub fn ticket_sequence(&self, ticket_index: u32) -> u64 {
        self.first_ticket.saturating_add(u64::from(ticket_index))
    }
}

/// A staked ticket. PDA seeded by `TICKET_SEED` and its sequence number.
#[account]
#[derive(InitSpace, Debug, PartialEq, Eq)]
pub struct Ticket {
    pub bump: u8,

    pub round_index: u64,

    /// Position within the round, in submission order.
    pub index: u32,

    /// Wallet that staked and receives any prize.
    pub player: Pubkey,

    /// Tokens pulled into escrow for this ticket.
    pub stake: u64,

    pub numbers: NumberSet,

    /// Set once a prize was paid out or deferred.
    pub claimed: bool,
}

impl Ticket {
    pub fn new(round_index: u64, index: u32, player: Pubkey, stake: u64, numbers: NumberSet) -> Self {
        Self {
            bump: 0,
            round_index,
            index,
            player,
            stake,
            numbers,
            claimed: false,
        }
    }
}

/// A large win withheld until round `payable_at` opens.
#[derive(AnchorSerialize, AnchorDeserialize, InitSpace, Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeferredWin {
    /// Round whose fund pays the prize.
    pub resolving_round: u64,
    /// Round holding the ticket; differs from `resolving_round` when expired.
    pub ticket_round: u64,
    pub ticket_index: u32,
    pub player: Pubkey,
    pub amount: u64,
    pub payable_at: u64,
}

/// Lottery configuration and counters. Rounds and tickets live in their own
/// accounts, so this one never grows.
#[account]
#[derive(InitSpace)]
pub struct Lottery {
    /// The bump seed used for deriving the PDA address of this account.
    pub bump: u8,

    /// Bump of the escrow vault token account.
    pub vault_bump: u8,

    /// Operator allowed to seed the reserve, close rounds and draw.
    pub authority: Pubkey,

    /// Mint of the staked token.
    pub mint: Pubkey,

    pub policy: Policy,

    /// Operator-seeded tokens not yet allocated to a round.
    pub reserve: u64,

    /// Stake share kept by the protocol.
    pub revenue: u64,

    /// Rounds opened so far. The open round is always the last one.
    pub round_count: u64,

    /// Tickets sold so far over all rounds.
    pub ticket_count: u64,

    /// Lowest round index that may still need a reference assigned.
    pub unresolved_from: u64,

    /// Deferred wins in creation order.
    #[max_len(MAX_DEFERRED_WINS)]
    pub deferred: Vec<DeferredWin>,
}

impl Lottery {
    /// Index of the open round.
    pub fn current_round_index(&self) -> u64 {
        self.round_count.saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_window(lookback_window: u64, entropy_offset: u64) -> Policy {
        Policy {
            lookback_window,
            entropy_offset,
            ..Policy::default()
        }
    }

    #[test]
    fn window_and_offset_stay_inside_the_slot_hash_history() {
        assert!(Policy::default().validate().is_ok());
        assert!(with_window(512, 0).validate().is_ok());
        assert!(with_window(500, 12).validate().is_ok());
        assert!(with_window(500, 13).validate().is_err());
        assert!(with_window(513, 0).validate().is_err());
        assert!(with_window(u64::MAX, 1).validate().is_err());
        assert!(with_window(10, 10).validate().is_err());
    }

    #[test]
    fn lottery_with_a_full_deferred_queue_fits_its_account() {
        let win = DeferredWin {
            resolving_round: u64::MAX,
            ticket_round: u64::MAX,
            ticket_index: u32::MAX,
            player: Pubkey::new_unique(),
            amount: u64::MAX,
            payable_at: u64::MAX,
        };
        let lottery = Lottery {
            bump: 255,
            vault_bump: 254,
            authority: Pubkey::new_unique(),
            mint: Pubkey::new_unique(),
            policy: Policy::default(),
            reserve: u64::MAX,
            revenue: u64::MAX,
            round_count: u64::MAX,
            ticket_count: u64::MAX,
            unresolved_from: u64::MAX,
            deferred: vec![win; MAX_DEFERRED_WINS],
        };
        assert_eq!(lottery.try_to_vec().unwrap().len(), Lottery::INIT_SPACE);
    }

    #[test]
    fn settled_round_and_ticket_fit_their_accounts() {
        let numbers = NumberSet::new([1, 2, 3, 4, 5], 6);
        let mut round = Round::new(7, 100, 40);
        round.closed_at = Some(120);
        round.status = RoundStatus::Drawn;
        round.winning_numbers = Some(numbers);
        round.prize_fund = u64::MAX;
        assert_eq!(round.try_to_vec().unwrap().len(), Round::INIT_SPACE);

        let ticket = Ticket::new(7, 3, Pubkey::new_unique(), u64::MAX, numbers);
        assert_eq!(ticket.try_to_vec().unwrap().len(), Ticket::INIT_SPACE);
    }

    #[test]
    fn round_tickets_follow_its_first_sequence_number() {
        let round = Round::new(2, 0, 40);
        assert_eq!(round.ticket_sequence(0), 40);
        assert_eq!(round.ticket_sequence(9), 49);
        assert_eq!(round.reference_round, 2);
        assert!(!round.has_reference());
    }
}
