use anchor_lang::prelude::*;

use super::draw::{draw_winning_numbers, window_elapsed};
use super::{checked_add, BetReceipt, EntropySource, Movement, Release, RoundOpening, RoundStore, TokenGateway};
use crate::constants::BPS_DENOMINATOR;
use crate::error::ErrorCode;
use crate::state::{DeferredWin, Lottery, NumberSet, Policy, Round, RoundStatus, Ticket};

/// Result of a draw request that did not fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DrawOutcome {
    Drawn {
        numbers: NumberSet,
        prize_fund: u64,
        /// Expired rounds that now resolve against the drawn round.
        referenced: Vec<u64>,
        /// Set when the drawn round was the open one.
        opened: Option<RoundOpening>,
    },
    /// The round was open. It is now closed, and its seeding slot hash
    /// becomes available once `closed_at + entropy_offset` has passed.
    Closed { opened: RoundOpening },
    /// The lookback window had elapsed; the round is now `Expired`.
    Expired,
}

/// `bps` basis points of `amount`, rounded down.
pub fn bps_share(amount: u64, bps: u16) -> Result<u64> {
    let share = u128::from(amount) * u128::from(bps) / u128::from(BPS_DENOMINATOR);
    u64::try_from(share).map_err(|_| error!(ErrorCode::MathOverflow))
}

/// Closing the open round and opening the next, worked out before anything
/// is written.
struct Opening {
    closing: u64,
    round: Round,
    due: Vec<DeferredWin>,
}

impl Opening {
    fn payouts(&self) -> Vec<Movement> {
        self.due
            .iter()
            .map(|win| Movement::Push {
                owner: win.player,
                amount: win.amount,
            })
            .collect()
    }
}

/// Earlier rounds a draw takes over, with the fund and revenue parts of
/// their stakes.
#[derive(Default)]
struct Sweep {
    rounds: Vec<u64>,
    fund: u64,
    revenue: u64,
}

impl Lottery {
    /// A lottery with round 0 counted as open. The caller stores that round.
    pub fn new(authority: Pubkey, mint: Pubkey, bump: u8, vault_bump: u8, policy: Policy) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            bump,
            vault_bump,
            authority,
            mint,
            policy,
            reserve: 0,
            revenue: 0,
            round_count: 1,
            ticket_count: 0,
            unresolved_from: 0,
            deferred: Vec::new(),
        })
    }

    /// Stakes `stake` tokens of `player` on `numbers` in the open round.
    ///
    /// When the open round is already at capacity it is closed first and the
    /// stake lands in the round opened for it. Nothing is written unless the
    /// stake was pulled and every deferred win falling due was paid.
    pub fn place_bet<S: RoundStore, T: TokenGateway>(
        &mut self,
        rounds: &mut S,
        player: Pubkey,
        stake: u64,
        numbers: NumberSet,
        height: u64,
        token: &mut T,
    ) -> Result<BetReceipt> {
        require!(stake > 0, ErrorCode::InvalidStake);
        numbers.validate()?;

        let current = rounds.round(self.current_round_index())?;
        let opening = if current.ticket_count >= self.policy.max_tickets_per_round {
            Some(self.plan_opening(rounds, height)?)
        } else {
            None
        };
        let (round_index, ticket_index, total_stakes) = match &opening {
            Some(opening) => (opening.round.index, 0, stake),
            None => (
                current.index,
                current.ticket_count,
                checked_add(current.total_stakes, stake)?,
            ),
        };
        let sequence = self.ticket_count;
        let ticket_count = checked_add(sequence, 1)?;

        let mut movements = vec![Movement::Pull {
            owner: player,
            amount: stake,
        }];
        if let Some(opening) = &opening {
            movements.extend(opening.payouts());
        }
        token.settle(&movements)?;

        let opened = match opening {
            Some(opening) => Some(self.apply_opening(rounds, opening, height)?),
            None => None,
        };
        let round = rounds.round_mut(round_index)?;
        round.ticket_count = ticket_index + 1;
        round.total_stakes = total_stakes;
        self.ticket_count = ticket_count;

        Ok(BetReceipt {
            round_index,
            ticket_index,
            sequence,
            ticket: Ticket::new(round_index, ticket_index, player, stake, numbers),
            opened,
        })
    }

    /// Closes the open round ahead of capacity and opens the next one.
    pub fn close_round<S: RoundStore, T: TokenGateway>(
        &mut self,
        rounds: &mut S,
        height: u64,
        token: &mut T,
    ) -> Result<RoundOpening> {
        let current = rounds.round(self.current_round_index())?;
        require!(current.ticket_count > 0, ErrorCode::RoundEmpty);
        self.roll_over(rounds, height, token)
    }

    /// Draws round `index` from the entropy source.
    ///
    /// The open round is only closed: its seeding slot lies at or after the
    /// closing slot, so a later request draws it. A round past its lookback
    /// window is marked `Expired` and reported as such instead of failing, so
    /// that the transition persists.
    pub fn request_draw<S: RoundStore, E: EntropySource, T: TokenGateway>(
        &mut self,
        rounds: &mut S,
        index: u64,
        entropy: &E,
        token: &mut T,
    ) -> Result<DrawOutcome> {
        let height = entropy.current_height();
        let round = rounds.round(index)?;
        require!(round.winning_numbers.is_none(), ErrorCode::AlreadyDrawn);
        require!(round.ticket_count > 0, ErrorCode::RoundEmpty);

        if round.is_open() {
            let opened = self.roll_over(rounds, height, token)?;
            return Ok(DrawOutcome::Closed { opened });
        }

        if window_elapsed(round, &self.policy, height) {
            rounds.round_mut(index)?.status = RoundStatus::Expired;
            return Ok(DrawOutcome::Expired);
        }

        let numbers = draw_winning_numbers(round, &self.policy, entropy)?;
        self.record_draw(rounds, index, numbers, height, token)
    }

    /// Writes `numbers` as the winning numbers of round `index` and settles
    /// its prize fund. The only place winning numbers are ever written.
    ///
    /// Every earlier round from `unresolved_from` up to `index` must be in
    /// `rounds`: those that aged out undrawn now resolve against `index`.
    pub fn record_draw<S: RoundStore, T: TokenGateway>(
        &mut self,
        rounds: &mut S,
        index: u64,
        numbers: NumberSet,
        height: u64,
        token: &mut T,
    ) -> Result<DrawOutcome> {
        let round = rounds.round(index)?;
        require!(round.winning_numbers.is_none(), ErrorCode::AlreadyDrawn);
        require!(
            round.status != RoundStatus::Expired,
            ErrorCode::DrawWindowExpired
        );
        require!(round.ticket_count > 0, ErrorCode::RoundEmpty);
        numbers.validate()?;

        let opening = if round.is_open() {
            Some(self.plan_opening(rounds, height)?)
        } else {
            None
        };
        let reserve_share = bps_share(self.reserve, self.policy.reserve_allocation_bps)?;
        let (stake_fund, stake_revenue) = self.split_stakes(round.total_stakes)?;
        let sweep = self.plan_sweep(rounds, index, height)?;

        let prize_fund = checked_add(checked_add(stake_fund, reserve_share)?, sweep.fund)?;
        let revenue = checked_add(checked_add(self.revenue, stake_revenue)?, sweep.revenue)?;

        if let Some(opening) = &opening {
            token.settle(&opening.payouts())?;
        }

        let opened = match opening {
            Some(opening) => Some(self.apply_opening(rounds, opening, height)?),
            None => None,
        };
        for &earlier in &sweep.rounds {
            let round = rounds.round_mut(earlier)?;
            round.status = RoundStatus::Expired;
            round.reference_round = index;
        }
        let round = rounds.round_mut(index)?;
        round.winning_numbers = Some(numbers);
        round.status = RoundStatus::Drawn;
        round.prize_fund = prize_fund;
        self.revenue = revenue;
        self.reserve -= reserve_share;
        self.advance_unresolved(rounds);

        Ok(DrawOutcome::Drawn {
            numbers,
            prize_fund,
            referenced: sweep.rounds,
            opened,
        })
    }

    /// Round whose winning numbers and fund resolve tickets of `index`.
    pub fn resolving_round<S: RoundStore>(&self, rounds: &S, index: u64) -> Result<u64> {
        let mut current = index;
        // a sound chain never revisits a round
        for _ in 0..self.round_count {
            let round = rounds.round(current)?;
            match round.status {
                RoundStatus::Drawn => return Ok(current),
                RoundStatus::Expired if round.has_reference() => {
                    require!(
                        round.reference_round > current,
                        ErrorCode::ReferenceCycle
                    );
                    current = round.reference_round;
                }
                _ if current == index => return err!(ErrorCode::RoundNotDrawn),
                _ => return err!(ErrorCode::ReferenceCycle),
            }
        }
        err!(ErrorCode::ReferenceCycle)
    }

    pub fn credit_reserve(&mut self, amount: u64) -> Result<u64> {
        self.reserve = checked_add(self.reserve, amount)?;
        Ok(self.reserve)
    }

    fn roll_over<S: RoundStore, T: TokenGateway>(
        &mut self,
        rounds: &mut S,
        height: u64,
        token: &mut T,
    ) -> Result<RoundOpening> {
        let opening = self.plan_opening(rounds, height)?;
        token.settle(&opening.payouts())?;
        self.apply_opening(rounds, opening, height)
    }

    /// Checks that the open round can be closed at `height` and the next one
    /// stored, and collects the deferred wins that fall due with it.
    fn plan_opening<S: RoundStore>(&self, rounds: &S, height: u64) -> Result<Opening> {
        let closing = self.current_round_index();
        require!(rounds.round(closing)?.is_open(), ErrorCode::RoundNotFound);
        let index = self.round_count;
        rounds.can_insert(index)?;

        let due: Vec<DeferredWin> = self
            .deferred
            .iter()
            .filter(|win| win.payable_at <= index)
            .copied()
            .collect();
        for win in &due {
            let round = rounds.round(win.resolving_round)?;
            require!(
                round.pending_deferred >= win.amount && round.prize_fund >= win.amount,
                ErrorCode::MathOverflow
            );
        }

        Ok(Opening {
            closing,
            round: Round::new(index, height, self.ticket_count),
            due,
        })
    }

    /// Writes a planned opening. Its payouts must have been settled.
    fn apply_opening<S: RoundStore>(
        &mut self,
        rounds: &mut S,
        opening: Opening,
        height: u64,
    ) -> Result<RoundOpening> {
        let closing = rounds.round_mut(opening.closing)?;
        closing.status = RoundStatus::Full;
        closing.closed_at = Some(height);

        let round_index = opening.round.index;
        rounds.insert(opening.round)?;
        self.round_count = round_index + 1;
        self.deferred.retain(|win| win.payable_at > round_index);

        let mut released = Vec::with_capacity(opening.due.len());
        for win in opening.due {
            let round = rounds.round_mut(win.resolving_round)?;
            round.prize_fund -= win.amount;
            round.pending_deferred -= win.amount;
            released.push(Release {
                resolving_round: win.resolving_round,
                ticket_round: win.ticket_round,
                ticket_index: win.ticket_index,
                player: win.player,
                amount: win.amount,
            });
        }
        msg!("Round {} opened at slot {}", round_index, height);

        Ok(RoundOpening {
            round_index,
            opened_at: height,
            released,
        })
    }

    /// Fund and revenue parts of `stakes`.
    fn split_stakes(&self, stakes: u64) -> Result<(u64, u64)> {
        let fund = bps_share(stakes, self.policy.prize_fund_bps)?;
        Ok((fund, stakes - fund))
    }

    /// Earlier rounds that aged out undrawn and have no reference yet. They
    /// resolve against `index`, which is being drawn.
    fn plan_sweep<S: RoundStore>(&self, rounds: &S, index: u64, height: u64) -> Result<Sweep> {
        let mut sweep = Sweep::default();
        for earlier in self.unresolved_from..index {
            let round = rounds.round(earlier)?;
            let aged_out = match round.status {
                RoundStatus::Expired => true,
                RoundStatus::Full => window_elapsed(round, &self.policy, height),
                RoundStatus::Open | RoundStatus::Drawn => false,
            };
            if !aged_out || round.has_reference() {
                continue;
            }

            let (fund, revenue) = self.split_stakes(round.total_stakes)?;
            sweep.fund = checked_add(sweep.fund, fund)?;
            sweep.revenue = checked_add(sweep.revenue, revenue)?;
            sweep.rounds.push(earlier);
        }
        Ok(sweep)
    }

    fn advance_unresolved<S: RoundStore>(&mut self, rounds: &S) {
        while self.unresolved_from < self.round_count {
            let Ok(round) = rounds.round(self.unresolved_from) else {
                break;
            };
            let settled = round.status == RoundStatus::Drawn
                || (round.status == RoundStatus::Expired && round.has_reference());
            if !settled {
                break;
            }
            self.unresolved_from += 1;
        }
    }
}
