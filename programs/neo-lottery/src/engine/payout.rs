use anchor_lang::prelude::*;

use super::{ClaimReceipt, Movement, RoundStore, TokenGateway};
use crate::constants::{BPS_DENOMINATOR, MAIN_PICKS, MAX_DEFERRED_WINS, MULTIPLIERS};
use crate::error::ErrorCode;
use crate::state::{DeferredWin, Lottery, NumberSet, Ticket};

/// Payout factor of `picks` against `winning`.
///
/// Five mains plus the bonus is the jackpot: the live fund expressed in
/// whole stake units, so that a unit stake takes the entire fund.
pub fn multiplier_for(picks: &NumberSet, winning: &NumberSet, prize_fund: u64, unit_stake: u64) -> u64 {
    let matches = picks.main_matches(winning);
    let bonus = picks.bonus == winning.bonus;
    if matches == MAIN_PICKS && bonus {
        return prize_fund.checked_div(unit_stake).unwrap_or(0);
    }
    MULTIPLIERS[matches][usize::from(bonus)]
}

/// True when `prize` is at least `threshold_bps` of `prize_fund`.
pub fn is_large_win(prize: u64, prize_fund: u64, threshold_bps: u16) -> bool {
    u128::from(prize) * u128::from(BPS_DENOMINATOR)
        >= u128::from(prize_fund) * u128::from(threshold_bps)
}

impl Lottery {
    /// Multiplier `ticket` earns against its resolving round.
    pub fn multiplier<S: RoundStore>(&self, rounds: &S, ticket: &Ticket) -> Result<u64> {
        let resolving = rounds.round(self.resolving_round(rounds, ticket.round_index)?)?;
        let winning = resolving.winning_numbers.ok_or(ErrorCode::RoundNotDrawn)?;
        Ok(multiplier_for(
            &ticket.numbers,
            &winning,
            resolving.prize_fund,
            self.policy.unit_stake,
        ))
    }

    /// Pays or defers the prize of `ticket`.
    ///
    /// The prize is capped by what the resolving fund has not yet promised.
    /// Large wins are queued until `deferral_rounds` more rounds have been
    /// opened; the fund only shrinks when they are released.
    pub fn request_prize<S: RoundStore, T: TokenGateway>(
        &mut self,
        rounds: &mut S,
        ticket: &mut Ticket,
        token: &mut T,
    ) -> Result<ClaimReceipt> {
        require!(!ticket.claimed, ErrorCode::AlreadyClaimed);

        let resolving_round = self.resolving_round(rounds, ticket.round_index)?;
        let multiplier = self.multiplier(rounds, ticket)?;
        let round = rounds.round(resolving_round)?;
        let prize = multiplier
            .checked_mul(ticket.stake)
            .ok_or(ErrorCode::MathOverflow)?
            .min(round.available_fund());
        require!(prize > 0, ErrorCode::NoPrize);

        let deferred = is_large_win(prize, round.prize_fund, self.policy.large_win_threshold_bps);
        if deferred {
            require!(
                self.deferred.len() < MAX_DEFERRED_WINS,
                ErrorCode::DeferredQueueFull
            );
            let payable_at = self
                .current_round_index()
                .checked_add(self.policy.deferral_rounds)
                .ok_or(ErrorCode::MathOverflow)?;
            self.deferred.push(DeferredWin {
                resolving_round,
                ticket_round: ticket.round_index,
                ticket_index: ticket.index,
                player: ticket.player,
                amount: prize,
                payable_at,
            });
            rounds.round_mut(resolving_round)?.pending_deferred += prize;
            msg!("Prize of {} deferred until round {}", prize, payable_at);
        } else {
            token.settle(&[Movement::Push {
                owner: ticket.player,
                amount: prize,
            }])?;
            rounds.round_mut(resolving_round)?.prize_fund -= prize;
        }

        ticket.claimed = true;

        Ok(ClaimReceipt {
            resolving_round,
            amount: prize,
            deferred,
        })
    }

    /// Deferred wins waiting on the fund of round `index`.
    pub fn deferred_queue_len(&self, index: u64) -> usize {
        self.deferred
            .iter()
            .filter(|win| win.resolving_round == index)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{assert_error, Table};
    use crate::engine::TokenGateway;
    use crate::state::Policy;

    const WINNING: NumberSet = NumberSet {
        main: [1, 2, 3, 4, 5],
        bonus: 6,
    };

    #[test]
    fn multiplier_table_is_total() {
        let mains: [[u8; 5]; 6] = [
            [20, 21, 22, 23, 24],
            [1, 20, 21, 22, 23],
            [1, 2, 20, 21, 22],
            [1, 2, 3, 21, 22],
            [1, 2, 3, 4, 22],
            [1, 2, 3, 4, 5],
        ];
        let expected = [
            [0, 0],
            [0, 0],
            [1, 20],
            [20, 200],
            [1_000, 30_000],
            [300_000, 7],
        ];
        for (m, main) in mains.iter().enumerate() {
            for (b, bonus) in [1u8, 6].into_iter().enumerate() {
                let picks = NumberSet::new(*main, bonus);
                assert_eq!(
                    multiplier_for(&picks, &WINNING, 7_500, 1_000),
                    expected[m][b],
                    "m={} b={}",
                    m,
                    b
                );
            }
        }
    }

    #[test]
    fn match_count_ignores_order() {
        let picks = NumberSet::new([5, 4, 3, 2, 1], 6);
        assert_eq!(picks.main_matches(&WINNING), 5);
        assert_eq!(multiplier_for(&picks, &WINNING, 3_000, 1_000), 3);
    }

    #[test]
    fn large_win_threshold_is_inclusive() {
        assert!(is_large_win(200, 1_000, 2_000));
        assert!(!is_large_win(199, 1_000, 2_000));
        assert!(is_large_win(1, 0, 2_000));
    }

    /// One round holding `tickets`, drawn with [1,2,3,4,5]+6 and a fund of
    /// `fund`, with round 1 open.
    fn drawn(tickets: &[(u64, NumberSet)], fund: u64) -> (Table, Pubkey) {
        let mut table = Table::new(
            Policy {
                max_tickets_per_round: 100,
                prize_fund_bps: 10_000,
                unit_stake: 100,
                ..Policy::default()
            },
            0,
        );
        let player = table.player(1_000_000);
        for (stake, numbers) in tickets {
            table.bet(player, *stake, *numbers, 1).unwrap();
        }
        table.record(0, WINNING, 2).unwrap();
        // top the fund up to the requested size
        let round = table.round_mut(0);
        let extra = fund - round.prize_fund;
        round.prize_fund = fund;
        let escrow = table.token.escrow;
        table.token.mint(escrow, extra);
        (table, player)
    }

    #[test]
    fn small_win_is_paid_at_once() {
        let two_mains = NumberSet::new([1, 2, 20, 21, 22], 6);
        let (mut table, player) = drawn(&[(100, two_mains)], 20_000);
        let before = table.token.balance_of(&player);

        let receipt = table.claim(0, 0).unwrap();
        assert_eq!(
            receipt,
            ClaimReceipt {
                resolving_round: 0,
                amount: 2_000,
                deferred: false
            }
        );
        assert_eq!(table.token.balance_of(&player), before + 2_000);
        assert_eq!(table.round(0).prize_fund, 18_000);
        assert!(table.ticket(0, 0).unwrap().claimed);
    }

    #[test]
    fn large_win_is_deferred_without_touching_the_fund() {
        let three_mains = NumberSet::new([1, 2, 3, 21, 22], 6);
        let (mut table, player) = drawn(&[(100, three_mains)], 50_000);
        let before = table.token.balance_of(&player);

        let receipt = table.claim(0, 0).unwrap();
        assert!(receipt.deferred);
        assert_eq!(receipt.amount, 20_000);
        assert_eq!(table.token.balance_of(&player), before);

        let round = table.round(0);
        assert_eq!(round.prize_fund, 50_000);
        assert_eq!(round.pending_deferred, 20_000);
        assert_eq!(table.lottery.deferred_queue_len(0), 1);
        assert_eq!(table.lottery.deferred[0].payable_at, 3);
    }

    #[test]
    fn full_deferred_queue_refuses_large_wins() {
        let three_mains = NumberSet::new([1, 2, 3, 21, 22], 6);
        let (mut table, _) = drawn(&[(100, three_mains)], 50_000);
        let parked = DeferredWin {
            resolving_round: 0,
            ticket_round: 0,
            ticket_index: 0,
            player: Pubkey::new_unique(),
            amount: 0,
            payable_at: u64::MAX,
        };
        table.lottery.deferred = vec![parked; MAX_DEFERRED_WINS];

        assert_error(table.claim(0, 0), ErrorCode::DeferredQueueFull);
        assert!(!table.ticket(0, 0).unwrap().claimed);
        assert_eq!(table.round(0).pending_deferred, 0);
        assert_eq!(table.lottery.deferred.len(), MAX_DEFERRED_WINS);
    }

    #[test]
    fn prizes_are_capped_by_the_unpromised_fund() {
        let four_mains = NumberSet::new([1, 2, 3, 4, 22], 6);
        let tickets = [(100, four_mains), (100, four_mains)];
        let (mut table, _) = drawn(&tickets, 5_000);

        assert_eq!(table.claim(0, 0).unwrap().amount, 5_000);
        assert_error(table.claim(0, 1), ErrorCode::NoPrize);
        assert!(!table.ticket(0, 1).unwrap().claimed);

        let round = table.round(0);
        assert!(round.pending_deferred <= round.prize_fund);
    }

    #[test]
    fn jackpot_takes_the_fund_in_stake_units() {
        let (mut table, _) = drawn(&[(100, WINNING)], 12_345);
        assert_eq!(table.multiplier(0, 0).unwrap(), 123);

        let receipt = table.claim(0, 0).unwrap();
        assert!(receipt.deferred);
        assert_eq!(receipt.amount, 12_300);
    }

    #[test]
    fn losing_ticket_has_nothing_to_claim() {
        let loser = NumberSet::new([20, 21, 22, 23, 24], 6);
        let (mut table, _) = drawn(&[(100, loser)], 10_000);
        assert_eq!(table.multiplier(0, 0).unwrap(), 0);
        assert_error(table.claim(0, 0), ErrorCode::NoPrize);
    }

    #[test]
    fn second_claim_changes_nothing() {
        let two_mains = NumberSet::new([1, 2, 20, 21, 22], 1);
        let (mut table, player) = drawn(&[(100, two_mains)], 10_000);
        table.claim(0, 0).unwrap();
        let balance = table.token.balance_of(&player);
        let fund = table.round(0).prize_fund;

        assert_error(table.claim(0, 0), ErrorCode::AlreadyClaimed);
        assert_eq!(table.token.balance_of(&player), balance);
        assert_eq!(table.round(0).prize_fund, fund);
    }

    #[test]
    fn undrawn_round_cannot_be_claimed() {
        let mut table = Table::new(Policy::default(), 0);
        let player = table.player(10);
        table.bet(player, 10, WINNING, 1).unwrap();
        assert_error(table.claim(0, 0), ErrorCode::RoundNotDrawn);
        assert_error(table.claim(0, 1), ErrorCode::TicketNotFound);
    }

    #[test]
    fn deferred_win_is_paid_when_its_round_opens() {
        let three_mains = NumberSet::new([1, 2, 3, 21, 22], 6);
        let (mut table, player) = drawn(&[(100, three_mains)], 50_000);
        table.claim(0, 0).unwrap();
        let before = table.token.balance_of(&player);

        table.bet(player, 100, WINNING, 3).unwrap();
        let opened = table.close(3).unwrap();
        assert_eq!(opened.round_index, 2);
        assert!(opened.released.is_empty());
        assert_eq!(table.lottery.deferred_queue_len(0), 1);

        table.bet(player, 100, WINNING, 4).unwrap();
        let opened = table.close(4).unwrap();
        assert_eq!(opened.round_index, 3);
        assert_eq!(opened.released.len(), 1);
        assert_eq!(opened.released[0].amount, 20_000);
        assert_eq!(opened.released[0].player, player);
        assert_eq!(table.token.balance_of(&player), before - 200 + 20_000);
        let round = table.round(0);
        assert_eq!(round.prize_fund, 30_000);
        assert_eq!(round.pending_deferred, 0);
        assert_eq!(table.lottery.deferred_queue_len(0), 0);
    }
}
