use anchor_lang::prelude::*;

/// Seed of the `Lottery` PDA. The PDA also signs for the escrow vault.
#[constant]
pub const LOTTERY_SEED: &[u8] = b"lottery";

/// Seed of the escrow token account holding stakes, funds and reserve.
#[constant]
pub const VAULT_SEED: &[u8] = b"vault";

/// Seed of a `Round` PDA, followed by the round index in little endian.
#[constant]
pub const ROUND_SEED: &[u8] = b"round";

/// Seed of a `Ticket` PDA, followed by the lottery-wide ticket sequence
/// number in little endian.
#[constant]
pub const TICKET_SEED: &[u8] = b"ticket";

/// Deferred wins the `Lottery` account holds at once.
pub const MAX_DEFERRED_WINS: usize = 16;

/// Number of main picks on a ticket and in a draw.
pub const MAIN_PICKS: usize = 5;

/// Main numbers are drawn from `1..=MAIN_NUMBER_MAX`.
pub const MAIN_NUMBER_MAX: u8 = 40;

/// The bonus number is drawn from `1..=BONUS_NUMBER_MAX`.
pub const BONUS_NUMBER_MAX: u8 = 21;

pub const BPS_DENOMINATOR: u64 = 10_000;

/// Tickets a round accepts before it is closed and the next one opened.
pub const DEFAULT_MAX_TICKETS_PER_ROUND: u32 = 100;

/// Slots after closing during which a round can still be drawn.
pub const DEFAULT_LOOKBACK_WINDOW: u64 = 256;

/// Offset from the closing slot of the slot whose hash seeds the draw.
pub const DEFAULT_ENTROPY_OFFSET: u64 = 0;

/// Share of a round's stakes that becomes its prize fund (80%).
pub const DEFAULT_PRIZE_FUND_BPS: u16 = 8_000;

/// Share of the reserve added to every drawn round's prize fund (1%).
pub const DEFAULT_RESERVE_ALLOCATION_BPS: u16 = 100;

/// Prizes at or above this share of the live fund are deferred (20%).
pub const DEFAULT_LARGE_WIN_THRESHOLD_BPS: u16 = 2_000;

/// Round openings a deferred prize waits before it is released.
pub const DEFAULT_DEFERRAL_ROUNDS: u64 = 2;

/// One whole token at 9 decimals. The jackpot multiplier is fund / unit stake.
pub const DEFAULT_UNIT_STAKE: u64 = 1_000_000_000;

/// Multipliers indexed by main matches, without and with the bonus match.
/// The five-plus-bonus cell is a placeholder: the jackpot is computed from
/// the live prize fund.
pub const MULTIPLIERS: [[u64; 2]; MAIN_PICKS + 1] = [
    [0, 0],
    [0, 0],
    [1, 20],
    [20, 200],
    [1_000, 30_000],
    [300_000, 0],
];
