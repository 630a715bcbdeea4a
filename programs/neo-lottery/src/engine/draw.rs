use anchor_lang::prelude::*;
use anchor_lang::solana_program::slot_hashes::MAX_ENTRIES;
use solana_program::hash::hashv;

use super::EntropySource;
use crate::constants::{BONUS_NUMBER_MAX, MAIN_NUMBER_MAX, MAIN_PICKS};
use crate::error::ErrorCode;
use crate::state::{NumberSet, Policy, Round, RoundStatus};

/// True once `round` can no longer be drawn at `height`. The window opens
/// when the round closes, so an open round never ages out.
pub fn window_elapsed(round: &Round, policy: &Policy, height: u64) -> bool {
    round.status == RoundStatus::Expired
        || round
            .closed_at
            .is_some_and(|closed| height.saturating_sub(closed) > policy.lookback_window)
}

/// Derives the winning numbers of `round` from the entropy source.
///
/// Reads nothing but the round and the source, writes nothing. The hash of
/// `closed_at + entropy_offset` seeds the draw, a slot no stake of the round
/// could have seen. When that slot was skipped the next produced slot below
/// the current height is used.
pub fn draw_winning_numbers<E: EntropySource>(
    round: &Round,
    policy: &Policy,
    entropy: &E,
) -> Result<NumberSet> {
    require!(round.winning_numbers.is_none(), ErrorCode::AlreadyDrawn);
    let closed_at = round.closed_at.ok_or(ErrorCode::EntropyUnavailable)?;

    let now = entropy.current_height();
    require!(
        !window_elapsed(round, policy, now),
        ErrorCode::DrawWindowExpired
    );

    let target = closed_at
        .checked_add(policy.entropy_offset)
        .ok_or(ErrorCode::MathOverflow)?;
    require!(target < now, ErrorCode::EntropyUnavailable);
    // past this the seeding hash has left the history
    require!(
        now - target <= MAX_ENTRIES as u64,
        ErrorCode::DrawWindowExpired
    );

    let seed = (target..now)
        .find_map(|height| entropy.hash_at(height))
        .ok_or(ErrorCode::EntropyUnavailable)?;

    Ok(derive_winning_numbers(&seed))
}

/// Samples five distinct mains and a bonus from `seed`.
///
/// Partial Fisher-Yates over `1..=40`; every step takes a fresh word from
/// `sha256(seed || step)`.
pub fn derive_winning_numbers(seed: &[u8; 32]) -> NumberSet {
    let mut pool: [u8; MAIN_NUMBER_MAX as usize] = core::array::from_fn(|i| i as u8 + 1);
    let mut main = [0u8; MAIN_PICKS];

    for (step, slot) in main.iter_mut().enumerate() {
        let remaining = (MAIN_NUMBER_MAX as usize - step) as u64;
        let pick = step + (draw_word(seed, step as u8) % remaining) as usize;
        pool.swap(step, pick);
        *slot = pool[step];
    }

    let bonus = (draw_word(seed, MAIN_PICKS as u8) % BONUS_NUMBER_MAX as u64) as u8 + 1;

    NumberSet::new(main, bonus)
}

fn draw_word(seed: &[u8; 32], step: u8) -> u64 {
    let digest = hashv(&[&seed[..], &[step][..]]).to_bytes();
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(word)
}
