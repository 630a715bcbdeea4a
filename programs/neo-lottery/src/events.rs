use anchor_lang::prelude::*;

use crate::constants::MAIN_PICKS;

#[event]
pub struct NewBet {
    pub round_index: u64,
    pub ticket_index: u32,
    pub player: Pubkey,
    pub stake: u64,
    pub main_numbers: [u8; MAIN_PICKS],
    pub bonus_number: u8,
}

#[event]
pub struct RoundOpened {
    pub round_index: u64,
    pub opened_at: u64,
}

/// The round stopped taking stakes. Its draw is seeded from the hash of
/// `closed_at` plus the policy's entropy offset.
#[event]
pub struct RoundClosed {
    pub round_index: u64,
    pub closed_at: u64,
}

#[event]
pub struct WinningNumbersSet {
    pub round_index: u64,
    pub main_numbers: [u8; MAIN_PICKS],
    pub bonus_number: u8,
    pub prize_fund: u64,
}

/// Emitted instead of `WinningNumbersSet` when the draw came too late.
#[event]
pub struct RoundExpired {
    pub round_index: u64,
}

#[event]
pub struct ReferenceAssigned {
    pub round_index: u64,
    pub reference_round: u64,
}

#[event]
pub struct PrizeClaimed {
    pub round_index: u64,
    pub ticket_index: u32,
    pub amount: u64,
    pub deferred: bool,
}

#[event]
pub struct DeferredPrizeReleased {
    pub resolving_round: u64,
    pub round_index: u64,
    pub ticket_index: u32,
    pub player: Pubkey,
    pub amount: u64,
}

#[event]
pub struct ReserveSeeded {
    pub amount: u64,
    pub reserve: u64,
}
