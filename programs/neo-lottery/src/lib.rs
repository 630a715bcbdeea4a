#![allow(unexpected_cfgs)]

use anchor_lang::prelude::*;

/// Program-wide seeds, number ranges and policy defaults.
pub mod constants;

/// Round engine shared by the instructions and host tests.
pub mod engine;

/// Custom error types returned through Anchor when an instruction fails.
pub mod error;

/// Events emitted as rounds open, close, draw and pay out.
pub mod events;

/// Instruction accounts and handlers.
pub mod instructions;

/// On-chain state: the `Lottery` account, its rounds, tickets and policy.
pub mod state;

pub use instructions::*;
use state::Policy;

declare_id!("9vDJfRENxtPAQgh4Ex2sGGiXQURx3sAJ3yF5gY6wU6Fa");

#[program]
pub mod neo_lottery {
    use super::*;

    pub fn initialize_config(ctx: Context<InitializeConfig>, policy: Policy) -> Result<()> {
        process_initialize_config(ctx, policy)
    }

    pub fn seed_reserve(ctx: Context<SeedReserve>, amount: u64) -> Result<()> {
        process_seed_reserve(ctx, amount)
    }

    pub fn approve_stake(ctx: Context<ApproveStake>, amount: u64) -> Result<()> {
        process_approve_stake(ctx, amount)
    }

    pub fn place_bet<'info>(
        ctx: Context<'_, '_, 'info, 'info, PlaceBet<'info>>,
        stake: u64,
        main_numbers: [u8; 5],
        bonus_number: u8,
    ) -> Result<()> {
        process_place_bet(ctx, stake, main_numbers, bonus_number)
    }

    pub fn close_round<'info>(ctx: Context<'_, '_, 'info, 'info, CloseRound<'info>>) -> Result<()> {
        process_close_round(ctx)
    }

    pub fn draw_round<'info>(
        ctx: Context<'_, '_, 'info, 'info, DrawRound<'info>>,
        round_index: u64,
    ) -> Result<()> {
        process_draw_round(ctx, round_index)
    }

    pub fn request_prize<'info>(
        ctx: Context<'_, '_, 'info, 'info, RequestPrize<'info>>,
        round_index: u64,
        ticket_index: u32,
    ) -> Result<()> {
        process_request_prize(ctx, round_index, ticket_index)
    }

    pub fn get_multiplier<'info>(
        ctx: Context<'_, '_, 'info, 'info, GetMultiplier<'info>>,
        round_index: u64,
        ticket_index: u32,
    ) -> Result<u64> {
        process_get_multiplier(ctx, round_index, ticket_index)
    }
}
