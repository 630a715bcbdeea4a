use anchor_lang::prelude::*;
use anchor_lang::solana_program::sysvar::slot_hashes;
use anchor_spl::token_interface::{Mint, TokenAccount, TokenInterface};

use super::shared::{emit_round_opening, persist_rounds, split_remaining, RoundSet, SlotEntropy, VaultGateway};
use crate::constants::{LOTTERY_SEED, ROUND_SEED, VAULT_SEED};
use crate::engine::DrawOutcome;
use crate::error::ErrorCode;
use crate::events::{ReferenceAssigned, RoundExpired, WinningNumbersSet};
use crate::state::{Lottery, Round};

/// Accounts required to draw a round.
///
/// `next_round` must be passed exactly when `round` is the open one.
/// Remaining accounts: every round from `lottery.unresolved_from` up to
/// `round`, rounds paying deferred wins that fall due when the next round
/// opens, and the token accounts of their recipients.
#[derive(Accounts)]
#[instruction(round_index: u64)]
pub struct DrawRound<'info> {
    #[account(mut)]
    pub authority: Signer<'info>,

    #[account(
        mut,
        seeds = [LOTTERY_SEED],
        bump = lottery.bump,
        has_one = authority @ ErrorCode::NotAuthorized,
        has_one = mint,
    )]
    pub lottery: Box<Account<'info, Lottery>>,

    #[account(
        mut,
        seeds = [ROUND_SEED, round_index.to_le_bytes().as_ref()],
        bump = round.bump,
    )]
    pub round: Box<Account<'info, Round>>,

    #[account(
        init,
        payer = authority,
        space = 8 + Round::INIT_SPACE,
        seeds = [ROUND_SEED, lottery.round_count.to_le_bytes().as_ref()],
        bump
    )]
    pub next_round: Option<Box<Account<'info, Round>>>,

    pub mint: Box<InterfaceAccount<'info, Mint>>,

    #[account(
        mut,
        seeds = [VAULT_SEED],
        bump = lottery.vault_bump,
    )]
    pub vault: Box<InterfaceAccount<'info, TokenAccount>>,

    /// CHECK: SlotHashes sysvar, parsed by hand since it is too large to deserialize
    #[account(address = slot_hashes::ID)]
    pub slot_hashes: UncheckedAccount<'info>,

    pub token_program: Interface<'info, TokenInterface>,

    pub system_program: Program<'info, System>,
}

/// Draws round `round_index` from the hash of its closing slot.
///
/// The open round is closed instead, and drawn by a later call once its
/// closing slot has a hash. A round past its lookback window is expired;
/// the instruction still succeeds so that the expiry is kept, and
/// `RoundExpired` is emitted in place of `WinningNumbersSet`.
pub fn process_draw_round<'info>(
    ctx: Context<'_, '_, 'info, 'info, DrawRound<'info>>,
    round_index: u64,
) -> Result<()> {
    let clock = Clock::get()?;
    let (mut loaded, holders) = split_remaining(ctx.remaining_accounts)?;
    let accounts = &mut *ctx.accounts;
    let slot_hashes = accounts.slot_hashes.to_account_info();
    let entropy = SlotEntropy::new(clock.slot, &slot_hashes);
    let mut gateway = VaultGateway::for_lottery(
        &accounts.lottery,
        &accounts.vault,
        &accounts.mint,
        &accounts.token_program,
    )
    .with_holders(holders);
    let slot = accounts.next_round.as_deref_mut().zip(ctx.bumps.next_round);
    let mut rounds = RoundSet::new()
        .with(&mut accounts.round)?
        .with_all(loaded.iter_mut())?
        .with_slot(slot);

    let outcome = accounts
        .lottery
        .request_draw(&mut rounds, round_index, &entropy, &mut gateway)?;
    rounds.finish()?;
    persist_rounds(&loaded, ctx.program_id)?;

    match outcome {
        DrawOutcome::Drawn {
            numbers,
            prize_fund,
            referenced,
            opened,
        } => {
            if let Some(opening) = &opened {
                emit_round_opening(opening);
            }
            msg!(
                "Round {} drawn: {:?} + {}, prize fund {}",
                round_index,
                numbers.main,
                numbers.bonus,
                prize_fund
            );
            emit!(WinningNumbersSet {
                round_index,
                main_numbers: numbers.main,
                bonus_number: numbers.bonus,
                prize_fund,
            });
            for expired in referenced {
                msg!("Round {} now resolves against round {}", expired, round_index);
                emit!(ReferenceAssigned {
                    round_index: expired,
                    reference_round: round_index,
                });
            }
        }
        DrawOutcome::Closed { opened } => {
            emit_round_opening(&opened);
            msg!("Round {} waits for the hash of its closing slot", round_index);
        }
        DrawOutcome::Expired => {
            msg!("Round {} expired before it was drawn", round_index);
            emit!(RoundExpired { round_index });
        }
    }
    Ok(())
}
