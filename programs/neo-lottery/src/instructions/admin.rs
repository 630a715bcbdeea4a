use anchor_lang::prelude::*;
use anchor_spl::token_interface::{Mint, TokenAccount, TokenInterface};

use super::shared::{emit_round_opening, persist_rounds, split_remaining, transfer_tokens, RoundSet, VaultGateway};
use crate::constants::{LOTTERY_SEED, ROUND_SEED, VAULT_SEED};
use crate::error::ErrorCode;
use crate::events::{ReserveSeeded, RoundOpened};
use crate::state::{Lottery, Policy, Round};

/// Accounts required to initialize the lottery.
/// Creates the `Lottery` state account, round 0 and the escrow vault.
#[derive(Accounts)]
pub struct InitializeConfig<'info> {
    /// The operator. Pays for account creation and becomes the authority.
    #[account(mut)]
    pub payer: Signer<'info>,

    #[account(
        init,
        payer = payer,
        space = 8 + Lottery::INIT_SPACE,
        seeds = [LOTTERY_SEED],
        bump
    )]
    pub lottery: Box<Account<'info, Lottery>>,

    #[account(
        init,
        payer = payer,
        space = 8 + Round::INIT_SPACE,
        seeds = [ROUND_SEED, 0u64.to_le_bytes().as_ref()],
        bump
    )]
    pub first_round: Box<Account<'info, Round>>,

    /// Mint of the staked token.
    pub mint: Box<InterfaceAccount<'info, Mint>>,

    /// Escrow for stakes, prize funds and the reserve.
    #[account(
        init,
        payer = payer,
        seeds = [VAULT_SEED],
        bump,
        token::mint = mint,
        token::authority = lottery,
        token::token_program = token_program,
    )]
    pub vault: Box<InterfaceAccount<'info, TokenAccount>>,

    pub token_program: Interface<'info, TokenInterface>,

    pub system_program: Program<'info, System>,
}

/// Sets the policy and opens round 0 at the current slot.
///
/// # Arguments
/// * `ctx` - Context holding the InitializeConfig accounts
/// * `policy` - Round capacity, draw window, fund shares and deferral rules
pub fn process_initialize_config(ctx: Context<InitializeConfig>, policy: Policy) -> Result<()> {
    let clock = Clock::get()?;
    let lottery = Lottery::new(
        ctx.accounts.payer.key(),
        ctx.accounts.mint.key(),
        ctx.bumps.lottery,
        ctx.bumps.vault,
        policy,
    )?;
    ctx.accounts.lottery.set_inner(lottery);

    let mut first_round = Round::new(0, clock.slot, 0);
    first_round.bump = ctx.bumps.first_round;
    ctx.accounts.first_round.set_inner(first_round);

    msg!("Lottery initialized, round 0 opened at slot {}", clock.slot);
    emit!(RoundOpened {
        round_index: 0,
        opened_at: clock.slot,
    });
    Ok(())
}

/// Accounts required for the operator to fund the reserve.
#[derive(Accounts)]
pub struct SeedReserve<'info> {
    pub authority: Signer<'info>,

    #[account(
        mut,
        seeds = [LOTTERY_SEED],
        bump = lottery.bump,
        has_one = authority @ ErrorCode::NotAuthorized,
        has_one = mint,
    )]
    pub lottery: Box<Account<'info, Lottery>>,

    pub mint: Box<InterfaceAccount<'info, Mint>>,

    /// Operator token account the reserve is taken from.
    #[account(
        mut,
        token::mint = mint,
        token::authority = authority,
    )]
    pub authority_token_account: Box<InterfaceAccount<'info, TokenAccount>>,

    #[account(
        mut,
        seeds = [VAULT_SEED],
        bump = lottery.vault_bump,
    )]
    pub vault: Box<InterfaceAccount<'info, TokenAccount>>,

    pub token_program: Interface<'info, TokenInterface>,
}

pub fn process_seed_reserve(ctx: Context<SeedReserve>, amount: u64) -> Result<()> {
    transfer_tokens(
        &ctx.accounts.authority_token_account,
        &ctx.accounts.vault,
        amount,
        &ctx.accounts.mint,
        &ctx.accounts.authority,
        &ctx.accounts.token_program,
    )?;
    let reserve = ctx.accounts.lottery.credit_reserve(amount)?;

    msg!("Reserve seeded with {}, now {}", amount, reserve);
    emit!(ReserveSeeded { amount, reserve });
    Ok(())
}

/// Accounts required to close the open round ahead of capacity.
///
/// Remaining accounts: rounds paying deferred wins that fall due with the
/// round being opened, and the token accounts of their recipients.
#[derive(Accounts)]
pub struct CloseRound<'info> {
    /// The operator. Pays for the next round's account.
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
        seeds = [ROUND_SEED, lottery.current_round_index().to_le_bytes().as_ref()],
        bump = current_round.bump,
    )]
    pub current_round: Box<Account<'info, Round>>,

    #[account(
        init,
        payer = authority,
        space = 8 + Round::INIT_SPACE,
        seeds = [ROUND_SEED, lottery.round_count.to_le_bytes().as_ref()],
        bump
    )]
    pub next_round: Box<Account<'info, Round>>,

    pub mint: Box<InterfaceAccount<'info, Mint>>,

    #[account(
        mut,
        seeds = [VAULT_SEED],
        bump = lottery.vault_bump,
    )]
    pub vault: Box<InterfaceAccount<'info, TokenAccount>>,

    pub token_program: Interface<'info, TokenInterface>,

    pub system_program: Program<'info, System>,
}

pub fn process_close_round<'info>(ctx: Context<'_, '_, 'info, 'info, CloseRound<'info>>) -> Result<()> {
    let clock = Clock::get()?;
    let (mut loaded, holders) = split_remaining(ctx.remaining_accounts)?;
    let accounts = &mut *ctx.accounts;
    let mut gateway = VaultGateway::for_lottery(
        &accounts.lottery,
        &accounts.vault,
        &accounts.mint,
        &accounts.token_program,
    )
    .with_holders(holders);
    let mut rounds = RoundSet::new()
        .with(&mut accounts.current_round)?
        .with_all(loaded.iter_mut())?
        .with_slot(Some((&mut *accounts.next_round, ctx.bumps.next_round)));

    let opening = accounts
        .lottery
        .close_round(&mut rounds, clock.slot, &mut gateway)?;
    rounds.finish()?;
    persist_rounds(&loaded, ctx.program_id)?;

    emit_round_opening(&opening);
    Ok(())
}
