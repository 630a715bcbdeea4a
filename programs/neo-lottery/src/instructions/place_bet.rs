use anchor_lang::prelude::*;
use anchor_spl::token_interface::{approve, Approve, Mint, TokenAccount, TokenInterface};

use super::shared::{emit_round_opening, persist_rounds, split_remaining, RoundSet, VaultGateway};
use crate::constants::{LOTTERY_SEED, MAIN_PICKS, ROUND_SEED, TICKET_SEED, VAULT_SEED};
use crate::events::NewBet;
use crate::state::{Lottery, NumberSet, Round, Ticket};

/// Accounts required for a player to let the lottery pull stakes.
#[derive(Accounts)]
pub struct ApproveStake<'info> {
    pub player: Signer<'info>,

    #[account(
        mut,
        token::mint = mint,
        token::authority = player,
    )]
    pub player_token_account: InterfaceAccount<'info, TokenAccount>,

    #[account(
        seeds = [LOTTERY_SEED],
        bump = lottery.bump,
        has_one = mint,
    )]
    pub lottery: Box<Account<'info, Lottery>>,

    pub mint: InterfaceAccount<'info, Mint>,

    pub token_program: Interface<'info, TokenInterface>,
}

/// Delegates `amount` of the player's tokens to the `Lottery` PDA.
/// Replaces any earlier allowance.
pub fn process_approve_stake(ctx: Context<ApproveStake>, amount: u64) -> Result<()> {
    approve(
        CpiContext::new(
            ctx.accounts.token_program.to_account_info(),
            Approve {
                to: ctx.accounts.player_token_account.to_account_info(),
                delegate: ctx.accounts.lottery.to_account_info(),
                authority: ctx.accounts.player.to_account_info(),
            },
        ),
        amount,
    )
}

/// Accounts required to stake on a ticket.
///
/// `next_round` must be passed exactly when the open round is at capacity:
/// the stake then opens it and lands there. Remaining accounts: rounds
/// paying deferred wins that fall due with that opening, and the token
/// accounts of their recipients.
#[derive(Accounts)]
pub struct PlaceBet<'info> {
    /// The player. Pays for the ticket and any new round.
    #[account(mut)]
    pub player: Signer<'info>,

    /// Source of the stake; the lottery must be its delegate.
    #[account(
        mut,
        token::mint = mint,
        token::authority = player,
    )]
    pub player_token_account: Box<InterfaceAccount<'info, TokenAccount>>,

    #[account(
        mut,
        seeds = [LOTTERY_SEED],
        bump = lottery.bump,
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
        payer = player,
        space = 8 + Round::INIT_SPACE,
        seeds = [ROUND_SEED, lottery.round_count.to_le_bytes().as_ref()],
        bump
    )]
    pub next_round: Option<Box<Account<'info, Round>>>,

    #[account(
        init,
        payer = player,
        space = 8 + Ticket::INIT_SPACE,
        seeds = [TICKET_SEED, lottery.ticket_count.to_le_bytes().as_ref()],
        bump
    )]
    pub ticket: Box<Account<'info, Ticket>>,

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

/// Stakes `stake` tokens on `main_numbers` plus `bonus_number` in the open
/// round.
///
/// # Arguments
/// * `ctx` - Context holding the PlaceBet accounts
/// * `stake` - Tokens pulled from the player's account
/// * `main_numbers` - Five distinct numbers in 1..=40
/// * `bonus_number` - One number in 1..=21
pub fn process_place_bet<'info>(
    ctx: Context<'_, '_, 'info, 'info, PlaceBet<'info>>,
    stake: u64,
    main_numbers: [u8; MAIN_PICKS],
    bonus_number: u8,
) -> Result<()> {
    let clock = Clock::get()?;
    let (mut loaded, holders) = split_remaining(ctx.remaining_accounts)?;
    let accounts = &mut *ctx.accounts;
    let player = accounts.player.key();
    let mut gateway = VaultGateway::for_lottery(
        &accounts.lottery,
        &accounts.vault,
        &accounts.mint,
        &accounts.token_program,
    )
    .with_holders(std::iter::once(accounts.player_token_account.to_account_info()).chain(holders));
    let slot = accounts.next_round.as_deref_mut().zip(ctx.bumps.next_round);
    let mut rounds = RoundSet::new()
        .with(&mut accounts.current_round)?
        .with_all(loaded.iter_mut())?
        .with_slot(slot);

    let numbers = NumberSet::new(main_numbers, bonus_number);
    let receipt = accounts
        .lottery
        .place_bet(&mut rounds, player, stake, numbers, clock.slot, &mut gateway)?;
    rounds.finish()?;
    persist_rounds(&loaded, ctx.program_id)?;

    let mut ticket = receipt.ticket;
    ticket.bump = ctx.bumps.ticket;
    accounts.ticket.set_inner(ticket);

    msg!(
        "Ticket {} in round {} for {}",
        receipt.ticket_index,
        receipt.round_index,
        player
    );
    if let Some(opening) = &receipt.opened {
        emit_round_opening(opening);
    }
    emit!(NewBet {
        round_index: receipt.round_index,
        ticket_index: receipt.ticket_index,
        player,
        stake,
        main_numbers,
        bonus_number,
    });
    Ok(())
}
