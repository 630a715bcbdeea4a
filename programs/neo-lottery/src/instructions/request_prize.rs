use anchor_lang::prelude::*;
use anchor_spl::token_interface::{Mint, TokenAccount, TokenInterface};

use super::shared::{persist_rounds, split_remaining, RoundSet, VaultGateway};
use crate::constants::{LOTTERY_SEED, ROUND_SEED, TICKET_SEED, VAULT_SEED};
use crate::error::ErrorCode;
use crate::events::PrizeClaimed;
use crate::state::{Lottery, Round, Ticket};

/// Accounts required to claim the prize of a ticket.
/// Anyone may submit the claim; the prize always goes to the ticket's player.
///
/// Remaining accounts: the resolving round when the ticket's round expired
/// and resolves against a later one.
#[derive(Accounts)]
#[instruction(round_index: u64, ticket_index: u32)]
pub struct RequestPrize<'info> {
    pub claimant: Signer<'info>,

    #[account(
        mut,
        seeds = [LOTTERY_SEED],
        bump = lottery.bump,
        has_one = mint,
    )]
    pub lottery: Box<Account<'info, Lottery>>,

    #[account(
        mut,
        seeds = [ROUND_SEED, round_index.to_le_bytes().as_ref()],
        bump = ticket_round.bump,
    )]
    pub ticket_round: Box<Account<'info, Round>>,

    #[account(
        mut,
        seeds = [TICKET_SEED, ticket_round.ticket_sequence(ticket_index).to_le_bytes().as_ref()],
        bump = ticket.bump,
        constraint = ticket.round_index == round_index @ ErrorCode::TicketNotFound,
        constraint = ticket.index == ticket_index @ ErrorCode::TicketNotFound,
    )]
    pub ticket: Box<Account<'info, Ticket>>,

    pub mint: Box<InterfaceAccount<'info, Mint>>,

    /// Token account of the ticket's player.
    #[account(mut, token::mint = mint)]
    pub player_token_account: Box<InterfaceAccount<'info, TokenAccount>>,

    #[account(
        mut,
        seeds = [VAULT_SEED],
        bump = lottery.vault_bump,
    )]
    pub vault: Box<InterfaceAccount<'info, TokenAccount>>,

    pub token_program: Interface<'info, TokenInterface>,
}

/// Pays the prize of ticket `ticket_index` in round `round_index`, or
/// queues it when it is a large win.
pub fn process_request_prize<'info>(
    ctx: Context<'_, '_, 'info, 'info, RequestPrize<'info>>,
    round_index: u64,
    ticket_index: u32,
) -> Result<()> {
    let (mut loaded, holders) = split_remaining(ctx.remaining_accounts)?;
    let accounts = &mut *ctx.accounts;
    let mut gateway = VaultGateway::for_lottery(
        &accounts.lottery,
        &accounts.vault,
        &accounts.mint,
        &accounts.token_program,
    )
    .with_holders(std::iter::once(accounts.player_token_account.to_account_info()).chain(holders));
    let mut rounds = RoundSet::new()
        .with(&mut accounts.ticket_round)?
        .with_all(loaded.iter_mut())?;

    let receipt = accounts
        .lottery
        .request_prize(&mut rounds, &mut accounts.ticket, &mut gateway)?;
    rounds.finish()?;
    persist_rounds(&loaded, ctx.program_id)?;

    if receipt.deferred {
        msg!(
            "Prize of {} for ticket {}/{} deferred",
            receipt.amount,
            round_index,
            ticket_index
        );
    } else {
        msg!(
            "Paid {} for ticket {}/{} from round {}",
            receipt.amount,
            round_index,
            ticket_index,
            receipt.resolving_round
        );
    }
    emit!(PrizeClaimed {
        round_index,
        ticket_index,
        amount: receipt.amount,
        deferred: receipt.deferred,
    });
    Ok(())
}

/// Remaining accounts: the resolving round, as for [`RequestPrize`].
#[derive(Accounts)]
#[instruction(round_index: u64, ticket_index: u32)]
pub struct GetMultiplier<'info> {
    #[account(seeds = [LOTTERY_SEED], bump = lottery.bump)]
    pub lottery: Box<Account<'info, Lottery>>,

    #[account(
        seeds = [ROUND_SEED, round_index.to_le_bytes().as_ref()],
        bump = ticket_round.bump,
    )]
    pub ticket_round: Box<Account<'info, Round>>,

    #[account(
        seeds = [TICKET_SEED, ticket_round.ticket_sequence(ticket_index).to_le_bytes().as_ref()],
        bump = ticket.bump,
        constraint = ticket.round_index == round_index @ ErrorCode::TicketNotFound,
        constraint = ticket.index == ticket_index @ ErrorCode::TicketNotFound,
    )]
    pub ticket: Box<Account<'info, Ticket>>,
}

/// Multiplier of a ticket against its resolving round, as return data.
pub fn process_get_multiplier<'info>(
    ctx: Context<'_, '_, 'info, 'info, GetMultiplier<'info>>,
    _round_index: u64,
    _ticket_index: u32,
) -> Result<u64> {
    let (mut loaded, _) = split_remaining(ctx.remaining_accounts)?;
    let accounts = &mut *ctx.accounts;
    let rounds = RoundSet::new()
        .with(&mut accounts.ticket_round)?
        .with_all(loaded.iter_mut())?;
    accounts.lottery.multiplier(&rounds, &accounts.ticket)
}
