use anchor_lang::prelude::*;

#[error_code]
pub enum ErrorCode {
    #[msg("Stake must be positive with five distinct mains in 1..=40 and a bonus in 1..=21")]
    InvalidStake,
    #[msg("Stake could not be pulled: allowance or balance too low")]
    InsufficientAllowance,
    #[msg("Round is past its draw lookback window")]
    DrawWindowExpired,
    #[msg("Round already has winning numbers")]
    AlreadyDrawn,
    #[msg("Ticket already claimed")]
    AlreadyClaimed,
    #[msg("Round has no winning numbers to resolve against yet")]
    RoundNotDrawn,
    #[msg("Reference round chain is broken")]
    ReferenceCycle,
    #[msg("Round not found")]
    RoundNotFound,
    #[msg("Ticket not found")]
    TicketNotFound,
    #[msg("No slot hash available for the draw")]
    EntropyUnavailable,
    #[msg("Ticket wins nothing")]
    NoPrize,
    #[msg("Round holds no tickets")]
    RoundEmpty,
    #[msg("Not authorized")]
    NotAuthorized,
    #[msg("Invalid lottery policy")]
    InvalidPolicy,
    #[msg("Arithmetic overflow")]
    MathOverflow,
    #[msg("Token account for the recipient was not provided")]
    RecipientNotProvided,
    #[msg("Escrow balance too low for the transfer")]
    EscrowShortfall,
    #[msg("Deferred win queue is full")]
    DeferredQueueFull,
    #[msg("Account for the next round was not provided")]
    RoundAccountMissing,
    #[msg("Account for the next round was provided but no round opened")]
    UnexpectedRoundAccount,
    #[msg("Round account passed more than once")]
    DuplicateRound,
}
