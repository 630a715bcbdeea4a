use anchor_lang::prelude::*;
use anchor_lang::solana_program::program_option::COption;
use anchor_lang::AccountsExit;
use anchor_spl::token_interface::{
    transfer_checked, Mint, TokenAccount, TokenInterface, TransferChecked,
};

use crate::constants::LOTTERY_SEED;
use crate::engine::{EntropySource, Movement, RoundOpening, RoundStore, TokenGateway};
use crate::error::ErrorCode;
use crate::events::{DeferredPrizeReleased, RoundClosed, RoundOpened};
use crate::state::{Lottery, Round};

/// Bytes of one `(slot, hash)` entry in the SlotHashes sysvar.
const SLOT_HASH_ENTRY_LEN: usize = 8 + 32;

/// Moves `amount` tokens signed by a wallet.
pub fn transfer_tokens<'info>(
    from: &InterfaceAccount<'info, TokenAccount>,
    to: &InterfaceAccount<'info, TokenAccount>,
    amount: u64,
    mint: &InterfaceAccount<'info, Mint>,
    authority: &Signer<'info>,
    token_program: &Interface<'info, TokenInterface>,
) -> Result<()> {
    let transfer_accounts = TransferChecked {
        from: from.to_account_info(),
        mint: mint.to_account_info(),
        to: to.to_account_info(),
        authority: authority.to_account_info(),
    };

    let cpi_context = CpiContext::new(token_program.to_account_info(), transfer_accounts);

    transfer_checked(cpi_context, amount, mint.decimals)
}

/// Token movements through the vault, signed by the `Lottery` PDA.
///
/// Players are resolved to token accounts among `holders` by owner and
/// mint. Stakes are pulled with the PDA acting as the delegate the player
/// approved through `approve_stake`.
pub struct VaultGateway<'info> {
    lottery: AccountInfo<'info>,
    bump: u8,
    vault: AccountInfo<'info>,
    mint: AccountInfo<'info>,
    decimals: u8,
    token_program: AccountInfo<'info>,
    holders: Vec<AccountInfo<'info>>,
}

type Transfer<'info> = (AccountInfo<'info>, AccountInfo<'info>, u64);

impl<'info> VaultGateway<'info> {
    pub fn new(
        lottery: AccountInfo<'info>,
        bump: u8,
        vault: AccountInfo<'info>,
        mint: AccountInfo<'info>,
        decimals: u8,
        token_program: AccountInfo<'info>,
    ) -> Self {
        Self {
            lottery,
            bump,
            vault,
            mint,
            decimals,
            token_program,
            holders: Vec::new(),
        }
    }

    pub fn for_lottery(
        lottery: &Account<'info, Lottery>,
        vault: &InterfaceAccount<'info, TokenAccount>,
        mint: &InterfaceAccount<'info, Mint>,
        token_program: &Interface<'info, TokenInterface>,
    ) -> Self {
        Self::new(
            lottery.to_account_info(),
            lottery.bump,
            vault.to_account_info(),
            mint.to_account_info(),
            mint.decimals,
            token_program.to_account_info(),
        )
    }

    pub fn with_holders<I>(mut self, holders: I) -> Self
    where
        I: IntoIterator<Item = AccountInfo<'info>>,
    {
        self.holders.extend(holders);
        self
    }

    fn read(&self, info: &AccountInfo<'info>) -> Option<TokenAccount> {
        if info.owner != self.token_program.key {
            return None;
        }
        let data = info.try_borrow_data().ok()?;
        TokenAccount::try_deserialize(&mut &data[..]).ok()
    }

    fn holder_of(&self, owner: &Pubkey) -> Option<(AccountInfo<'info>, TokenAccount)> {
        self.holders.iter().find_map(|info| {
            let account = self.read(info)?;
            (account.owner == *owner && account.mint == *self.mint.key)
                .then(|| (info.clone(), account))
        })
    }

    /// Source, destination and amount of every movement. Fails before any
    /// transfer when one of them cannot go through.
    fn route(&self, movements: &[Movement]) -> Result<Vec<Transfer<'info>>> {
        let mut escrow = self.balance_of(self.lottery.key);
        let mut transfers = Vec::with_capacity(movements.len());
        for movement in movements {
            match *movement {
                Movement::Pull { owner, amount } => {
                    let (source, account) = self
                        .holder_of(&owner)
                        .ok_or(ErrorCode::InsufficientAllowance)?;
                    require!(
                        account.delegate == COption::Some(*self.lottery.key)
                            && account.delegated_amount >= amount
                            && account.amount >= amount,
                        ErrorCode::InsufficientAllowance
                    );
                    escrow = escrow.checked_add(amount).ok_or(ErrorCode::MathOverflow)?;
                    transfers.push((source, self.vault.clone(), amount));
                }
                Movement::Push { owner, amount } => {
                    let (recipient, _) = self
                        .holder_of(&owner)
                        .ok_or(ErrorCode::RecipientNotProvided)?;
                    escrow = escrow.checked_sub(amount).ok_or(ErrorCode::EscrowShortfall)?;
                    transfers.push((self.vault.clone(), recipient, amount));
                }
            }
        }
        Ok(transfers)
    }

    fn signed_transfer(&self, from: AccountInfo<'info>, to: AccountInfo<'info>, amount: u64) -> Result<()> {
        let signer_seeds: &[&[&[u8]]] = &[&[LOTTERY_SEED, &[self.bump]]];
        transfer_checked(
            CpiContext::new_with_signer(
                self.token_program.clone(),
                TransferChecked {
                    from,
                    mint: self.mint.clone(),
                    to,
                    authority: self.lottery.clone(),
                },
                signer_seeds,
            ),
            amount,
            self.decimals,
        )
    }
}

impl<'info> TokenGateway for VaultGateway<'info> {
    fn settle(&mut self, movements: &[Movement]) -> Result<()> {
        for (from, to, amount) in self.route(movements)? {
            self.signed_transfer(from, to, amount)?;
        }
        Ok(())
    }

    fn balance_of(&self, owner: &Pubkey) -> u64 {
        if owner == self.lottery.key {
            return self.read(&self.vault).map_or(0, |vault| vault.amount);
        }
        self.holder_of(owner).map_or(0, |(_, account)| account.amount)
    }
}

/// Round accounts loaded by an instruction, found by their index.
///
/// At most one new round can be stored, into the account created for it
/// at `[ROUND_SEED, round_count]`.
pub struct RoundSet<'a, 'info> {
    rounds: Vec<&'a mut Account<'info, Round>>,
    slot: Option<(&'a mut Account<'info, Round>, u8)>,
}

impl<'a, 'info> RoundSet<'a, 'info> {
    pub fn new() -> Self {
        Self {
            rounds: Vec::new(),
            slot: None,
        }
    }

    pub fn with(mut self, round: &'a mut Account<'info, Round>) -> Result<Self> {
        require!(
            self.rounds.iter().all(|loaded| loaded.index != round.index),
            ErrorCode::DuplicateRound
        );
        self.rounds.push(round);
        Ok(self)
    }

    pub fn with_all<I>(self, rounds: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a mut Account<'info, Round>>,
    {
        rounds.into_iter().try_fold(self, Self::with)
    }

    /// Account the next round is written into, with its bump.
    pub fn with_slot(mut self, slot: Option<(&'a mut Account<'info, Round>, u8)>) -> Self {
        self.slot = slot;
        self
    }

    /// Fails when an account was created for a round that never opened.
    pub fn finish(self) -> Result<()> {
        require!(self.slot.is_none(), ErrorCode::UnexpectedRoundAccount);
        Ok(())
    }
}

impl RoundStore for RoundSet<'_, '_> {
    fn round(&self, index: u64) -> Result<&Round> {
        self.rounds
            .iter()
            .find(|round| round.index == index)
            .map(|round| &***round)
            .ok_or_else(|| error!(ErrorCode::RoundNotFound))
    }

    fn round_mut(&mut self, index: u64) -> Result<&mut Round> {
        self.rounds
            .iter_mut()
            .find(|round| round.index == index)
            .map(|round| &mut ***round)
            .ok_or_else(|| error!(ErrorCode::RoundNotFound))
    }

    fn can_insert(&self, index: u64) -> Result<()> {
        require!(self.slot.is_some(), ErrorCode::RoundAccountMissing);
        require!(self.round(index).is_err(), ErrorCode::DuplicateRound);
        Ok(())
    }

    fn insert(&mut self, mut round: Round) -> Result<()> {
        self.can_insert(round.index)?;
        let (account, bump) = self.slot.take().ok_or(ErrorCode::RoundAccountMissing)?;
        round.bump = bump;
        account.set_inner(round);
        self.rounds.push(account);
        Ok(())
    }
}

/// Splits remaining accounts into round accounts of this program and the
/// token accounts of players.
pub fn split_remaining<'info>(
    remaining: &'info [AccountInfo<'info>],
) -> Result<(Vec<Account<'info, Round>>, Vec<AccountInfo<'info>>)> {
    let mut rounds = Vec::new();
    let mut holders = Vec::new();
    for info in remaining {
        if info.owner == &crate::ID {
            rounds.push(Account::<Round>::try_from(info)?);
        } else {
            holders.push(info.clone());
        }
    }
    Ok((rounds, holders))
}

/// Writes back round accounts loaded from the remaining accounts.
pub fn persist_rounds(rounds: &[Account<'_, Round>], program_id: &Pubkey) -> Result<()> {
    for round in rounds {
        round.exit(program_id)?;
    }
    Ok(())
}

/// Slot clock and the SlotHashes sysvar.
pub struct SlotEntropy<'a, 'info> {
    slot: u64,
    slot_hashes: &'a AccountInfo<'info>,
}

impl<'a, 'info> SlotEntropy<'a, 'info> {
    pub fn new(slot: u64, slot_hashes: &'a AccountInfo<'info>) -> Self {
        Self { slot, slot_hashes }
    }
}

impl EntropySource for SlotEntropy<'_, '_> {
    fn current_height(&self) -> u64 {
        self.slot
    }

    fn hash_at(&self, height: u64) -> Option<[u8; 32]> {
        let data = self.slot_hashes.try_borrow_data().ok()?;
        let count = u64::from_le_bytes(data.get(..8)?.try_into().ok()?) as usize;
        data.get(8..)?
            .chunks_exact(SLOT_HASH_ENTRY_LEN)
            .take(count)
            .find(|entry| entry[..8] == height.to_le_bytes())
            .and_then(|entry| entry[8..].try_into().ok())
    }
}

/// Logs the closing of the previous round, the opening and its releases.
pub fn emit_round_opening(opening: &RoundOpening) {
    let closed = opening.round_index.saturating_sub(1);
    msg!("Closed round {} at slot {}", closed, opening.opened_at);
    emit!(RoundClosed {
        round_index: closed,
        closed_at: opening.opened_at,
    });
    msg!("Opened round {}", opening.round_index);
    emit!(RoundOpened {
        round_index: opening.round_index,
        opened_at: opening.opened_at,
    });
    for release in &opening.released {
        msg!(
            "Released deferred prize of {} for ticket {}/{}",
            release.amount,
            release.ticket_round,
            release.ticket_index
        );
        emit!(DeferredPrizeReleased {
            resolving_round: release.resolving_round,
            round_index: release.ticket_round,
            ticket_index: release.ticket_index,
            player: release.player,
            amount: release.amount,
        });
    }
}

#[cfg(test)]
mod tests {
    use anchor_lang::solana_program::program_pack::Pack;
    use anchor_spl::token::spl_token;
    use anchor_spl::token::spl_token::state::{Account as SplAccount, AccountState};

    use super::*;
    use crate::engine::testing::assert_error;
    use crate::state::RoundStatus;

    fn leak<T>(value: T) -> &'static mut T {
        Box::leak(Box::new(value))
    }

    fn account_info(key: Pubkey, owner: Pubkey, data: Vec<u8>) -> AccountInfo<'static> {
        AccountInfo::new(
            leak(key),
            false,
            true,
            leak(0),
            Box::leak(data.into_boxed_slice()),
            leak(owner),
            false,
            0,
        )
    }

    fn token_account(owner: Pubkey, mint: Pubkey, amount: u64, delegate: Option<(Pubkey, u64)>) -> AccountInfo<'static> {
        let state = SplAccount {
            mint,
            owner,
            amount,
            delegate: match delegate {
                Some((delegate, _)) => COption::Some(delegate),
                None => COption::None,
            },
            state: AccountState::Initialized,
            is_native: COption::None,
            delegated_amount: delegate.map_or(0, |(_, allowance)| allowance),
            close_authority: COption::None,
        };
        let mut data = vec![0; SplAccount::LEN];
        SplAccount::pack(state, &mut data).unwrap();
        account_info(Pubkey::new_unique(), spl_token::ID, data)
    }

    struct Vault {
        lottery: Pubkey,
        mint: Pubkey,
        gateway: VaultGateway<'static>,
    }

    fn vault(escrow: u64, holders: Vec<AccountInfo<'static>>) -> Vault {
        let lottery = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let gateway = VaultGateway::new(
            account_info(lottery, crate::ID, Vec::new()),
            254,
            token_account(lottery, mint, escrow, None),
            account_info(mint, spl_token::ID, Vec::new()),
            9,
            account_info(spl_token::ID, Pubkey::new_unique(), Vec::new()),
        )
        .with_holders(holders);
        Vault {
            lottery,
            mint,
            gateway,
        }
    }

    fn pull(owner: Pubkey, amount: u64) -> Movement {
        Movement::Pull { owner, amount }
    }

    fn push(owner: Pubkey, amount: u64) -> Movement {
        Movement::Push { owner, amount }
    }

    #[test]
    fn pulls_need_the_lottery_as_delegate() {
        let player = Pubkey::new_unique();
        let Vault { lottery, mint, gateway } = vault(0, Vec::new());
        let approved = token_account(player, mint, 500, Some((lottery, 300)));
        let source = *approved.key;
        let gateway = gateway.with_holders([approved]);

        let transfers = gateway.route(&[pull(player, 300)]).unwrap();
        assert_eq!(transfers.len(), 1);
        assert_eq!(*transfers[0].0.key, source);
        assert_eq!(transfers[0].1.key, gateway.vault.key);
        assert_eq!(transfers[0].2, 300);
        assert_error(gateway.route(&[pull(player, 301)]), ErrorCode::InsufficientAllowance);
        assert_error(
            gateway.route(&[pull(Pubkey::new_unique(), 1)]),
            ErrorCode::InsufficientAllowance,
        );

        let Vault { mint, gateway, .. } = vault(0, Vec::new());
        let other_delegate = token_account(player, mint, 500, Some((Pubkey::new_unique(), 300)));
        let gateway = gateway.with_holders([other_delegate]);
        assert_error(gateway.route(&[pull(player, 1)]), ErrorCode::InsufficientAllowance);

        let Vault { lottery, mint, gateway } = vault(0, Vec::new());
        let short = token_account(player, mint, 10, Some((lottery, 300)));
        let gateway = gateway.with_holders([short]);
        assert_error(gateway.route(&[pull(player, 20)]), ErrorCode::InsufficientAllowance);
    }

    #[test]
    fn holders_of_another_mint_or_program_are_ignored() {
        let player = Pubkey::new_unique();
        let mut gateway = vault(1_000, Vec::new()).gateway;
        let other_mint = token_account(player, Pubkey::new_unique(), 50, None);
        let mut forged = token_account(player, *gateway.mint.key, 50, None);
        forged.owner = leak(Pubkey::new_unique());
        gateway = gateway.with_holders([other_mint, forged]);

        assert_eq!(gateway.balance_of(&player), 0);
        assert_error(gateway.settle(&[push(player, 10)]), ErrorCode::RecipientNotProvided);
    }

    #[test]
    fn pushes_are_covered_by_the_escrow_and_earlier_pulls() {
        let player = Pubkey::new_unique();
        let winner = Pubkey::new_unique();
        let base = vault(100, Vec::new());
        let staker = token_account(player, base.mint, 500, Some((base.lottery, 500)));
        let recipient = token_account(winner, base.mint, 0, None);
        let lottery = base.lottery;
        let gateway = base.gateway.with_holders([staker, recipient]);

        assert_eq!(gateway.balance_of(&lottery), 100);
        assert_eq!(gateway.balance_of(&player), 500);
        assert_error(gateway.route(&[push(winner, 150)]), ErrorCode::EscrowShortfall);

        let transfers = gateway.route(&[pull(player, 50), push(winner, 150)]).unwrap();
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[1].0.key, gateway.vault.key);
        assert_eq!(transfers[1].2, 150);
    }

    #[test]
    fn failing_movement_stops_the_whole_settlement() {
        let player = Pubkey::new_unique();
        let base = vault(0, Vec::new());
        let staker = token_account(player, base.mint, 500, Some((base.lottery, 500)));
        let mut gateway = base.gateway.with_holders([staker]);

        // the pull is valid, the missing recipient fails the batch first
        assert_error(
            gateway.settle(&[pull(player, 100), push(Pubkey::new_unique(), 10)]),
            ErrorCode::RecipientNotProvided,
        );
        assert_eq!(gateway.balance_of(&player), 500);
    }

    fn round_account(round: Round) -> Account<'static, Round> {
        let mut data = Vec::new();
        round.try_serialize(&mut data).unwrap();
        let info: &'static AccountInfo<'static> = leak(account_info(Pubkey::new_unique(), crate::ID, data));
        Account::try_from(info).unwrap()
    }

    #[test]
    fn round_set_finds_rounds_by_index() {
        let mut first = round_account(Round::new(4, 10, 0));
        let mut second = round_account(Round::new(7, 20, 9));
        let rounds = RoundSet::new()
            .with_all([&mut first, &mut second])
            .unwrap();

        assert_eq!(rounds.round(7).unwrap().first_ticket, 9);
        assert_eq!(rounds.ticket_count(4).unwrap(), 0);
        assert_error(rounds.round(5), ErrorCode::RoundNotFound);
        assert_error(rounds.can_insert(8), ErrorCode::RoundAccountMissing);
        rounds.finish().unwrap();
    }

    #[test]
    fn round_set_rejects_the_same_round_twice() {
        let mut first = round_account(Round::new(4, 10, 0));
        let mut again = round_account(Round::new(4, 10, 0));
        let result = RoundSet::new().with(&mut first).unwrap().with(&mut again);
        assert_error(result.map(|_| ()), ErrorCode::DuplicateRound);
    }

    #[test]
    fn new_round_goes_into_the_created_account() {
        let mut open = round_account(Round::new(0, 10, 0));
        let mut slot = round_account(Round::new(0, 0, 0));
        let mut rounds = RoundSet::new()
            .with(&mut open)
            .unwrap()
            .with_slot(Some((&mut slot, 251)));

        rounds.round_mut(0).unwrap().status = RoundStatus::Full;
        rounds.insert(Round::new(1, 12, 3)).unwrap();
        assert_eq!(rounds.round(1).unwrap().opened_at, 12);
        assert_error(rounds.insert(Round::new(2, 13, 3)), ErrorCode::RoundAccountMissing);
        rounds.finish().unwrap();

        assert_eq!(slot.index, 1);
        assert_eq!(slot.bump, 251);
        assert_eq!(open.status, RoundStatus::Full);
    }

    #[test]
    fn unused_round_account_is_refused() {
        let mut slot = round_account(Round::new(0, 0, 0));
        let rounds = RoundSet::new().with_slot(Some((&mut slot, 251)));
        assert_error(rounds.finish(), ErrorCode::UnexpectedRoundAccount);
    }

    #[test]
    fn remaining_accounts_split_into_rounds_and_holders() {
        let mut data = Vec::new();
        Round::new(3, 5, 0).try_serialize(&mut data).unwrap();
        let round_info = account_info(Pubkey::new_unique(), crate::ID, data);
        let holder = token_account(Pubkey::new_unique(), Pubkey::new_unique(), 0, None);
        let remaining: &'static [AccountInfo<'static>] = Box::leak(vec![round_info, holder].into_boxed_slice());

        let (mut rounds, holders) = split_remaining(remaining).unwrap();
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].index, 3);
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].owner, &spl_token::ID);

        rounds[0].prize_fund = 77;
        persist_rounds(&rounds, &crate::ID).unwrap();
        let reloaded = Account::<Round>::try_from(&remaining[0]).unwrap();
        assert_eq!(reloaded.prize_fund, 77);
    }

    fn sysvar_data(entries: &[(u64, [u8; 32])]) -> Vec<u8> {
        let mut data = (entries.len() as u64).to_le_bytes().to_vec();
        for (slot, hash) in entries {
            data.extend_from_slice(&slot.to_le_bytes());
            data.extend_from_slice(hash);
        }
        data
    }

    #[test]
    fn reads_hashes_from_the_sysvar_layout() {
        let key = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let mut lamports = 0;
        let mut data = sysvar_data(&[(12, [3; 32]), (11, [2; 32]), (9, [1; 32])]);
        let info = AccountInfo::new(&key, false, false, &mut lamports, &mut data, &owner, false, 0);

        let entropy = SlotEntropy::new(13, &info);
        assert_eq!(entropy.current_height(), 13);
        assert_eq!(entropy.hash_at(12), Some([3; 32]));
        assert_eq!(entropy.hash_at(9), Some([1; 32]));
        assert_eq!(entropy.hash_at(10), None);
        assert_eq!(entropy.hash_at(13), None);
    }

    #[test]
    fn ignores_entries_past_the_declared_count() {
        let key = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let mut lamports = 0;
        let mut data = sysvar_data(&[(12, [3; 32]), (11, [2; 32])]);
        data[..8].copy_from_slice(&1u64.to_le_bytes());
        let info = AccountInfo::new(&key, false, false, &mut lamports, &mut data, &owner, false, 0);

        let entropy = SlotEntropy::new(13, &info);
        assert_eq!(entropy.hash_at(12), Some([3; 32]));
        assert_eq!(entropy.hash_at(11), None);
    }

    #[test]
    fn truncated_sysvar_yields_nothing() {
        let key = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let mut lamports = 0;
        let mut data = vec![1, 0, 0];
        let info = AccountInfo::new(&key, false, false, &mut lamports, &mut data, &owner, false, 0);

        assert_eq!(SlotEntropy::new(5, &info).hash_at(4), None);
    }
}
