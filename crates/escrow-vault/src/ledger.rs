use crate::address::Address;
use crate::u256::U256;
use std::collections::HashMap;

/// ERC-20-style token movements as seen from the escrow contract.
///
/// Both transfer methods return `false` instead of erroring, matching the
/// falsey-return convention of the token standard; the vault turns a falsey
/// return into the corresponding named error.
pub trait TokenLedger {
    /// Moves `amount` from `from` to `to` out of an allowance granted to
    /// `spender`.
    fn transfer_from(&mut self, spender: &Address, from: &Address, to: &Address, amount: U256)
        -> bool;

    /// Moves `amount` out of `from`'s own balance.
    fn transfer(&mut self, from: &Address, to: &Address, amount: U256) -> bool;

    fn balance_of(&self, account: &Address) -> U256;
}

/// In-memory token ledger with balances and allowances.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLedger {
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&mut self, account: &Address, amount: U256) {
        let balance = self.balances.entry(account.clone()).or_default();
        *balance = balance
            .checked_add(amount)
            .expect("minted balance overflows");
    }

    pub fn approve(&mut self, owner: &Address, spender: &Address, amount: U256) {
        self.allowances
            .insert((owner.clone(), spender.clone()), amount);
    }

    fn move_balance(&mut self, from: &Address, to: &Address, amount: U256) -> bool {
        let from_balance = self.balances.get(from).copied().unwrap_or_default();
        let Some(remaining) = from_balance.checked_sub(amount) else {
            return false;
        };
        let to_balance = self.balances.get(to).copied().unwrap_or_default();
        let Some(credited) = to_balance.checked_add(amount) else {
            return false;
        };
        self.balances.insert(from.clone(), remaining);
        self.balances.insert(to.clone(), credited);
        true
    }
}

impl TokenLedger for InMemoryLedger {
    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: U256,
    ) -> bool {
        let key = (from.clone(), spender.clone());
        let allowance = self.allowances.get(&key).copied().unwrap_or_default();
        let Some(remaining) = allowance.checked_sub(amount) else {
            return false;
        };
        if !self.move_balance(from, to, amount) {
            return false;
        }
        self.allowances.insert(key, remaining);
        true
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: U256) -> bool {
        self.move_balance(from, to, amount)
    }

    fn balance_of(&self, account: &Address) -> U256 {
        self.balances.get(account).copied().unwrap_or_default()
    }
}
