use crate::address::Address;
use crate::error::VaultError;
use crate::ledger::TokenLedger;
use crate::u256::U256;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;

/// One week in seconds; the expiry window must stay strictly below it.
pub const SECONDS_PER_WEEK: u64 = 604_800;

/// Lifecycle of a single escrow entry. `None -> Locked -> (Claimed |
/// Refunded)`; the terminal states never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    None,
    Locked,
    Claimed,
    Refunded,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::None => "None",
            Phase::Locked => "Locked",
            Phase::Claimed => "Claimed",
            Phase::Refunded => "Refunded",
        };
        f.write_str(s)
    }
}

/// Escrow entry keyed by the payment hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowPosition {
    pub phase: Phase,
    pub user: Address,
    pub amount: U256,
    pub expires_at: u64,
    pub locked_at: u64,
}

impl EscrowPosition {
    /// The empty position returned for hashes that were never locked.
    pub fn none() -> Self {
        EscrowPosition {
            phase: Phase::None,
            user: Address::zero(),
            amount: U256::ZERO,
            expires_at: 0,
            locked_at: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    pub owner: Address,
    pub protocol_operator: Address,
    pub protocol_treasury: Address,
    pub asset: Address,
    /// Seconds between locking and refundability. Must be below one week.
    pub expiry_window: u64,
    /// Upper bound on a single locked amount.
    pub payment_limit: U256,
}

impl VaultConfig {
    fn validate(&self) -> Result<(), VaultError> {
        if self.owner.is_zero() {
            return Err(VaultError::OwnerZero);
        }
        if self.protocol_operator.is_zero() {
            return Err(VaultError::OperatorZero);
        }
        if self.protocol_treasury.is_zero() {
            return Err(VaultError::TreasuryZero);
        }
        if self.asset.is_zero() {
            return Err(VaultError::AssetZero);
        }
        if self.expiry_window >= SECONDS_PER_WEEK {
            return Err(VaultError::ExpiryGtWeek);
        }
        if self.payment_limit.is_zero() {
            return Err(VaultError::LimitZero);
        }
        Ok(())
    }
}

/// Events emitted by successful entrypoint calls, mirroring the on-chain log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultEvent {
    Locked {
        user: Address,
        amount: U256,
        hash: U256,
        expires_at: u64,
        locked_at: u64,
    },
    Claimed {
        user: Address,
        hash: U256,
        amount: U256,
        preimage: Vec<u8>,
        claimer: Address,
    },
    Refunded {
        hash: U256,
        user: Address,
        amount: U256,
        refunded_at: u64,
    },
    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
    },
    OperatorUpdated {
        operator: Address,
    },
    TreasuryUpdated {
        treasury: Address,
    },
    AssetUpdated {
        asset: Address,
    },
    ExpiryWindowUpdated {
        seconds: u64,
    },
    PaymentLimitUpdated {
        limit: U256,
    },
}

/// The escrow contract state machine.
///
/// All mutators take the caller and the current chain timestamp explicitly;
/// nothing in here reads a clock. A failed call returns before any ledger or
/// position mutation, so the whole call reverts as a unit.
#[derive(Debug, Clone)]
pub struct Vault<L> {
    address: Address,
    config: VaultConfig,
    escrows: HashMap<U256, EscrowPosition>,
    ledger: L,
}

/// SHA-256 of the preimage as a big-endian 256-bit integer.
pub fn preimage_hash(preimage: &[u8]) -> U256 {
    let digest: [u8; 32] = Sha256::digest(preimage).into();
    U256::from_be_bytes(digest)
}

impl<L: TokenLedger> Vault<L> {
    pub fn new(address: Address, config: VaultConfig, ledger: L) -> Result<Self, VaultError> {
        config.validate()?;
        Ok(Vault {
            address,
            config,
            escrows: HashMap::new(),
            ledger,
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn get_config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn get_escrow(&self, hash: U256) -> EscrowPosition {
        self.escrows
            .get(&hash)
            .cloned()
            .unwrap_or_else(EscrowPosition::none)
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Locks `amount` of the caller's tokens against `hash`.
    ///
    /// The caller must be `user` and must have approved the vault for at
    /// least `amount` beforehand. A hash that has ever been locked, claimed
    /// or refunded cannot be locked again.
    pub fn lock_for_ln_payment(
        &mut self,
        caller: &Address,
        user: &Address,
        amount: U256,
        hash: U256,
        now: u64,
    ) -> Result<VaultEvent, VaultError> {
        if user.is_zero() {
            return Err(VaultError::UserZero);
        }
        if caller != user {
            return Err(VaultError::NotUser);
        }
        if amount.is_zero() {
            return Err(VaultError::AmountZero);
        }
        if amount > self.config.payment_limit {
            return Err(VaultError::LimitExceeded);
        }
        if self.escrows.contains_key(&hash) {
            return Err(VaultError::HashReused);
        }
        let vault_address = self.address.clone();
        if !self
            .ledger
            .transfer_from(&vault_address, user, &vault_address, amount)
        {
            return Err(VaultError::TransferFromFail);
        }
        let expires_at = now + self.config.expiry_window;
        self.escrows.insert(
            hash,
            EscrowPosition {
                phase: Phase::Locked,
                user: user.clone(),
                amount,
                expires_at,
                locked_at: now,
            },
        );
        Ok(VaultEvent::Locked {
            user: user.clone(),
            amount,
            hash,
            expires_at,
            locked_at: now,
        })
    }

    /// Claims a locked position to the treasury by revealing the preimage.
    /// Operator only; `sha256(preimage)` must equal the hash bit-for-bit.
    pub fn claim(
        &mut self,
        caller: &Address,
        hash: U256,
        preimage: &[u8],
    ) -> Result<VaultEvent, VaultError> {
        if caller != &self.config.protocol_operator {
            return Err(VaultError::NotOperator);
        }
        let position = match self.escrows.get(&hash) {
            Some(p) if p.phase == Phase::Locked => p.clone(),
            _ => return Err(VaultError::NotLocked),
        };
        if preimage_hash(preimage) != hash {
            return Err(VaultError::HashMismatch);
        }
        let vault_address = self.address.clone();
        let treasury = self.config.protocol_treasury.clone();
        if !self.ledger.transfer(&vault_address, &treasury, position.amount) {
            return Err(VaultError::TransferFail);
        }
        let entry = self.escrows.get_mut(&hash).expect("position checked above");
        entry.phase = Phase::Claimed;
        Ok(VaultEvent::Claimed {
            user: position.user,
            hash,
            amount: position.amount,
            preimage: preimage.to_vec(),
            claimer: caller.clone(),
        })
    }

    /// Refunds an expired lock to the user. Anyone may call once
    /// `now >= expires_at`.
    pub fn refund(&mut self, hash: U256, now: u64) -> Result<VaultEvent, VaultError> {
        let position = match self.escrows.get(&hash) {
            Some(p) if p.phase == Phase::Locked => p.clone(),
            _ => return Err(VaultError::NotLocked),
        };
        if now < position.expires_at {
            return Err(VaultError::EscrowActive);
        }
        self.refund_position(hash, position, now)
    }

    /// Cooperative refund by the operator, permitted before expiry.
    ///
    /// This deliberately bypasses the time lock: the operator abandoning a
    /// payment can release the user's funds immediately instead of making
    /// them wait out the window. It widens operator trust accordingly.
    pub fn operator_refund(
        &mut self,
        caller: &Address,
        hash: U256,
        now: u64,
    ) -> Result<VaultEvent, VaultError> {
        if caller != &self.config.protocol_operator {
            return Err(VaultError::NotOperator);
        }
        let position = match self.escrows.get(&hash) {
            Some(p) if p.phase == Phase::Locked => p.clone(),
            _ => return Err(VaultError::NotLocked),
        };
        self.refund_position(hash, position, now)
    }

    fn refund_position(
        &mut self,
        hash: U256,
        position: EscrowPosition,
        now: u64,
    ) -> Result<VaultEvent, VaultError> {
        let vault_address = self.address.clone();
        if !self
            .ledger
            .transfer(&vault_address, &position.user, position.amount)
        {
            return Err(VaultError::TransferFail);
        }
        let entry = self.escrows.get_mut(&hash).expect("position checked above");
        entry.phase = Phase::Refunded;
        Ok(VaultEvent::Refunded {
            hash,
            user: position.user,
            amount: position.amount,
            refunded_at: now,
        })
    }

    pub fn transfer_ownership(
        &mut self,
        caller: &Address,
        new_owner: &Address,
    ) -> Result<VaultEvent, VaultError> {
        self.ensure_owner(caller)?;
        if new_owner.is_zero() {
            return Err(VaultError::OwnerZero);
        }
        let previous_owner = std::mem::replace(&mut self.config.owner, new_owner.clone());
        Ok(VaultEvent::OwnershipTransferred {
            previous_owner,
            new_owner: new_owner.clone(),
        })
    }

    pub fn update_protocol_operator(
        &mut self,
        caller: &Address,
        operator: &Address,
    ) -> Result<VaultEvent, VaultError> {
        self.ensure_owner(caller)?;
        if operator.is_zero() {
            return Err(VaultError::OperatorZero);
        }
        self.config.protocol_operator = operator.clone();
        Ok(VaultEvent::OperatorUpdated {
            operator: operator.clone(),
        })
    }

    pub fn update_protocol_treasury(
        &mut self,
        caller: &Address,
        treasury: &Address,
    ) -> Result<VaultEvent, VaultError> {
        self.ensure_owner(caller)?;
        if treasury.is_zero() {
            return Err(VaultError::TreasuryZero);
        }
        self.config.protocol_treasury = treasury.clone();
        Ok(VaultEvent::TreasuryUpdated {
            treasury: treasury.clone(),
        })
    }

    pub fn update_asset(
        &mut self,
        caller: &Address,
        asset: &Address,
    ) -> Result<VaultEvent, VaultError> {
        self.ensure_owner(caller)?;
        if asset.is_zero() {
            return Err(VaultError::AssetZero);
        }
        self.config.asset = asset.clone();
        Ok(VaultEvent::AssetUpdated {
            asset: asset.clone(),
        })
    }

    pub fn update_expiry_window(
        &mut self,
        caller: &Address,
        seconds: u64,
    ) -> Result<VaultEvent, VaultError> {
        self.ensure_owner(caller)?;
        if seconds >= SECONDS_PER_WEEK {
            return Err(VaultError::ExpiryGtWeek);
        }
        self.config.expiry_window = seconds;
        Ok(VaultEvent::ExpiryWindowUpdated { seconds })
    }

    pub fn update_payment_limit(
        &mut self,
        caller: &Address,
        limit: U256,
    ) -> Result<VaultEvent, VaultError> {
        self.ensure_owner(caller)?;
        if limit.is_zero() {
            return Err(VaultError::LimitZero);
        }
        self.config.payment_limit = limit;
        Ok(VaultEvent::PaymentLimitUpdated { limit })
    }

    fn ensure_owner(&self, caller: &Address) -> Result<(), VaultError> {
        if caller != &self.config.owner {
            return Err(VaultError::NotOwner);
        }
        Ok(())
    }
}
