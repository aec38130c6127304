//! Hashed time-locked escrow over a fungible token.
//!
//! A payer locks tokens against the SHA-256 hash of a Lightning invoice
//! preimage. The protocol operator claims them to the treasury by revealing
//! the preimage; after expiry anyone may trigger a refund to the payer. The
//! state machine is pure: the block timestamp is passed into every mutator,
//! and token movements go through the [`TokenLedger`] trait.

pub mod address;
pub mod error;
pub mod ledger;
pub mod u256;
pub mod vault;

pub use address::Address;
pub use error::VaultError;
pub use ledger::InMemoryLedger;
pub use ledger::TokenLedger;
pub use u256::U256;
pub use vault::EscrowPosition;
pub use vault::Phase;
pub use vault::Vault;
pub use vault::VaultConfig;
pub use vault::VaultEvent;
pub use vault::SECONDS_PER_WEEK;
