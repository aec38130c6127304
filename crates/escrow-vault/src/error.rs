/// Failure conditions of the escrow entrypoints.
///
/// The variant messages are the short revert codes emitted on-chain, so an
/// error observed through a transaction receipt and one raised by the local
/// state machine compare equal as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VaultError {
    #[error("OWNER_ZERO")]
    OwnerZero,
    #[error("OPERATOR_ZERO")]
    OperatorZero,
    #[error("TREASURY_ZERO")]
    TreasuryZero,
    #[error("ASSET_ZERO")]
    AssetZero,
    /// Expiry window must stay below one week (604800 seconds).
    #[error("EXPIRY_GT_WEEK")]
    ExpiryGtWeek,
    #[error("LIMIT_ZERO")]
    LimitZero,
    #[error("LIMIT_EXCEEDED")]
    LimitExceeded,
    #[error("AMOUNT_ZERO")]
    AmountZero,
    #[error("USER_ZERO")]
    UserZero,
    #[error("NOT_USER")]
    NotUser,
    #[error("NOT_OPERATOR")]
    NotOperator,
    #[error("NOT_OWNER")]
    NotOwner,
    /// A hash can be locked at most once over the contract lifetime.
    #[error("HASH_REUSED")]
    HashReused,
    #[error("NOT_LOCKED")]
    NotLocked,
    /// SHA-256 of the presented preimage does not equal the locked hash.
    #[error("HASH_MISMATCH")]
    HashMismatch,
    /// Refund attempted before expiry.
    #[error("ESCROW_ACTIVE")]
    EscrowActive,
    #[error("TRANSFER_FROM_FAIL")]
    TransferFromFail,
    #[error("TRANSFER_FAIL")]
    TransferFail,
}
