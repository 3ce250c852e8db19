//! Error taxonomy for the widget core.
//!
//! Everything here is recoverable and local; none of these should ever
//! terminate the widget.

use thiserror::Error;

/// Wallet-level failure. Insufficient funds is always an explicit
/// rejection; the balance is never clamped to zero.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("insufficient funds: tried to spend {requested} with balance {balance}")]
    InsufficientFunds { requested: u32, balance: u32 },
}

/// Why a vote was rejected.
///
/// `InsufficientFunds` is the one variant that should open the purchase
/// flow; the others are poll-state errors and not the wallet's concern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteError {
    /// An option already reached the limit; no further votes are accepted
    /// on any option.
    #[error("poll is closed")]
    PollClosed,
    /// This vote would push the option past the limit. Nothing is applied
    /// partially.
    #[error("a {amount}-coin vote on {option_id} would exceed the option limit")]
    LimitExceeded { option_id: String, amount: u32 },
    #[error(transparent)]
    InsufficientFunds(#[from] WalletError),
    /// A submission is still in flight; retry shortly.
    #[error("another vote is still in flight")]
    VotingBusy,
    /// Contract violation: the option was never registered.
    #[error("unknown option: {0}")]
    UnknownOption(String),
}

/// Errors from the payment collaborator endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("deserialization error: {0}")]
    Deserialize(String),
}
