//! Session state: the coin wallet, the vote engine, and the chat
//! transcript.
//!
//! These are explicit instances owned by the widget that mounts them — no
//! module-level globals — so independent widgets (and tests) never share
//! mutable state.

pub mod chat;
pub mod votes;
pub mod wallet;

pub use chat::{ChatAuthor, ChatEntry, ChatTranscript};
pub use votes::{OptionStanding, PendingVote, VoteAggregator, VOTE_LIMIT};
pub use wallet::CoinWallet;
