//! Crowdplay widget core: cross-frame messaging, hub connection
//! management, and the optimistic vote/wallet engine.
//!
//! Rendering, the hosted checkout UI, and page routing live in the
//! embedding application; this crate owns the protocol and state-machine
//! logic underneath them.

pub mod bus;
pub mod hub;
pub mod logging;
pub mod purchase;
pub mod stores;
pub mod widget;

pub use bus::{BusSender, FrameOrigin, MessageBus, Subscription};
pub use hub::{
    ConnectionError, ConnectionManager, ConnectionState, HubHandle, ReconnectConfig,
    TransportSignal,
};
pub use purchase::{CheckoutClient, CoinPack, PurchaseOutcome};
pub use stores::{
    ChatAuthor, ChatEntry, ChatTranscript, CoinWallet, OptionStanding, PendingVote,
    VoteAggregator, VOTE_LIMIT,
};
pub use widget::{PollWidget, WidgetConfig};
