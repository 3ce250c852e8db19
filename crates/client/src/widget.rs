//! Mount/unmount wiring for a widget session: ties the frame bus, the hub
//! connection, and the session stores together.

use std::sync::Arc;

use crowdplay_shared::{ClientInvoke, ServerPush, VoteError, VoteOption, WidgetEvent};
use parking_lot::Mutex;

use crate::bus::MessageBus;
use crate::hub::{ConnectionError, ConnectionManager, ConnectionState};
use crate::purchase::PurchaseOutcome;
use crate::stores::{
    ChatAuthor, ChatEntry, ChatTranscript, CoinWallet, OptionStanding, VoteAggregator, VOTE_LIMIT,
};

/// Coins handed to a fresh session.
pub const STARTING_BALANCE: u32 = 2_000;

/// Everything needed to mount a widget session.
#[derive(Debug, Clone)]
pub struct WidgetConfig {
    /// Full URL of the real-time hub endpoint.
    pub hub_url: String,
    /// Name reported to the host in the `init` event.
    pub widget_name: String,
    pub starting_balance: u32,
    pub options: Vec<VoteOption>,
    pub vote_limit: u32,
    /// Start the hub connection during mount. Disable when the embedder
    /// drives [`ConnectionManager::start`] itself.
    pub auto_start: bool,
}

impl WidgetConfig {
    pub fn new(hub_url: impl Into<String>, options: Vec<VoteOption>) -> Self {
        Self {
            hub_url: hub_url.into(),
            widget_name: "poll".to_string(),
            starting_balance: STARTING_BALANCE,
            options,
            vote_limit: VOTE_LIMIT,
            auto_start: true,
        }
    }
}

/// A mounted widget session.
pub struct PollWidget {
    bus: MessageBus,
    hub: ConnectionManager,
    wallet: Arc<Mutex<CoinWallet>>,
    votes: Arc<Mutex<VoteAggregator>>,
    chat: Arc<Mutex<ChatTranscript>>,
}

impl PollWidget {
    /// Wire up a session: register hub listeners and bus handlers, announce
    /// readiness to the host, and (by default) start the hub connection.
    pub fn mount(config: WidgetConfig) -> Result<Self, ConnectionError> {
        let hub = ConnectionManager::new(&config.hub_url);
        let handle = hub.handle();
        let wallet = Arc::new(Mutex::new(CoinWallet::new(config.starting_balance)));
        let votes = Arc::new(Mutex::new(VoteAggregator::with_limit(
            config.options,
            wallet.clone(),
            handle.clone(),
            config.vote_limit,
        )));
        let chat = Arc::new(Mutex::new(ChatTranscript::default()));
        let bus = MessageBus::new();

        // Server chat goes to the transcript and is forwarded to the host.
        {
            let chat = chat.clone();
            let host = bus.sender();
            hub.on(
                ServerPush::RECEIVE_MESSAGE,
                Box::new(move |push| {
                    if let ServerPush::ReceiveMessage(message) = push {
                        chat.lock().push(ChatAuthor::Server, message.clone());
                        host.send(&WidgetEvent::ChatMessage {
                            message: message.clone(),
                        });
                    }
                }),
            );
        }

        // Vote broadcasts reconcile the aggregator and acknowledge any
        // in-flight cast.
        {
            let votes = votes.clone();
            hub.on(
                ServerPush::VOTE_UPDATE,
                Box::new(move |push| {
                    if let ServerPush::VoteUpdate(tallies) = push {
                        votes.lock().reconcile(tallies);
                    }
                }),
            );
        }

        // Ask for fresh totals on every (re)connect.
        {
            let handle = handle.clone();
            hub.on_state(Box::new(move |state| {
                if state.is_connected() {
                    let _ = handle.invoke(ClientInvoke::RequestVotes);
                }
            }));
        }

        // Host chat lands in the transcript; a host-side close request is
        // logged and left to the embedder.
        {
            let chat = chat.clone();
            bus.on_message(move |event| match event {
                WidgetEvent::ChatMessage { message } => {
                    chat.lock().push(ChatAuthor::Host, message.clone());
                }
                WidgetEvent::CloseWidget => {
                    crate::log_info!("host requested widget close");
                }
                WidgetEvent::Init { .. } | WidgetEvent::PaymentSuccess { .. } => {}
            });
        }

        bus.send(&WidgetEvent::Init {
            widget: config.widget_name.clone(),
        });

        if config.auto_start {
            hub.start()?;
        }

        Ok(Self {
            bus,
            hub,
            wallet,
            votes,
            chat,
        })
    }

    /// Cast a vote. `InsufficientFunds` is the caller's cue to open the
    /// purchase flow; every other rejection is a poll-state error.
    pub fn cast_vote(&self, option_id: &str, amount: u32) -> Result<(), VoteError> {
        self.votes.lock().cast_vote(option_id, amount)
    }

    /// Send a chat line: hub broadcast, own-transcript echo, host notify.
    pub fn send_chat(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let _ = self.hub.send(ClientInvoke::SendMessage(text.to_string()));
        self.chat.lock().push(ChatAuthor::Me, text);
        self.bus.send(&WidgetEvent::ChatMessage {
            message: text.to_string(),
        });
    }

    /// Apply the terminal signal from the purchase collaborator.
    pub fn apply_purchase(&self, outcome: PurchaseOutcome) {
        match outcome {
            PurchaseOutcome::Success { coins, session_id } => {
                self.wallet.lock().add(coins);
                self.bus.send(&WidgetEvent::PaymentSuccess { session_id });
            }
            PurchaseOutcome::Failure(message) => {
                crate::log_warn!("purchase failed: {}", message);
            }
        }
    }

    pub fn balance(&self) -> u32 {
        self.wallet.lock().balance()
    }

    pub fn standings(&self) -> Vec<OptionStanding> {
        self.votes.lock().standings()
    }

    pub fn is_poll_closed(&self) -> bool {
        self.votes.lock().is_closed()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.hub.state()
    }

    pub fn transcript(&self) -> Vec<ChatEntry> {
        self.chat.lock().entries().to_vec()
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn hub(&self) -> &ConnectionManager {
        &self.hub
    }

    /// Tear the session down: stop the hub, emit the final `closeWidget`,
    /// release the bus. In-flight submissions are not retried; applied
    /// debits and optimistic increments stand.
    pub fn unmount(self) {
        self.hub.stop();
        self.bus.close();
    }
}
