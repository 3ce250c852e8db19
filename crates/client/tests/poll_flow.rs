//! End-to-end widget session against a simulated hub.

use crowdplay_client::{
    ConnectionError, ConnectionManager, ConnectionState, FrameOrigin, PollWidget, WidgetConfig,
};
use crowdplay_shared::{ClientInvoke, HubEnvelope, ServerPush, VoteError, VoteOption, VoteTally, WidgetEvent};
use serde_json::json;

fn challenge_options() -> Vec<VoteOption> {
    vec![
        VoteOption {
            id: "option-a".to_string(),
            label: "Make Circle Smaller".to_string(),
            description: "Shrink the circle to make standing harder".to_string(),
            server_votes: 0,
        },
        VoteOption {
            id: "option-b".to_string(),
            label: "Stand on One Foot".to_string(),
            description: "Force the player to stand on one foot".to_string(),
            server_votes: 0,
        },
    ]
}

fn mounted_widget() -> PollWidget {
    let mut config = WidgetConfig::new("ws://hub.test/widget", challenge_options());
    config.auto_start = false;
    config.starting_balance = 2000;
    config.vote_limit = 2000;
    PollWidget::mount(config).expect("mount")
}

fn vote_update(tallies: Vec<(&str, u32)>) -> HubEnvelope<ServerPush> {
    HubEnvelope::new(ServerPush::VoteUpdate(
        tallies
            .into_iter()
            .map(|(id, votes)| VoteTally {
                id: id.to_string(),
                votes,
            })
            .collect(),
    ))
}

fn total_of(widget: &PollWidget, id: &str) -> u32 {
    widget
        .standings()
        .into_iter()
        .find(|standing| standing.id == id)
        .map(|standing| standing.total)
        .expect("registered option")
}

#[test]
fn vote_reconcile_and_rejection_flow() {
    let widget = mounted_widget();
    assert_eq!(
        widget.bus().drain_outbox(),
        vec![WidgetEvent::Init {
            widget: "poll".to_string()
        }]
    );

    // Optimistic cast: debit and increment are immediate, the submission
    // itself is best-effort (the hub is not connected here).
    widget.cast_vote("option-a", 10).expect("first cast");
    assert_eq!(total_of(&widget, "option-a"), 10);
    assert_eq!(widget.balance(), 1990);

    // The authoritative broadcast overwrites the optimistic total and
    // leaves the wallet alone.
    widget.hub().handle_push(vote_update(vec![("option-a", 15)]));
    assert_eq!(total_of(&widget, "option-a"), 15);
    assert_eq!(widget.balance(), 1990);

    // A cast that would overshoot the limit is rejected wholesale.
    assert!(matches!(
        widget.cast_vote("option-b", 2000),
        Err(VoteError::LimitExceeded { .. })
    ));
    assert_eq!(widget.balance(), 1990);
    assert_eq!(total_of(&widget, "option-b"), 0);

    // Drain the wallet, then hit the purchase-flow trigger.
    widget.hub().handle_push(vote_update(vec![("option-a", 15)]));
    widget.cast_vote("option-b", 1990).expect("drain the wallet");
    assert_eq!(widget.balance(), 0);

    widget.hub().handle_push(vote_update(vec![("option-b", 1990)]));
    assert!(matches!(
        widget.cast_vote("option-b", 5),
        Err(VoteError::InsufficientFunds(_))
    ));
    assert_eq!(widget.balance(), 0);
    assert_eq!(total_of(&widget, "option-b"), 1990);
}

#[test]
fn chat_crosses_both_boundaries() {
    let widget = mounted_widget();
    widget.bus().drain_outbox();

    // Hub chat is transcribed and forwarded to the host.
    widget
        .hub()
        .handle_push(HubEnvelope::new(ServerPush::ReceiveMessage(
            "hub says hi".to_string(),
        )));
    assert_eq!(
        widget.bus().drain_outbox(),
        vec![WidgetEvent::ChatMessage {
            message: "hub says hi".to_string()
        }]
    );

    // Host chat is transcribed; garbage is dropped before any handler.
    widget.bus().deliver(
        json!({"type": "chatMessage", "payload": {"message": "host says hi"}}),
        FrameOrigin::Host,
    );
    widget
        .bus()
        .deliver(json!({"type": "bogus"}), FrameOrigin::Host);
    widget.bus().deliver(
        json!({"type": "chatMessage", "payload": {"message": "spoofed"}}),
        FrameOrigin::Unknown,
    );

    let transcript = widget.transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[1].text, "host says hi");
    assert_eq!(widget.bus().dropped_count(), 2);
}

#[tokio::test]
async fn start_fails_fast_against_an_unreachable_hub() {
    crowdplay_client::logging::init();

    // Bind-then-drop so the port is guaranteed closed.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };

    let manager = ConnectionManager::new(format!("ws://127.0.0.1:{port}/widgethub"));
    manager.start().expect("first start");
    assert_eq!(manager.start(), Err(ConnectionError::AlreadyStarted));

    // The transport reports the failed initial attempt and the manager
    // settles back on Disconnected.
    let mut settled = false;
    for _ in 0..50 {
        if manager.state() == ConnectionState::Disconnected {
            settled = true;
            break;
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
    assert!(settled, "manager never settled after a failed connect");

    // Sends while down are dropped with a warning signal, not a panic.
    assert!(matches!(
        manager.send(ClientInvoke::RequestVotes),
        Err(ConnectionError::NotConnected(_))
    ));

    manager.stop();
    manager.stop();
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}
