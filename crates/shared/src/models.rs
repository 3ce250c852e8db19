//! Data models for the widget core: cross-frame events, hub frames, and
//! vote options.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Cross-frame events ---

/// Event exchanged between the widget and its host frame.
///
/// Wire form is `{"type": ..., "payload": ...}` and the payload shape is
/// fully determined by the tag. Anything that does not deserialize into one
/// of these four variants is not a valid widget event and is dropped at the
/// bus boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum WidgetEvent {
    /// The widget finished mounting and is ready for host traffic.
    Init { widget: String },
    /// A chat line crossing the frame boundary, in either direction.
    ChatMessage { message: String },
    /// The hosted checkout flow completed for the given session.
    #[serde(rename_all = "camelCase")]
    PaymentSuccess { session_id: String },
    /// The widget is about to tear down (or the host asks it to).
    CloseWidget,
}

// --- Voting ---

/// A voteable option as registered when the poll context loads.
///
/// Identity is `id`. `server_votes` is the authoritative total and is only
/// ever written from server broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VoteOption {
    pub id: String,
    pub label: String,
    pub description: String,
    #[serde(default)]
    pub server_votes: u32,
}

/// One entry of a `VoteUpdate` broadcast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VoteTally {
    pub id: String,
    pub votes: u32,
}

// --- Hub frames ---

/// Envelope wrapping every hub frame in both directions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HubEnvelope<T> {
    pub id: String,
    #[serde(flatten)]
    pub payload: T,
    pub ts: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl<T> HubEnvelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            ts: Utc::now(),
            correlation_id: None,
        }
    }

    /// Wrap a payload with a correlation id for tracking replies.
    pub fn with_correlation(payload: T, correlation_id: impl Into<String>) -> Self {
        let mut envelope = Self::new(payload);
        envelope.correlation_id = Some(correlation_id.into());
        envelope
    }
}

/// Client-to-hub invocations. Arguments are positional, SignalR style.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "method", content = "args")]
pub enum ClientInvoke {
    /// Broadcast a chat line to the other participants.
    SendMessage(String),
    /// Ask the hub for the current vote totals.
    RequestVotes,
    /// Submit `amount` coins onto an option; the hub aggregates and
    /// rebroadcasts a `VoteUpdate`.
    SubmitVote(String, u32),
}

impl ClientInvoke {
    pub fn method(&self) -> &'static str {
        match self {
            ClientInvoke::SendMessage(_) => "SendMessage",
            ClientInvoke::RequestVotes => "RequestVotes",
            ClientInvoke::SubmitVote(..) => "SubmitVote",
        }
    }
}

/// Hub-to-client pushes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "method", content = "args")]
pub enum ServerPush {
    /// A relayed chat line.
    ReceiveMessage(String),
    /// Authoritative per-option totals.
    VoteUpdate(Vec<VoteTally>),
}

impl ServerPush {
    pub const RECEIVE_MESSAGE: &'static str = "ReceiveMessage";
    pub const VOTE_UPDATE: &'static str = "VoteUpdate";

    pub fn method(&self) -> &'static str {
        match self {
            ServerPush::ReceiveMessage(_) => Self::RECEIVE_MESSAGE,
            ServerPush::VoteUpdate(_) => Self::VOTE_UPDATE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn widget_event_wire_shape() {
        let event = WidgetEvent::ChatMessage {
            message: "hello".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"type": "chatMessage", "payload": {"message": "hello"}})
        );

        let event = WidgetEvent::PaymentSuccess {
            session_id: "cs_123".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"type": "paymentSuccess", "payload": {"sessionId": "cs_123"}})
        );
    }

    #[test]
    fn close_widget_has_no_payload() {
        let value = serde_json::to_value(&WidgetEvent::CloseWidget).unwrap();
        assert_eq!(value, json!({"type": "closeWidget"}));

        let parsed: WidgetEvent = serde_json::from_value(json!({"type": "closeWidget"})).unwrap();
        assert_eq!(parsed, WidgetEvent::CloseWidget);
    }

    #[test]
    fn malformed_events_are_rejected() {
        // Unknown tag.
        assert!(serde_json::from_value::<WidgetEvent>(json!({"type": "bogus", "payload": {}}))
            .is_err());
        // Payload missing its required field.
        assert!(
            serde_json::from_value::<WidgetEvent>(json!({"type": "chatMessage", "payload": {}}))
                .is_err()
        );
        // Payload field of the wrong type.
        assert!(serde_json::from_value::<WidgetEvent>(
            json!({"type": "init", "payload": {"widget": 42}})
        )
        .is_err());
    }

    #[test]
    fn invoke_args_are_positional() {
        let envelope = HubEnvelope::new(ClientInvoke::SubmitVote("harder-circle".to_string(), 10));
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["method"], json!("SubmitVote"));
        assert_eq!(value["args"], json!(["harder-circle", 10]));
        assert!(value.get("correlationId").is_none());

        let value =
            serde_json::to_value(HubEnvelope::new(ClientInvoke::RequestVotes)).unwrap();
        assert_eq!(value["method"], json!("RequestVotes"));
    }

    #[test]
    fn vote_update_decodes_from_the_wire() {
        let envelope: HubEnvelope<ServerPush> = serde_json::from_value(json!({
            "id": "f2b9",
            "method": "VoteUpdate",
            "args": [{"id": "kfc", "votes": 30}, {"id": "shawarma", "votes": 12}],
            "ts": "2026-08-07T12:00:00Z"
        }))
        .unwrap();
        match envelope.payload {
            ServerPush::VoteUpdate(tallies) => {
                assert_eq!(tallies.len(), 2);
                assert_eq!(tallies[0].id, "kfc");
                assert_eq!(tallies[0].votes, 30);
            }
            other => panic!("unexpected push: {other:?}"),
        }
    }

    #[test]
    fn correlation_id_round_trips() {
        let envelope =
            HubEnvelope::with_correlation(ClientInvoke::SendMessage("gg".to_string()), "n-1");
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["correlationId"], json!("n-1"));
    }
}
