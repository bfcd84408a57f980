//! Wire message types exchanged between containers.
//!
//! Everything on the wire is a JSON [`Envelope`] carrying the sending
//! container's identifier plus one [`Message`] variant, tagged by `type`.
//! Containers skip frames whose sender matches their own identifier, so a
//! broker that echoes publishes back to the publisher is fine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// One frame on the broker: the publishing container plus its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: String,
    pub message: Message,
}

/// How a relayed chat payload should be rendered on the receiving end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatDelivery {
    Chat,
    ActionBar,
    Title,
}

/// Cross-container messages.
///
/// `Request` and `Response` pair up through `correlation_id`; everything
/// else is fire-and-forget pub/sub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Periodic liveness beacon. `metadata` carries whatever the container
    /// wants observers to see (instance count, player count, build info).
    Ping {
        container_id: String,
        metadata: HashMap<String, String>,
    },
    /// A game instance became ready on some container.
    InstanceCreated {
        container_id: String,
        instance_id: Uuid,
        game_type: String,
        map_name: String,
    },
    /// A game instance was destroyed on some container.
    InstanceRemoved {
        container_id: String,
        instance_id: Uuid,
    },
    /// Deliver text to a player who may be connected to another container.
    ChatRelay {
        target_player: Uuid,
        text: String,
        delivery: ChatDelivery,
    },
    /// RPC call; the handling container answers with a `Response` carrying
    /// the same correlation id.
    Request {
        correlation_id: Uuid,
        kind: String,
        payload: Value,
    },
    /// RPC answer, routed back to the requester by correlation id.
    Response {
        correlation_id: Uuid,
        payload: Value,
    },
}

/// Discriminant used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Ping,
    InstanceCreated,
    InstanceRemoved,
    ChatRelay,
    Request,
    Response,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Ping { .. } => MessageKind::Ping,
            Message::InstanceCreated { .. } => MessageKind::InstanceCreated,
            Message::InstanceRemoved { .. } => MessageKind::InstanceRemoved,
            Message::ChatRelay { .. } => MessageKind::ChatRelay,
            Message::Request { .. } => MessageKind::Request,
            Message::Response { .. } => MessageKind::Response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn messages_round_trip_through_tagged_json() {
        let envelope = Envelope {
            sender: "container-7".to_string(),
            message: Message::InstanceCreated {
                container_id: "container-7".to_string(),
                instance_id: Uuid::new_v4(),
                game_type: "bedwars".to_string(),
                map_name: "arenas/castle".to_string(),
            },
        };
        let wire = serde_json::to_string(&envelope).unwrap();
        assert!(wire.contains("\"type\":\"instance_created\""));

        let back: Envelope = serde_json::from_str(&wire).unwrap();
        assert_eq!(back.sender, "container-7");
        assert_eq!(back.message.kind(), MessageKind::InstanceCreated);
    }

    #[test]
    fn request_payload_is_arbitrary_json() {
        let message = Message::Request {
            correlation_id: Uuid::new_v4(),
            kind: "find_instance".to_string(),
            payload: json!({"game_type": "skywars", "min_slots": 4}),
        };
        let wire = serde_json::to_value(&message).unwrap();
        assert_eq!(wire["kind"], "find_instance");
        assert_eq!(wire["payload"]["min_slots"], 4);
    }
}
