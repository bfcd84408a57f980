//! The per-process messaging bus.

use crate::error::MessagingError;
use crate::link::BrokerLink;
use crate::message::{Envelope, Message, MessageKind};
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

type Subscriber = Arc<dyn Fn(&Envelope) + Send + Sync>;
type RpcResponder = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

/// Frames queued while the broker link is down, before publishes start
/// failing with [`MessagingError::QueueFull`].
const OFFLINE_QUEUE_CAP: usize = 256;

/// One container's connection to the fleet.
///
/// Publish/subscribe is keyed by [`MessageKind`]; RPC pairs a `Request`
/// with the matching `Response` through a correlation id. Frames published
/// by this container are never dispatched back to its own subscribers.
///
/// While the link is disconnected, publishes land in a bounded FIFO queue
/// that is flushed, in order, ahead of the first publish after the link
/// recovers. RPC calls made while disconnected simply time out.
pub struct MessagingBus {
    container_id: String,
    link: Arc<dyn BrokerLink>,
    subscribers: DashMap<MessageKind, Vec<Subscriber>>,
    responders: DashMap<String, RpcResponder>,
    pending: DashMap<Uuid, oneshot::Sender<Value>>,
    offline: Mutex<VecDeque<Envelope>>,
}

impl MessagingBus {
    pub fn new(container_id: impl Into<String>, link: Arc<dyn BrokerLink>) -> Arc<Self> {
        Arc::new(Self {
            container_id: container_id.into(),
            link,
            subscribers: DashMap::new(),
            responders: DashMap::new(),
            pending: DashMap::new(),
            offline: Mutex::new(VecDeque::new()),
        })
    }

    /// Spawns the dispatch loop. Nothing is delivered to subscribers until
    /// this is called; call it once, right after construction.
    pub fn start(self: &Arc<Self>) {
        let bus = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(frame) = bus.link.recv().await {
                if frame.sender == bus.container_id {
                    continue;
                }
                bus.dispatch(frame).await;
            }
            debug!(
                "broker link closed, dispatch loop for '{}' exiting",
                bus.container_id
            );
        });
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Frames currently waiting in the offline queue.
    pub fn queued(&self) -> usize {
        self.offline.lock().expect("offline queue poisoned").len()
    }

    /// Publishes `message` to every other container.
    ///
    /// On a healthy link any older queued frames are flushed first so
    /// per-publisher ordering holds across an outage. On a down link the
    /// message is queued instead; `Ok` here therefore means "accepted",
    /// not "delivered".
    pub async fn publish(&self, message: Message) -> Result<(), MessagingError> {
        let frame = Envelope {
            sender: self.container_id.clone(),
            message,
        };
        if !self.link.is_connected() {
            return self.enqueue(frame);
        }
        self.flush_offline().await;
        match self.link.send(&frame).await {
            Ok(()) => Ok(()),
            Err(MessagingError::Disconnected) => self.enqueue(frame),
            Err(e) => Err(e),
        }
    }

    /// Registers a handler for every incoming message of `kind` (frames
    /// from this container excluded). Handlers run on the dispatch loop:
    /// keep them short and never block in them.
    pub fn subscribe(&self, kind: MessageKind, handler: impl Fn(&Envelope) + Send + Sync + 'static) {
        self.subscribers
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Registers the responder for RPC requests of the given `kind`. One
    /// responder per kind per container; registering again replaces the
    /// previous one. Requests for kinds with no responder here are ignored,
    /// leaving them for whichever container does handle that kind.
    pub fn subscribe_rpc(
        &self,
        kind: impl Into<String>,
        handler: impl Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    ) {
        self.responders.insert(kind.into(), Arc::new(handler));
    }

    /// Sends an RPC request and awaits the correlated response.
    ///
    /// Fails with [`MessagingError::Timeout`] if no response arrives within
    /// `timeout`. The pending entry is removed on every exit path, including
    /// the caller dropping this future mid-await (e.g. losing a `select!`),
    /// so a straggler response is silently discarded rather than leaking a
    /// continuation.
    pub async fn request(
        &self,
        kind: impl Into<String>,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, MessagingError> {
        let correlation_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(correlation_id, tx);
        let _cleanup = PendingGuard {
            pending: &self.pending,
            correlation_id,
        };

        let message = Message::Request {
            correlation_id,
            kind: kind.into(),
            payload,
        };
        self.publish(message).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) | Err(_) => Err(MessagingError::Timeout),
        }
    }

    /// Spawns a ticker that publishes a `Ping` every `interval`, with
    /// metadata sampled fresh each tick. Runs for the life of the process.
    pub fn start_heartbeat(
        self: &Arc<Self>,
        interval: Duration,
        metadata: impl Fn() -> HashMap<String, String> + Send + Sync + 'static,
    ) {
        let bus = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let message = Message::Ping {
                    container_id: bus.container_id.clone(),
                    metadata: metadata(),
                };
                if let Err(e) = bus.publish(message).await {
                    debug!("heartbeat publish failed: {}", e);
                }
            }
        });
    }

    async fn dispatch(&self, frame: Envelope) {
        match &frame.message {
            Message::Response {
                correlation_id,
                payload,
            } => {
                if let Some((_, tx)) = self.pending.remove(correlation_id) {
                    let _ = tx.send(payload.clone());
                } else {
                    debug!("response with unknown correlation id {}", correlation_id);
                }
                return;
            }
            Message::Request {
                correlation_id,
                kind,
                payload,
            } => {
                let responder = self.responders.get(kind).map(|r| Arc::clone(r.value()));
                let Some(responder) = responder else { return };
                let reply = match responder(payload) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!("rpc responder for '{}' failed: {}", kind, e);
                        json!({ "error": e })
                    }
                };
                let response = Message::Response {
                    correlation_id: *correlation_id,
                    payload: reply,
                };
                if let Err(e) = self.publish(response).await {
                    warn!("failed to send rpc response: {}", e);
                }
                return;
            }
            _ => {}
        }

        let handlers = self
            .subscribers
            .get(&frame.message.kind())
            .map(|entry| entry.value().clone());
        if let Some(handlers) = handlers {
            for handler in handlers {
                handler(&frame);
            }
        }
    }

    fn enqueue(&self, frame: Envelope) -> Result<(), MessagingError> {
        let mut offline = self.offline.lock().expect("offline queue poisoned");
        if offline.len() >= OFFLINE_QUEUE_CAP {
            warn!(
                "offline queue full ({} frames), dropping {:?}",
                offline.len(),
                frame.message.kind()
            );
            return Err(MessagingError::QueueFull);
        }
        offline.push_back(frame);
        debug!("queued frame while disconnected ({} pending)", offline.len());
        Ok(())
    }

    async fn flush_offline(&self) {
        loop {
            let frame = {
                let mut offline = self.offline.lock().expect("offline queue poisoned");
                offline.pop_front()
            };
            let Some(frame) = frame else { return };
            if self.link.send(&frame).await.is_err() {
                // Link dropped again mid-flush; put it back for next time.
                self.offline
                    .lock()
                    .expect("offline queue poisoned")
                    .push_front(frame);
                return;
            }
        }
    }
}

/// Removes an in-flight request's correlation entry no matter how the
/// request future ends: response, timeout, publish failure, or the future
/// being dropped before completion.
struct PendingGuard<'a> {
    pending: &'a DashMap<Uuid, oneshot::Sender<Value>>,
    correlation_id: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.correlation_id);
    }
}

impl std::fmt::Debug for MessagingBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingBus")
            .field("container_id", &self.container_id)
            .field("connected", &self.is_connected())
            .field("queued", &self.queued())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LocalBroker;
    use crate::message::ChatDelivery;
    use tokio::sync::mpsc;

    const RECV_WINDOW: Duration = Duration::from_secs(1);

    fn pair(broker: &LocalBroker, id: &str) -> Arc<MessagingBus> {
        let bus = MessagingBus::new(id, broker.link());
        bus.start();
        bus
    }

    fn chat(text: &str) -> Message {
        Message::ChatRelay {
            target_player: Uuid::new_v4(),
            text: text.to_string(),
            delivery: ChatDelivery::Chat,
        }
    }

    async fn expect_text(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
        tokio::time::timeout(RECV_WINDOW, rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn publish_reaches_other_containers_but_not_self() {
        let broker = LocalBroker::new();
        let alpha = pair(&broker, "alpha");
        let beta = pair(&broker, "beta");

        let (beta_tx, mut beta_rx) = mpsc::unbounded_channel();
        beta.subscribe(MessageKind::ChatRelay, move |frame| {
            beta_tx.send(frame.sender.clone()).unwrap();
        });
        let (alpha_tx, mut alpha_rx) = mpsc::unbounded_channel();
        alpha.subscribe(MessageKind::ChatRelay, move |frame| {
            alpha_tx.send(frame.sender.clone()).unwrap();
        });

        alpha.publish(chat("hello")).await.unwrap();

        assert_eq!(expect_text(&mut beta_rx).await, "alpha");
        // Alpha must not hear its own publish.
        let echo = tokio::time::timeout(Duration::from_millis(100), alpha_rx.recv()).await;
        assert!(echo.is_err());
    }

    #[tokio::test]
    async fn rpc_round_trips_between_containers() {
        let broker = LocalBroker::new();
        let caller = pair(&broker, "caller");
        let server = pair(&broker, "server");

        server.subscribe_rpc("find_instance", |payload| {
            let game_type = payload["game_type"].as_str().unwrap_or_default();
            Ok(json!({ "instance": format!("{game_type}-1"), "slots": 8 }))
        });

        let reply = caller
            .request(
                "find_instance",
                json!({ "game_type": "skywars" }),
                RECV_WINDOW,
            )
            .await
            .unwrap();
        assert_eq!(reply["instance"], "skywars-1");
        assert_eq!(reply["slots"], 8);
    }

    #[tokio::test]
    async fn rpc_without_responder_times_out() {
        let broker = LocalBroker::new();
        let caller = pair(&broker, "caller");
        let _silent = pair(&broker, "silent");

        let err = caller
            .request("nobody_home", json!({}), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::Timeout));
    }

    #[tokio::test]
    async fn dropped_request_future_releases_its_pending_slot() {
        let broker = LocalBroker::new();
        let caller = pair(&broker, "caller");
        let _silent = pair(&broker, "silent");

        let request = caller.request("nobody_home", json!({}), Duration::from_secs(30));
        tokio::select! {
            _ = request => panic!("no responder, the request cannot complete"),
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }
        assert_eq!(caller.pending.len(), 0);
    }

    #[tokio::test]
    async fn rpc_responder_error_is_reported_in_payload() {
        let broker = LocalBroker::new();
        let caller = pair(&broker, "caller");
        let server = pair(&broker, "server");

        server.subscribe_rpc("always_fails", |_| Err("no capacity".to_string()));

        let reply = caller
            .request("always_fails", json!({}), RECV_WINDOW)
            .await
            .unwrap();
        assert_eq!(reply["error"], "no capacity");
    }

    #[tokio::test]
    async fn offline_publishes_queue_and_flush_in_order() {
        let broker = LocalBroker::new();
        let link = broker.link();
        let sender = MessagingBus::new("sender", Arc::clone(&link) as Arc<dyn BrokerLink>);
        sender.start();
        let receiver = pair(&broker, "receiver");

        let (tx, mut rx) = mpsc::unbounded_channel();
        receiver.subscribe(MessageKind::ChatRelay, move |frame| {
            if let Message::ChatRelay { text, .. } = &frame.message {
                tx.send(text.clone()).unwrap();
            }
        });

        link.set_connected(false);
        sender.publish(chat("first")).await.unwrap();
        sender.publish(chat("second")).await.unwrap();
        assert_eq!(sender.queued(), 2);

        link.set_connected(true);
        sender.publish(chat("third")).await.unwrap();
        assert_eq!(sender.queued(), 0);

        assert_eq!(expect_text(&mut rx).await, "first");
        assert_eq!(expect_text(&mut rx).await, "second");
        assert_eq!(expect_text(&mut rx).await, "third");
    }

    #[tokio::test]
    async fn offline_queue_is_bounded() {
        let broker = LocalBroker::new();
        let link = broker.link();
        let sender = MessagingBus::new("sender", Arc::clone(&link) as Arc<dyn BrokerLink>);
        sender.start();

        link.set_connected(false);
        for i in 0..OFFLINE_QUEUE_CAP {
            sender.publish(chat(&format!("msg {i}"))).await.unwrap();
        }
        let err = sender.publish(chat("one too many")).await.unwrap_err();
        assert!(matches!(err, MessagingError::QueueFull));
        assert_eq!(sender.queued(), OFFLINE_QUEUE_CAP);
    }

    #[tokio::test]
    async fn heartbeat_publishes_pings_with_metadata() {
        let broker = LocalBroker::new();
        let beating = pair(&broker, "beating");
        let watcher = pair(&broker, "watcher");

        let (tx, mut rx) = mpsc::unbounded_channel();
        watcher.subscribe(MessageKind::Ping, move |frame| {
            if let Message::Ping { metadata, .. } = &frame.message {
                tx.send(metadata.get("instances").cloned().unwrap_or_default())
                    .unwrap();
            }
        });

        beating.start_heartbeat(Duration::from_millis(10), || {
            HashMap::from([("instances".to_string(), "3".to_string())])
        });

        assert_eq!(expect_text(&mut rx).await, "3");
    }
}
