//! Broker transports.
//!
//! [`BrokerLink`] is the seam between the bus and the wire. Production uses
//! [`TcpBrokerLink`], which maintains a reconnecting TCP session to the
//! broker and frames envelopes as newline-delimited JSON. Tests and
//! single-process deployments use [`LocalBroker`], an in-memory fan-out
//! with a switch for simulating outages.

use crate::error::MessagingError;
use crate::message::Envelope;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, info, warn};

/// A connection to the broker, from the bus's point of view.
///
/// Implementations own their delivery semantics; the bus only assumes
/// best-effort, per-sender FIFO. `recv` returning `None` means the link is
/// permanently closed (not merely disconnected — a reconnecting link keeps
/// the caller parked until a frame arrives).
#[async_trait]
pub trait BrokerLink: Send + Sync {
    async fn send(&self, frame: &Envelope) -> Result<(), MessagingError>;
    async fn recv(&self) -> Option<Envelope>;
    fn is_connected(&self) -> bool;
}

const LOCAL_FANOUT_CAPACITY: usize = 1024;

/// In-memory broker: every frame sent through any link is fanned out to all
/// links, sender included. The bus is responsible for skipping its own
/// frames, exactly as with a real broker that echoes publishes.
pub struct LocalBroker {
    fanout: broadcast::Sender<Envelope>,
}

impl LocalBroker {
    pub fn new() -> Self {
        let (fanout, _) = broadcast::channel(LOCAL_FANOUT_CAPACITY);
        Self { fanout }
    }

    /// A new link attached to this broker. Frames sent before the link was
    /// created are not replayed.
    pub fn link(&self) -> Arc<LocalBrokerLink> {
        Arc::new(LocalBrokerLink {
            fanout: self.fanout.clone(),
            inbound: Mutex::new(self.fanout.subscribe()),
            connected: AtomicBool::new(true),
        })
    }
}

impl Default for LocalBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// One endpoint on a [`LocalBroker`].
pub struct LocalBrokerLink {
    fanout: broadcast::Sender<Envelope>,
    inbound: Mutex<broadcast::Receiver<Envelope>>,
    connected: AtomicBool,
}

impl LocalBrokerLink {
    /// Simulates the link going down (or coming back). While down, `send`
    /// fails with [`MessagingError::Disconnected`] and inbound frames for
    /// this link are discarded.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl BrokerLink for LocalBrokerLink {
    async fn send(&self, frame: &Envelope) -> Result<(), MessagingError> {
        if !self.is_connected() {
            return Err(MessagingError::Disconnected);
        }
        // A send with zero receivers is fine: nobody is listening yet.
        let _ = self.fanout.send(frame.clone());
        Ok(())
    }

    async fn recv(&self) -> Option<Envelope> {
        let mut inbound = self.inbound.lock().await;
        loop {
            match inbound.recv().await {
                Ok(frame) if self.is_connected() => return Some(frame),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("local broker link lagged, dropped {} frames", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

const OUTBOUND_CAPACITY: usize = 1024;
const INBOUND_CAPACITY: usize = 1024;
const RECONNECT_MIN: Duration = Duration::from_millis(500);
const RECONNECT_MAX: Duration = Duration::from_secs(10);

/// TCP session to the broker with automatic reconnection.
///
/// Frames are single-line JSON envelopes. The connection is owned by a
/// background task; `send` and `recv` talk to it through channels, so the
/// bus never observes a half-open socket. Between sessions `is_connected`
/// reports false and `send` fails fast, letting the bus queue locally.
pub struct TcpBrokerLink {
    outbound: mpsc::Sender<Envelope>,
    inbound: Mutex<mpsc::Receiver<Envelope>>,
    connected: Arc<AtomicBool>,
}

impl TcpBrokerLink {
    /// Starts the session task for `addr`. Returns immediately; the first
    /// connection attempt happens in the background.
    pub fn connect(addr: impl Into<String>) -> Arc<Self> {
        let addr = addr.into();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));

        tokio::spawn(session_loop(
            addr,
            outbound_rx,
            inbound_tx,
            Arc::clone(&connected),
        ));

        Arc::new(Self {
            outbound: outbound_tx,
            inbound: Mutex::new(inbound_rx),
            connected,
        })
    }
}

#[async_trait]
impl BrokerLink for TcpBrokerLink {
    async fn send(&self, frame: &Envelope) -> Result<(), MessagingError> {
        if !self.is_connected() {
            return Err(MessagingError::Disconnected);
        }
        self.outbound
            .send(frame.clone())
            .await
            .map_err(|_| MessagingError::Disconnected)
    }

    async fn recv(&self) -> Option<Envelope> {
        self.inbound.lock().await.recv().await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Owns the socket for the lifetime of the link: connect, pump frames both
/// ways, and on any error tear the session down and retry with backoff.
async fn session_loop(
    addr: String,
    mut outbound: mpsc::Receiver<Envelope>,
    inbound: mpsc::Sender<Envelope>,
    connected: Arc<AtomicBool>,
) {
    let mut backoff = RECONNECT_MIN;
    loop {
        let stream = match TcpStream::connect(&addr).await {
            Ok(stream) => {
                info!("connected to broker at {}", addr);
                backoff = RECONNECT_MIN;
                stream
            }
            Err(e) => {
                if inbound.is_closed() {
                    return;
                }
                debug!("broker connect to {} failed: {}, retrying in {:?}", addr, e, backoff);
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(RECONNECT_MAX);
                continue;
            }
        };

        connected.store(true, Ordering::SeqCst);
        run_session(stream, &mut outbound, &inbound).await;
        connected.store(false, Ordering::SeqCst);
        warn!("broker session to {} ended, reconnecting", addr);

        if inbound.is_closed() {
            // The link itself was dropped; stop retrying.
            return;
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(RECONNECT_MAX);
    }
}

/// Pumps one established session until either direction fails.
async fn run_session(
    stream: TcpStream,
    outbound: &mut mpsc::Receiver<Envelope>,
    inbound: &mpsc::Sender<Envelope>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else { return };
                let mut wire = match serde_json::to_vec(&frame) {
                    Ok(wire) => wire,
                    Err(e) => {
                        warn!("dropping unencodable frame: {}", e);
                        continue;
                    }
                };
                wire.push(b'\n');
                if let Err(e) = write_half.write_all(&wire).await {
                    warn!("broker write failed: {}", e);
                    return;
                }
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        debug!("broker closed the connection");
                        return;
                    }
                    Err(e) => {
                        warn!("broker read failed: {}", e);
                        return;
                    }
                };
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Envelope>(&line) {
                    Ok(envelope) => {
                        if inbound.send(envelope).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!("discarding malformed broker frame: {}", e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ChatDelivery, Message};
    use uuid::Uuid;

    fn chat_frame(sender: &str) -> Envelope {
        Envelope {
            sender: sender.to_string(),
            message: Message::ChatRelay {
                target_player: Uuid::new_v4(),
                text: "hello".to_string(),
                delivery: ChatDelivery::Chat,
            },
        }
    }

    #[tokio::test]
    async fn local_broker_fans_out_to_all_links() {
        let broker = LocalBroker::new();
        let a = broker.link();
        let b = broker.link();

        a.send(&chat_frame("a")).await.unwrap();

        let received = b.recv().await.unwrap();
        assert_eq!(received.sender, "a");
        // The sender gets its own frame back, like a real echoing broker.
        let echoed = a.recv().await.unwrap();
        assert_eq!(echoed.sender, "a");
    }

    #[tokio::test]
    async fn disconnected_link_rejects_sends() {
        let broker = LocalBroker::new();
        let link = broker.link();
        link.set_connected(false);

        let err = link.send(&chat_frame("a")).await.unwrap_err();
        assert!(matches!(err, MessagingError::Disconnected));

        link.set_connected(true);
        assert!(link.send(&chat_frame("a")).await.is_ok());
    }
}
