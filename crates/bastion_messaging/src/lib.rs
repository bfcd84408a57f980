//! # Bastion Messaging
//!
//! Cross-process coordination for a fleet of Bastion server processes. Each
//! process ("container") connects one [`MessagingBus`] to a shared broker
//! and uses it to announce game-instance placement (`InstanceCreated` /
//! `InstanceRemoved`), relay chat and notifications across processes, send
//! heartbeats, and perform correlated request/response exchanges.
//!
//! Delivery is best-effort, at-least-once, with per-publisher FIFO only —
//! nothing here is a durable log, and nothing requiring exactly-once
//! semantics should be built on it. Callers must tolerate
//! [`MessagingBus::is_connected`] being false at any time (broker restart,
//! partition): publishing degrades to a bounded local queue that is flushed
//! in order once the link comes back, and RPC calls fail with
//! [`MessagingError::Timeout`] rather than suspending forever.
//!
//! The transport seam is [`BrokerLink`]: production uses
//! [`TcpBrokerLink`] (newline-delimited JSON frames with a reconnect loop);
//! tests and single-process deployments use [`LocalBroker`].

mod bus;
mod error;
mod link;
mod message;

pub use bus::MessagingBus;
pub use error::MessagingError;
pub use link::{BrokerLink, LocalBroker, LocalBrokerLink, TcpBrokerLink};
pub use message::{ChatDelivery, Envelope, Message, MessageKind};
