//! Publish/subscribe client core.
//!
//! The pieces, leaves first:
//!
//! - [`codec`]: the wire format behind the [`Framing`](codec::Framing) seam,
//!   with an MQTT 3.1.1 implementation.
//! - [`session`]: handshake, keep-alive and graceful close over a transport.
//! - [`registry`]: topic → handler routing table.
//! - [`dispatcher`]: turns inbound bytes into events, resynchronising after
//!   corrupt frames.
//! - [`client`]: the public surface and the reconnecting run loop.
//!
//! ```text
//! Client ──► Session ──► Transport ⇄ broker
//!   ▲                        │
//!   │                        ▼
//!   └── Registry ◄──── Dispatcher
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use libpubsub::credentials::Credentials;
//! use libpubsub::pubsub::{Client, Message, Options};
//! # use libpubsub::network::{Close, Connect, Connection, Read, Write};
//! # use libpubsub::time::Clock;
//! # struct Wifi;
//! # struct Socket;
//! # impl Read for Socket { type Error = (); fn read(&mut self, _: &mut [u8]) -> Result<usize, ()> { Ok(0) } }
//! # impl Write for Socket {
//! #     type Error = ();
//! #     fn write(&mut self, b: &[u8]) -> Result<usize, ()> { Ok(b.len()) }
//! #     fn flush(&mut self) -> Result<(), ()> { Ok(()) }
//! # }
//! # impl Close for Socket { type Error = (); fn close(self) -> Result<(), ()> { Ok(()) } }
//! # impl Connection for Socket {}
//! # impl Connect for Wifi {
//! #     type Connection = Socket;
//! #     type Error = ();
//! #     fn connect(&mut self, _: &str, _: u16) -> Result<Socket, ()> { Ok(Socket) }
//! # }
//! # struct Timer;
//! # impl Clock for Timer { fn now_ms(&self) -> u64 { 0 } fn delay_ms(&mut self, _: u32) {} }
//!
//! let mut on_digital = |message: &Message| {
//!     let _on = message.payload_str() == Some("1");
//! };
//!
//! let credentials = Credentials::new("broker.example.com", "porch-light", "alice", "token").unwrap();
//! let mut client = Client::new(Wifi, credentials, Timer, Options::default());
//! client.subscribe("alice/feeds/digital", &mut on_digital).unwrap();
//! client.connect().unwrap();
//! client.run_loop(true);
//! ```

pub mod client;
pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod session;
pub mod topic;

pub use client::{Client, Status};
pub use codec::{DecodedEvent, Framing, Mqtt311};
pub use dispatcher::Dispatcher;
pub use error::{
    ConnectError, ConnectReturnCode, DecodeError, Fault, PublishError, SubscribeError,
};
pub use registry::{MessageHandler, Registry};
pub use session::Session;

use crate::time::BackoffConfig;
use heapless::{String, Vec};

/// Maximum topic length in bytes.
pub const MAX_TOPIC_LEN: usize = 128;
/// Maximum payload length in bytes.
pub const MAX_PAYLOAD_LEN: usize = 1024;
/// Maximum number of concurrent subscriptions. Must be a power of two.
pub const MAX_SUBSCRIPTIONS: usize = 16;
/// Capacity of the inbound reassembly buffer.
pub const RX_BUFFER_SIZE: usize = 2048;
/// Capacity of the outbound frame buffer.
pub const TX_BUFFER_SIZE: usize = 1280;

/// A publish/subscribe channel name.
pub type Topic = String<MAX_TOPIC_LEN>;
/// Opaque message body.
pub type Payload = Vec<u8, MAX_PAYLOAD_LEN>;

/// A message delivered on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The topic the message was published to.
    pub topic: Topic,
    /// The message body. Its interpretation is up to the handler.
    pub payload: Payload,
}

impl Message {
    /// Copy `topic` and `payload` into a message.
    ///
    /// Returns `None` if either exceeds its capacity.
    pub fn new(topic: &str, payload: &[u8]) -> Option<Self> {
        Some(Self {
            topic: Topic::try_from(topic).ok()?,
            payload: Payload::from_slice(payload).ok()?,
        })
    }

    /// The payload as text, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.payload).ok()
    }
}

/// Delivery guarantee for a publish or subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QoS {
    /// Fire and forget.
    #[default]
    AtMostOnce = 0,
    /// Acknowledged delivery; duplicates are possible.
    AtLeastOnce = 1,
}

/// Where the client is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    /// No transport is open.
    Disconnected,
    /// The handshake is in progress.
    Connecting,
    /// The broker accepted the session.
    Connected,
    /// The session is being torn down.
    Disconnecting,
}

impl ConnectionState {
    /// Whether moving from `self` to `next` is a legal edge.
    ///
    /// Legal edges: Disconnected→Connecting→Connected→Disconnecting→Disconnected,
    /// plus Connecting→Disconnected when the handshake fails.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnecting)
                | (Disconnecting, Disconnected)
        )
    }
}

/// Client configuration.
///
/// # Examples
///
/// ```rust
/// use libpubsub::pubsub::Options;
/// use libpubsub::time::BackoffConfig;
///
/// let options = Options {
///     keep_alive_seconds: 30,
///     backoff: BackoffConfig { initial_ms: 500, max_ms: 30_000, multiplier: 2 },
///     ..Options::default()
/// };
/// assert!(options.clean_session);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Keep-alive interval announced to the broker. 0 disables keep-alive.
    pub keep_alive_seconds: u16,
    /// Ask the broker to discard any previous session state.
    pub clean_session: bool,
    /// Upper bound on the wait for the connection acknowledgement.
    pub connect_timeout_ms: u32,
    /// Upper bound on the wait for a QoS 1 publish acknowledgement.
    pub ack_timeout_ms: u32,
    /// Sleep between ticks of a blocking run loop.
    pub poll_interval_ms: u32,
    /// Reconnection schedule.
    pub backoff: BackoffConfig,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            keep_alive_seconds: 60,
            clean_session: true,
            connect_timeout_ms: 10_000,
            ack_timeout_ms: 5_000,
            poll_interval_ms: 20,
            backoff: BackoffConfig::default(),
        }
    }
}
