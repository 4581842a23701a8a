//! # libpubsub - publish/subscribe client core for IoT devices
//!
//! A transport-agnostic client that keeps a device subscribed to a broker:
//! it performs the session handshake, routes inbound messages to per-topic
//! handlers, publishes, sends keep-alives and reconnects with exponential
//! backoff when the link drops. It is designed for embedded systems and
//! supports `no_std` environments; all buffers have fixed capacity.
//!
//! ## Layout
//!
//! - [`network`]: the transport traits the client is written against.
//! - [`credentials`]: broker host and device identity, with a JSON loader.
//! - [`time`]: the platform clock and the reconnection backoff schedule.
//! - [`pubsub`]: the client itself, split into session, registry, dispatcher
//!   and wire codec.
//!
//! ## Usage
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! libpubsub = "0.1.0"
//! ```
//!
//! ### Hosted example
//!
//! ```rust,no_run
//! # #[cfg(feature = "std")]
//! # fn main() {
//! use core::sync::atomic::AtomicBool;
//! use libpubsub::credentials::Credentials;
//! use libpubsub::network::tcp::TcpNetwork;
//! use libpubsub::pubsub::{Client, Message, Options};
//! use libpubsub::time::StdClock;
//!
//! let stop = AtomicBool::new(false);
//! let mut on_led = |message: &Message| {
//!     println!("led -> {:?}", message.payload_str());
//! };
//!
//! let credentials = Credentials::from_json(
//!     r#"{"host":"io.example.com","client_id":"porch","username":"alice","auth_token":"secret"}"#,
//! )
//! .unwrap();
//! let mut client = Client::new(TcpNetwork::default(), credentials, StdClock::new(), Options::default());
//! client.set_stop_signal(&stop);
//! client.subscribe("alice/feeds/led", &mut on_led).unwrap();
//! client.connect().unwrap();
//! client.run_loop(true);
//! # }
//! # #[cfg(not(feature = "std"))]
//! # fn main() {}
//! ```
//!
//! ## Platform Support
//!
//! This library is designed to work on:
//! - Embedded microcontrollers (ARM Cortex-M, RISC-V, etc.)
//! - Linux-based IoT devices (Raspberry Pi, etc.)
//! - Any platform supporting Rust's `core` library
//!
//! ## Optional Features
//!
//! - `std`: TCP transport and wall clock over the standard library
//! - `log`: emit diagnostics through the `log` facade
//! - `defmt`: emit diagnostics through `defmt` for embedded debugging

#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

#[macro_use]
mod fmt;

/// Broker address and device identity.
pub mod credentials;

/// Transport abstraction the client is written against.
///
/// Implement these traits for a socket, modem or TLS stream to give the
/// client a way to reach the broker.
pub mod network;

/// The publish/subscribe client.
pub mod pubsub;

/// Clock abstraction and reconnection backoff.
pub mod time;
