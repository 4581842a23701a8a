//! Transport abstraction consumed by the pub/sub client.
//!
//! The client never talks to a socket, radio or TLS stack directly. It is
//! written against the small set of traits below, which any byte-stream
//! transport can implement: a TCP socket, a WiFi co-processor speaking AT
//! commands, or a TLS session wrapping either.
//!
//! Reads are polls. [`Read::read`] must return `Ok(0)` when no data is
//! available *right now* instead of blocking, and an error once the stream is
//! broken or closed by the peer. The client relies on this to interleave
//! keep-alive timing and reconnection checks within a single thread.

#![deny(unsafe_code)]

/// Common error types for network operations
pub mod error;

/// TCP transport over `std::net`.
#[cfg(feature = "std")]
pub mod tcp;

/// Re-exports of common traits
pub mod prelude {
    pub use super::{Close, Connect, Connection, Read, Write};
}

/// Non-blocking read half of a connection.
pub trait Read {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Read whatever is available into `buf`.
    ///
    /// Returns `Ok(0)` when nothing is pending. A closed or failed stream is
    /// reported as an error, never as `Ok(0)`.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// Write half of a connection.
pub trait Write {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Write data to the connection, returning how many bytes were accepted.
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
    /// Flush the write buffer
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// Orderly shutdown of a connection.
pub trait Close {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Close the connection
    fn close(self) -> Result<(), Self::Error>;
}

/// An open, duplex byte stream.
pub trait Connection: Read + Write + Close {}

/// Opens connections to a remote endpoint (the "network manager").
pub trait Connect {
    /// Associated connection type
    type Connection: Connection;
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Open a connection to `host:port`.
    fn connect(&mut self, host: &str, port: u16) -> Result<Self::Connection, Self::Error>;
}
