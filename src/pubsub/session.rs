//! One transport connection to the broker.
//!
//! The session is the only part of the client that touches the transport. It
//! performs the handshake, writes frames, tracks keep-alive timing and closes
//! the stream. Reading is exposed as a raw byte poll; turning those bytes into
//! events is the [`Dispatcher`]'s job.

use super::Options;
use super::codec::{DecodedEvent, FrameBuffer, Framing, Mqtt311, Packet};
use super::dispatcher::Dispatcher;
use super::error::{ConnectError, ConnectReturnCode};
use crate::credentials::Credentials;
use crate::network::{Close, Connect, Connection, Read, Write};
use crate::time::Clock;
use core::marker::PhantomData;

/// Bytes read per poll while waiting for the handshake answer.
const HANDSHAKE_CHUNK: usize = 64;
/// Sleep between handshake polls when nothing arrived.
const HANDSHAKE_POLL_MS: u32 = 10;
/// Consecutive zero-length writes tolerated before the stream is declared stuck.
const MAX_STALLED_WRITES: u32 = 64;

/// Why a frame could not be sent or bytes could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionError {
    /// No transport is open.
    NotOpen,
    /// The frame does not fit the transmit buffer.
    FrameTooLarge,
    /// The transport reported an error or stopped accepting bytes.
    Transport,
}

/// Transport ownership plus handshake and keep-alive bookkeeping.
pub struct Session<C: Connection, F: Framing = Mqtt311> {
    connection: Option<C>,
    keep_alive_ms: u64,
    last_sent_ms: u64,
    ping_sent_at: Option<u64>,
    next_packet_id: u16,
    tx: FrameBuffer,
    _framing: PhantomData<F>,
}

impl<C: Connection, F: Framing> Session<C, F> {
    /// A session with no transport.
    pub fn new() -> Self {
        Self {
            connection: None,
            keep_alive_ms: 0,
            last_sent_ms: 0,
            ping_sent_at: None,
            next_packet_id: 1,
            tx: FrameBuffer::new(),
            _framing: PhantomData,
        }
    }

    /// Open the transport and complete the handshake.
    ///
    /// Sends the connect frame and polls for the broker's acknowledgement for
    /// at most `options.connect_timeout_ms`. Anything that arrives before it
    /// is dropped. On any error the transport is closed again.
    pub fn open<N, K>(
        &mut self,
        network: &mut N,
        credentials: &Credentials,
        options: &Options,
        dispatcher: &mut Dispatcher<F>,
        clock: &mut K,
    ) -> Result<(), ConnectError>
    where
        N: Connect<Connection = C>,
        K: Clock,
    {
        if self.connection.is_some() {
            self.abort();
        }

        let connection = match network.connect(credentials.host.as_str(), credentials.port) {
            Ok(connection) => connection,
            Err(_) => {
                warn!(
                    "cannot reach {}:{}",
                    credentials.host.as_str(),
                    credentials.port
                );
                return Err(ConnectError::TransportUnavailable);
            }
        };
        self.connection = Some(connection);
        self.keep_alive_ms = u64::from(options.keep_alive_seconds) * 1_000;
        self.ping_sent_at = None;
        dispatcher.reset();

        let start = clock.now_ms();
        let connect = Packet::Connect {
            client_id: credentials.client_id.as_str(),
            username: credentials.username.as_str(),
            password: credentials.auth_token.as_str(),
            keep_alive_seconds: options.keep_alive_seconds,
            clean_session: options.clean_session,
        };
        if let Err(error) = self.send(&connect, start) {
            self.abort();
            return Err(match error {
                SessionError::FrameTooLarge => ConnectError::FrameTooLarge,
                SessionError::NotOpen | SessionError::Transport => ConnectError::TransportFault,
            });
        }

        let deadline = start + u64::from(options.connect_timeout_ms);
        let mut chunk = [0u8; HANDSHAKE_CHUNK];
        loop {
            let Ok(n) = self.read(&mut chunk) else {
                warn!("stream closed during handshake");
                self.abort();
                return Err(ConnectError::TransportFault);
            };

            for event in dispatcher.feed(&chunk[..n]) {
                match event {
                    Ok(DecodedEvent::ConnAck {
                        code: ConnectReturnCode::Accepted,
                        session_present,
                    }) => {
                        info!("session established (resumed: {})", session_present);
                        return Ok(());
                    }
                    Ok(DecodedEvent::ConnAck { code, .. }) => {
                        warn!("broker refused connection: {:?}", code);
                        self.abort();
                        return Err(ConnectError::Rejected(code));
                    }
                    Ok(_) => debug!("dropping frame received before acknowledgement"),
                    Err(error) => warn!("bad frame during handshake: {:?}", error),
                }
            }

            let now = clock.now_ms();
            if now >= deadline {
                warn!("no acknowledgement after {} ms", options.connect_timeout_ms);
                self.abort();
                return Err(ConnectError::Timeout);
            }
            if n == 0 {
                let remaining = u32::try_from(deadline - now).unwrap_or(u32::MAX);
                clock.delay_ms(HANDSHAKE_POLL_MS.min(remaining));
            }
        }
    }

    /// Say goodbye and close the transport. Errors are ignored.
    pub fn close(&mut self) {
        if self.connection.is_some() {
            let now = self.last_sent_ms;
            if self.send(&Packet::Disconnect, now).is_err() {
                debug!("could not send disconnect");
            }
        }
        self.abort();
    }

    /// Close the transport without a disconnect frame.
    pub fn abort(&mut self) {
        if let Some(connection) = self.connection.take() {
            if connection.close().is_err() {
                debug!("transport close failed");
            }
        }
        self.ping_sent_at = None;
    }

    /// Encode `packet` and write all of it.
    ///
    /// `now` is recorded as the time of the last outbound frame for
    /// keep-alive purposes.
    pub fn send(&mut self, packet: &Packet<'_>, now: u64) -> Result<(), SessionError> {
        let connection = self.connection.as_mut().ok_or(SessionError::NotOpen)?;
        F::encode(packet, &mut self.tx).map_err(|_| SessionError::FrameTooLarge)?;

        let mut written = 0;
        let mut stalls = 0;
        while written < self.tx.len() {
            match connection.write(&self.tx[written..]) {
                Ok(0) => {
                    stalls += 1;
                    if stalls > MAX_STALLED_WRITES {
                        return Err(SessionError::Transport);
                    }
                }
                Ok(n) => {
                    written += n;
                    stalls = 0;
                }
                Err(_) => return Err(SessionError::Transport),
            }
        }
        connection.flush().map_err(|_| SessionError::Transport)?;

        trace!("sent {} byte frame", written);
        self.last_sent_ms = now;
        Ok(())
    }

    /// Poll the transport. `Ok(0)` means nothing is pending.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, SessionError> {
        let connection = self.connection.as_mut().ok_or(SessionError::NotOpen)?;
        connection.read(buf).map_err(|_| SessionError::Transport)
    }

    /// Whether a keep-alive probe should go out now.
    pub fn keepalive_due(&self, now: u64) -> bool {
        self.keep_alive_ms > 0
            && self.ping_sent_at.is_none()
            && now.saturating_sub(self.last_sent_ms) >= self.keep_alive_ms
    }

    /// Send a keep-alive probe and start waiting for its answer.
    pub fn send_keepalive(&mut self, now: u64) -> Result<(), ConnectError> {
        self.send(&Packet::PingReq, now)
            .map_err(|_| ConnectError::TransportFault)?;
        trace!("keep-alive sent");
        self.ping_sent_at = Some(now);
        Ok(())
    }

    /// The broker answered the outstanding probe.
    pub fn keepalive_acked(&mut self) {
        self.ping_sent_at = None;
    }

    /// Whether the outstanding probe has gone unanswered for a full interval.
    pub fn keepalive_overdue(&self, now: u64) -> bool {
        self.ping_sent_at
            .is_some_and(|sent| now.saturating_sub(sent) >= self.keep_alive_ms)
    }

    /// Whether a transport is open.
    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    /// A fresh non-zero packet identifier.
    pub fn next_packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = id.wrapping_add(1).max(1);
        id
    }
}

impl<C: Connection, F: Framing> Default for Session<C, F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connection, F: Framing> core::fmt::Debug for Session<C, F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("open", &self.is_open())
            .field("keep_alive_ms", &self.keep_alive_ms)
            .field("last_sent_ms", &self.last_sent_ms)
            .field("ping_sent_at", &self.ping_sent_at)
            .finish()
    }
}
