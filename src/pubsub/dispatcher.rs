//! Inbound byte stream → events.
//!
//! The dispatcher owns the reassembly buffer. Bytes are handed to
//! [`Dispatcher::feed`] as they arrive from the transport, in chunks of any
//! size; the returned iterator yields every complete frame and keeps partial
//! frames buffered for the next call.
//!
//! A corrupt frame produces one [`DecodeError`] and is skipped. When the
//! header itself is unrecognisable the dispatcher drops bytes one at a time
//! until something decodes again, reporting that whole run as a single error.

use super::codec::{Decoded, DecodedEvent, Framing, Mqtt311};
use super::error::DecodeError;
use super::registry::Registry;
use super::{ConnectionState, Message, RX_BUFFER_SIZE};
use core::marker::PhantomData;
use heapless::Vec;

/// Frame reassembly and decoding for one connection.
pub struct Dispatcher<F: Framing = Mqtt311> {
    buffer: Vec<u8, RX_BUFFER_SIZE>,
    /// Bytes of an oversized frame still to be thrown away as they arrive.
    discard: usize,
    resyncing: bool,
    _framing: PhantomData<F>,
}

impl<F: Framing> Dispatcher<F> {
    /// An empty dispatcher.
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            discard: 0,
            resyncing: false,
            _framing: PhantomData,
        }
    }

    /// Queue `bytes` and iterate over the events they complete.
    ///
    /// The iterator is finite. Dropping it early keeps any unconsumed bytes
    /// for the next call.
    pub fn feed<'d, 'b>(&'d mut self, bytes: &'b [u8]) -> Events<'d, 'b, F> {
        Events {
            dispatcher: self,
            input: bytes,
        }
    }

    /// Forget buffered bytes. Called whenever a new stream starts.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discard = 0;
        self.resyncing = false;
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn absorb(&mut self, input: &mut &[u8]) {
        if self.discard > 0 {
            let skipped = self.discard.min(input.len());
            self.discard -= skipped;
            *input = &input[skipped..];
        }
        let free = RX_BUFFER_SIZE - self.buffer.len();
        let take = free.min(input.len());
        // Cannot fail: `take` never exceeds the free capacity.
        let _ = self.buffer.extend_from_slice(&input[..take]);
        *input = &input[take..];
    }

    fn consume(&mut self, len: usize) {
        let buffered = self.buffer.len();
        self.buffer.copy_within(len..buffered, 0);
        self.buffer.truncate(buffered - len);
    }

    fn next_event(&mut self, input: &mut &[u8]) -> Option<Result<DecodedEvent, DecodeError>> {
        loop {
            self.absorb(input);
            if self.buffer.is_empty() {
                // Everything fed so far is accounted for; the next invalid
                // byte starts a new run.
                self.resyncing = false;
                return None;
            }

            match F::decode(&self.buffer) {
                Decoded::Frame { event, len } => {
                    self.consume(len);
                    self.resyncing = false;
                    trace!("decoded frame of {} bytes", len);
                    return Some(Ok(event));
                }
                Decoded::Incomplete {
                    frame_len: Some(len),
                } if len > RX_BUFFER_SIZE => {
                    warn!("frame of {} bytes exceeds receive buffer, discarding", len);
                    self.discard = len - self.buffer.len();
                    self.buffer.clear();
                    self.resyncing = false;
                    return Some(Err(DecodeError::FrameTooLarge));
                }
                Decoded::Incomplete { .. } => {
                    if input.is_empty() {
                        return None;
                    }
                    if self.buffer.is_full() {
                        // A full buffer with an incomplete header cannot make progress.
                        self.consume(1);
                    }
                }
                Decoded::Corrupt { error, skip } => {
                    let now = skip.min(self.buffer.len());
                    self.consume(now);
                    self.discard += skip - now;

                    if error == DecodeError::InvalidHeader {
                        if self.resyncing {
                            continue;
                        }
                        self.resyncing = true;
                    } else {
                        self.resyncing = false;
                    }
                    warn!("skipping corrupt frame: {:?}", error);
                    return Some(Err(error));
                }
            }
        }
    }
}

impl<F: Framing> Default for Dispatcher<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Framing> core::fmt::Debug for Dispatcher<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("buffered", &self.buffer.len())
            .field("discard", &self.discard)
            .field("resyncing", &self.resyncing)
            .finish()
    }
}

/// Events decoded from one [`Dispatcher::feed`] call.
pub struct Events<'d, 'b, F: Framing> {
    dispatcher: &'d mut Dispatcher<F>,
    input: &'b [u8],
}

impl<F: Framing> core::fmt::Debug for Events<'_, '_, F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Events")
            .field("dispatcher", &self.dispatcher)
            .field("pending", &self.input.len())
            .finish()
    }
}

impl<F: Framing> Iterator for Events<'_, '_, F> {
    type Item = Result<DecodedEvent, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.dispatcher.next_event(&mut self.input)
    }
}

impl<F: Framing> Drop for Events<'_, '_, F> {
    fn drop(&mut self) {
        self.dispatcher.absorb(&mut self.input);
        if !self.input.is_empty() {
            warn!("receive buffer full, dropped {} bytes", self.input.len());
        }
    }
}

/// Route a decoded message to the registry, but only while connected.
///
/// Returns whether a handler ran.
pub fn deliver(state: ConnectionState, registry: &mut Registry<'_>, message: &Message) -> bool {
    if state != ConnectionState::Connected {
        debug!(
            "dropping message on {} while {:?}",
            message.topic.as_str(),
            state
        );
        return false;
    }
    registry.dispatch(message)
}
