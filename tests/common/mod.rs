#![allow(dead_code)]

use libpubsub::credentials::Credentials;
use libpubsub::network::error::Error;
use libpubsub::network::*;
use libpubsub::pubsub::{Client, Options};
use libpubsub::time::{BackoffConfig, Clock};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

/// What both ends of the mock link see.
#[derive(Debug, Default)]
pub struct Wire {
    /// Chunks handed out one per read.
    pub inbound: VecDeque<Vec<u8>>,
    /// Everything the client wrote.
    pub outbound: Vec<u8>,
    /// Return code to answer a CONNECT frame with; `None` stays silent.
    pub auto_connack: Option<u8>,
    /// Remaining connection attempts to refuse.
    pub refuse_connects: u32,
    pub connects: u32,
    pub closes: u32,
    pub write_fails: bool,
    /// Accept at most this many bytes per write call.
    pub write_limit: Option<usize>,
    /// Reads fail as if the broker hung up. Cleared by the next connect.
    pub peer_closed: bool,
}

#[derive(Debug)]
pub struct MockConnection {
    wire: Rc<RefCell<Wire>>,
}

impl Read for MockConnection {
    type Error = Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut wire = self.wire.borrow_mut();
        if wire.peer_closed {
            return Err(Error::ConnectionClosed);
        }
        let Some(mut chunk) = wire.inbound.pop_front() else {
            return Ok(0);
        };
        let len = buf.len().min(chunk.len());
        buf[..len].copy_from_slice(&chunk[..len]);
        if len < chunk.len() {
            let rest = chunk.split_off(len);
            wire.inbound.push_front(rest);
        }
        Ok(len)
    }
}

impl Write for MockConnection {
    type Error = Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut wire = self.wire.borrow_mut();
        if wire.write_fails {
            return Err(Error::WriteError);
        }
        let len = wire.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        wire.outbound.extend_from_slice(&buf[..len]);
        let reply = wire.auto_connack;
        if len == buf.len() && buf.first() == Some(&0x10) {
            if let Some(code) = reply {
                wire.inbound.push_back(connack(code));
            }
        }
        Ok(len)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Close for MockConnection {
    type Error = Error;

    fn close(self) -> Result<(), Self::Error> {
        self.wire.borrow_mut().closes += 1;
        Ok(())
    }
}

impl Connection for MockConnection {}

#[derive(Debug)]
pub struct MockNetwork {
    wire: Rc<RefCell<Wire>>,
}

impl Connect for MockNetwork {
    type Connection = MockConnection;
    type Error = Error;

    fn connect(&mut self, _host: &str, _port: u16) -> Result<Self::Connection, Self::Error> {
        let mut wire = self.wire.borrow_mut();
        wire.connects += 1;
        if wire.refuse_connects > 0 {
            wire.refuse_connects -= 1;
            return Err(Error::ConnectionRefused);
        }
        wire.peer_closed = false;
        Ok(MockConnection {
            wire: self.wire.clone(),
        })
    }
}

/// Manually driven clock; sleeping advances it.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Rc<Cell<u64>>,
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.now.set(self.now.get() + u64::from(ms));
    }
}

/// Shared handles to one mock broker link and its clock.
pub struct Harness {
    pub wire: Rc<RefCell<Wire>>,
    pub now: Rc<Cell<u64>>,
}

impl Harness {
    pub fn new() -> Self {
        let wire = Wire {
            auto_connack: Some(0),
            ..Wire::default()
        };
        Self {
            wire: Rc::new(RefCell::new(wire)),
            now: Rc::new(Cell::new(0)),
        }
    }

    pub fn network(&self) -> MockNetwork {
        MockNetwork {
            wire: self.wire.clone(),
        }
    }

    pub fn clock(&self) -> MockClock {
        MockClock {
            now: self.now.clone(),
        }
    }

    pub fn client<'a>(&self) -> TestClient<'a> {
        Client::new(self.network(), credentials(), self.clock(), options())
    }

    pub fn push(&self, bytes: &[u8]) {
        self.wire.borrow_mut().inbound.push_back(bytes.to_vec());
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    pub fn take_outbound(&self) -> Vec<u8> {
        std::mem::take(&mut self.wire.borrow_mut().outbound)
    }

    /// Drain what the client wrote, split into frames.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        split_frames(&self.take_outbound())
    }
}

pub type TestClient<'a> = Client<'a, MockNetwork, Credentials, MockClock>;

pub fn credentials() -> Credentials {
    Credentials::new("broker.test", "device-1", "alice", "token").unwrap()
}

pub fn options() -> Options {
    Options {
        keep_alive_seconds: 60,
        connect_timeout_ms: 1_000,
        ack_timeout_ms: 500,
        poll_interval_ms: 10,
        backoff: BackoffConfig {
            initial_ms: 100,
            max_ms: 1_000,
            multiplier: 2,
        },
        ..Options::default()
    }
}

fn frame(header: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![header];
    let mut len = body.len();
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if len == 0 {
            break;
        }
    }
    out.extend_from_slice(body);
    out
}

fn string(s: &str) -> Vec<u8> {
    let mut out = (s.len() as u16).to_be_bytes().to_vec();
    out.extend_from_slice(s.as_bytes());
    out
}

pub fn connack(code: u8) -> Vec<u8> {
    vec![0x20, 2, 0, code]
}

pub fn publish(topic: &str, payload: &[u8]) -> Vec<u8> {
    let mut body = string(topic);
    body.extend_from_slice(payload);
    frame(0x30, &body)
}

pub fn publish_qos1(topic: &str, payload: &[u8], packet_id: u16) -> Vec<u8> {
    let mut body = string(topic);
    body.extend_from_slice(&packet_id.to_be_bytes());
    body.extend_from_slice(payload);
    frame(0x32, &body)
}

pub fn puback(packet_id: u16) -> Vec<u8> {
    frame(0x40, &packet_id.to_be_bytes())
}

pub fn suback(packet_id: u16, code: u8) -> Vec<u8> {
    let mut body = packet_id.to_be_bytes().to_vec();
    body.push(code);
    frame(0x90, &body)
}

pub fn pingresp() -> Vec<u8> {
    vec![0xD0, 0]
}

pub fn disconnect() -> Vec<u8> {
    vec![0xE0, 0]
}

pub fn split_frames(mut bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    while !bytes.is_empty() {
        let (len, used) = remaining_length(&bytes[1..]);
        let total = 1 + used + len;
        frames.push(bytes[..total].to_vec());
        bytes = &bytes[total..];
    }
    frames
}

fn remaining_length(bytes: &[u8]) -> (usize, usize) {
    let mut value = 0;
    let mut multiplier = 1;
    for (i, byte) in bytes.iter().enumerate() {
        value += (byte & 0x7F) as usize * multiplier;
        if byte & 0x80 == 0 {
            return (value, i + 1);
        }
        multiplier *= 128;
    }
    panic!("truncated length in {:?}", bytes);
}

/// The body of a frame, after the fixed header.
pub fn body(frame: &[u8]) -> &[u8] {
    let (_, used) = remaining_length(&frame[1..]);
    &frame[1 + used..]
}

/// `(packet_id, topic)` of a SUBSCRIBE or UNSUBSCRIBE frame.
pub fn request_topic(frame: &[u8]) -> (u16, String) {
    let body = body(frame);
    let packet_id = u16::from_be_bytes([body[0], body[1]]);
    let len = u16::from_be_bytes([body[2], body[3]]) as usize;
    let topic = String::from_utf8(body[4..4 + len].to_vec()).unwrap();
    (packet_id, topic)
}
