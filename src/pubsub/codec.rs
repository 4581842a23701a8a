//! Wire framing.
//!
//! The rest of the client speaks in terms of [`Packet`] (outbound) and
//! [`DecodedEvent`] (inbound). A [`Framing`] implementation maps those to and
//! from bytes for one broker protocol. [`Mqtt311`] implements the MQTT 3.1.1
//! subset the client needs; targeting another broker means writing another
//! `Framing` and naming it in the client's type.

use super::error::{ConnectReturnCode, DecodeError};
use super::{MAX_PAYLOAD_LEN, MAX_TOPIC_LEN, Message, Payload, QoS, TX_BUFFER_SIZE, Topic};
use heapless::Vec;

/// Outbound frame storage.
pub type FrameBuffer = Vec<u8, TX_BUFFER_SIZE>;

/// A frame the client sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet<'p> {
    /// Session handshake.
    Connect {
        /// Client identity.
        client_id: &'p str,
        /// User name; omitted from the frame when empty.
        username: &'p str,
        /// Auth token; omitted from the frame when empty.
        password: &'p str,
        /// Keep-alive interval announced to the broker.
        keep_alive_seconds: u16,
        /// Discard previous session state.
        clean_session: bool,
    },
    /// Application message. `packet_id` is only used for QoS 1.
    Publish {
        /// Destination topic.
        topic: &'p str,
        /// Message body.
        payload: &'p [u8],
        /// Delivery guarantee.
        qos: QoS,
        /// Identifier echoed by the acknowledgement.
        packet_id: u16,
    },
    /// Acknowledgement of an inbound QoS 1 publish.
    PubAck {
        /// Identifier of the publish being acknowledged.
        packet_id: u16,
    },
    /// Subscription request for a single topic.
    Subscribe {
        /// Identifier echoed by the acknowledgement.
        packet_id: u16,
        /// Topic or topic filter.
        topic: &'p str,
        /// Maximum delivery guarantee requested.
        qos: QoS,
    },
    /// Removal of a single subscription.
    Unsubscribe {
        /// Identifier echoed by the acknowledgement.
        packet_id: u16,
        /// Topic or topic filter.
        topic: &'p str,
    },
    /// Keep-alive probe.
    PingReq,
    /// Graceful end of session.
    Disconnect,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    /// A message on a subscribed topic.
    Publish {
        /// The delivered message.
        message: Message,
        /// Packet identifier to acknowledge, present for QoS 1 deliveries.
        ack: Option<u16>,
    },
    /// Answer to the session handshake.
    ConnAck {
        /// The broker resumed stored session state.
        session_present: bool,
        /// Outcome of the handshake.
        code: ConnectReturnCode,
    },
    /// Answer to a subscription request. `granted` is `None` when refused.
    SubAck {
        /// Identifier of the request.
        packet_id: u16,
        /// Delivery guarantee granted by the broker.
        granted: Option<QoS>,
    },
    /// Answer to an unsubscribe request.
    UnsubAck {
        /// Identifier of the request.
        packet_id: u16,
    },
    /// Acknowledgement of one of our QoS 1 publishes.
    PubAck {
        /// Identifier of the publish.
        packet_id: u16,
    },
    /// Answer to a keep-alive probe.
    KeepAliveAck,
    /// The broker is ending the session.
    Disconnect,
}

impl DecodedEvent {
    /// Whether this is a positive connection acknowledgement.
    pub fn is_connack_success(&self) -> bool {
        matches!(
            self,
            DecodedEvent::ConnAck {
                code: ConnectReturnCode::Accepted,
                ..
            }
        )
    }
}

/// Outcome of one decode attempt at the start of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// More bytes are needed. `frame_len` is the full frame length once the
    /// header has been read.
    Incomplete {
        /// Total frame length, if known.
        frame_len: Option<usize>,
    },
    /// A complete frame of `len` bytes.
    Frame {
        /// The decoded frame.
        event: DecodedEvent,
        /// Bytes consumed.
        len: usize,
    },
    /// The bytes at the start of the buffer are not a valid frame.
    ///
    /// `skip` is how many bytes to drop before trying again; it may exceed the
    /// bytes currently buffered when the header announced a longer frame.
    Corrupt {
        /// What was wrong.
        error: DecodeError,
        /// Bytes to drop.
        skip: usize,
    },
}

/// Outbound frame does not fit [`FrameBuffer`] or a protocol length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeError;

/// A broker wire protocol.
pub trait Framing {
    /// Serialize `packet` into `out`, replacing its contents.
    fn encode(packet: &Packet<'_>, out: &mut FrameBuffer) -> Result<(), EncodeError>;

    /// Try to decode one frame from the start of `buf`.
    fn decode(buf: &[u8]) -> Decoded;
}

/// MQTT 3.1.1.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mqtt311;

const CONNECT: u8 = 0x10;
const CONNACK: u8 = 2;
const PUBLISH: u8 = 3;
const PUBACK: u8 = 4;
const SUBSCRIBE: u8 = 0x82;
const SUBACK: u8 = 9;
const UNSUBSCRIBE: u8 = 0xA2;
const UNSUBACK: u8 = 11;
const PINGREQ: u8 = 0xC0;
const PINGRESP: u8 = 13;
const DISCONNECT: u8 = 14;

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 4;

const CONNECT_FLAG_CLEAN_SESSION: u8 = 0x02;
const CONNECT_FLAG_PASSWORD: u8 = 0x40;
const CONNECT_FLAG_USERNAME: u8 = 0x80;

const SUBACK_FAILURE: u8 = 0x80;

/// Largest value the variable-length "remaining length" field can hold.
const MAX_REMAINING_LENGTH: usize = 268_435_455;

impl Framing for Mqtt311 {
    fn encode(packet: &Packet<'_>, out: &mut FrameBuffer) -> Result<(), EncodeError> {
        out.clear();
        match *packet {
            Packet::Connect {
                client_id,
                username,
                password,
                keep_alive_seconds,
                clean_session,
            } => {
                // A password without a user name is not allowed on the wire.
                let with_username = !username.is_empty() || !password.is_empty();
                let with_password = !password.is_empty();

                let mut flags = 0;
                let mut remaining = 2 + PROTOCOL_NAME.len() + 1 + 1 + 2 + 2 + client_id.len();
                if clean_session {
                    flags |= CONNECT_FLAG_CLEAN_SESSION;
                }
                if with_username {
                    flags |= CONNECT_FLAG_USERNAME;
                    remaining += 2 + username.len();
                }
                if with_password {
                    flags |= CONNECT_FLAG_PASSWORD;
                    remaining += 2 + password.len();
                }

                put_fixed_header(out, CONNECT, remaining)?;
                put_str(out, PROTOCOL_NAME)?;
                put_bytes(out, &[PROTOCOL_LEVEL, flags])?;
                put_u16(out, keep_alive_seconds)?;
                put_str(out, client_id)?;
                if with_username {
                    put_str(out, username)?;
                }
                if with_password {
                    put_str(out, password)?;
                }
            }
            Packet::Publish {
                topic,
                payload,
                qos,
                packet_id,
            } => {
                let mut header = PUBLISH << 4;
                let mut remaining = 2 + topic.len() + payload.len();
                if qos == QoS::AtLeastOnce {
                    header |= (qos as u8) << 1;
                    remaining += 2;
                }

                put_fixed_header(out, header, remaining)?;
                put_str(out, topic)?;
                if qos == QoS::AtLeastOnce {
                    put_u16(out, packet_id)?;
                }
                put_bytes(out, payload)?;
            }
            Packet::PubAck { packet_id } => {
                put_fixed_header(out, PUBACK << 4, 2)?;
                put_u16(out, packet_id)?;
            }
            Packet::Subscribe {
                packet_id,
                topic,
                qos,
            } => {
                put_fixed_header(out, SUBSCRIBE, 2 + 2 + topic.len() + 1)?;
                put_u16(out, packet_id)?;
                put_str(out, topic)?;
                put_bytes(out, &[qos as u8])?;
            }
            Packet::Unsubscribe { packet_id, topic } => {
                put_fixed_header(out, UNSUBSCRIBE, 2 + 2 + topic.len())?;
                put_u16(out, packet_id)?;
                put_str(out, topic)?;
            }
            Packet::PingReq => put_fixed_header(out, PINGREQ, 0)?,
            Packet::Disconnect => put_fixed_header(out, DISCONNECT << 4, 0)?,
        }
        Ok(())
    }

    fn decode(buf: &[u8]) -> Decoded {
        let Some(&header) = buf.first() else {
            return Decoded::Incomplete { frame_len: None };
        };
        if !accepts_header(header) {
            return Decoded::Corrupt {
                error: DecodeError::InvalidHeader,
                skip: 1,
            };
        }

        let (remaining, length_bytes) = match read_remaining_length(&buf[1..]) {
            RemainingLength::Complete { value, used } => (value, used),
            RemainingLength::Incomplete => return Decoded::Incomplete { frame_len: None },
            RemainingLength::Invalid => {
                return Decoded::Corrupt {
                    error: DecodeError::InvalidHeader,
                    skip: 1,
                };
            }
        };

        let frame_len = 1 + length_bytes + remaining;
        if buf.len() < frame_len {
            return Decoded::Incomplete {
                frame_len: Some(frame_len),
            };
        }

        match decode_body(header, &buf[1 + length_bytes..frame_len]) {
            Ok(event) => Decoded::Frame {
                event,
                len: frame_len,
            },
            Err(error) => Decoded::Corrupt {
                error,
                skip: frame_len,
            },
        }
    }
}

/// Only packet types a broker sends to a client, with their mandatory flags.
fn accepts_header(header: u8) -> bool {
    let flags = header & 0x0F;
    match header >> 4 {
        CONNACK | PUBACK | SUBACK | UNSUBACK | PINGRESP | DISCONNECT => flags == 0,
        PUBLISH => (flags >> 1) & 0x03 != 0x03,
        _ => false,
    }
}

enum RemainingLength {
    Complete { value: usize, used: usize },
    Incomplete,
    Invalid,
}

fn read_remaining_length(buf: &[u8]) -> RemainingLength {
    let mut value = 0usize;
    let mut multiplier = 1usize;
    for (i, &byte) in buf.iter().enumerate().take(4) {
        value += (byte & 0x7F) as usize * multiplier;
        if byte & 0x80 == 0 {
            return RemainingLength::Complete { value, used: i + 1 };
        }
        multiplier *= 128;
    }
    if buf.len() >= 4 {
        RemainingLength::Invalid
    } else {
        RemainingLength::Incomplete
    }
}

fn decode_body(header: u8, body: &[u8]) -> Result<DecodedEvent, DecodeError> {
    match header >> 4 {
        CONNACK => match body {
            [flags, code] if flags & 0xFE == 0 => Ok(DecodedEvent::ConnAck {
                session_present: flags & 0x01 == 1,
                code: ConnectReturnCode::from(*code),
            }),
            _ => Err(DecodeError::MalformedFrame),
        },
        PUBLISH => decode_publish(header, body),
        PUBACK => Ok(DecodedEvent::PubAck {
            packet_id: exact_packet_id(body)?,
        }),
        SUBACK => {
            if body.len() < 3 {
                return Err(DecodeError::MalformedFrame);
            }
            let granted = match body[2] {
                0 => Some(QoS::AtMostOnce),
                1 => Some(QoS::AtLeastOnce),
                SUBACK_FAILURE => None,
                _ => return Err(DecodeError::MalformedFrame),
            };
            Ok(DecodedEvent::SubAck {
                packet_id: u16::from_be_bytes([body[0], body[1]]),
                granted,
            })
        }
        UNSUBACK => Ok(DecodedEvent::UnsubAck {
            packet_id: exact_packet_id(body)?,
        }),
        PINGRESP if body.is_empty() => Ok(DecodedEvent::KeepAliveAck),
        DISCONNECT if body.is_empty() => Ok(DecodedEvent::Disconnect),
        _ => Err(DecodeError::MalformedFrame),
    }
}

fn decode_publish(header: u8, body: &[u8]) -> Result<DecodedEvent, DecodeError> {
    let qos = match (header >> 1) & 0x03 {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => return Err(DecodeError::UnsupportedQos),
    };

    let [hi, lo, rest @ ..] = body else {
        return Err(DecodeError::MalformedFrame);
    };
    let topic_len = u16::from_be_bytes([*hi, *lo]) as usize;
    if topic_len == 0 || rest.len() < topic_len {
        return Err(DecodeError::MalformedFrame);
    }
    let (topic, rest) = rest.split_at(topic_len);
    let topic = core::str::from_utf8(topic).map_err(|_| DecodeError::InvalidUtf8)?;
    if topic.len() > MAX_TOPIC_LEN {
        return Err(DecodeError::TopicTooLong);
    }

    let (ack, payload) = match qos {
        QoS::AtMostOnce => (None, rest),
        QoS::AtLeastOnce => match rest {
            [hi, lo, payload @ ..] => (Some(u16::from_be_bytes([*hi, *lo])), payload),
            _ => return Err(DecodeError::MalformedFrame),
        },
    };
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(DecodeError::PayloadTooLarge);
    }

    let message = Message {
        topic: Topic::try_from(topic).map_err(|_| DecodeError::TopicTooLong)?,
        payload: Payload::from_slice(payload).map_err(|_| DecodeError::PayloadTooLarge)?,
    };
    Ok(DecodedEvent::Publish { message, ack })
}

fn exact_packet_id(body: &[u8]) -> Result<u16, DecodeError> {
    match body {
        [hi, lo] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(DecodeError::MalformedFrame),
    }
}

fn put_fixed_header(out: &mut FrameBuffer, header: u8, remaining: usize) -> Result<(), EncodeError> {
    if remaining > MAX_REMAINING_LENGTH {
        return Err(EncodeError);
    }
    out.push(header).map_err(|_| EncodeError)?;
    let mut len = remaining;
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        out.push(byte).map_err(|_| EncodeError)?;
        if len == 0 {
            return Ok(());
        }
    }
}

fn put_u16(out: &mut FrameBuffer, value: u16) -> Result<(), EncodeError> {
    put_bytes(out, &value.to_be_bytes())
}

fn put_str(out: &mut FrameBuffer, s: &str) -> Result<(), EncodeError> {
    let len = u16::try_from(s.len()).map_err(|_| EncodeError)?;
    put_u16(out, len)?;
    put_bytes(out, s.as_bytes())
}

fn put_bytes(out: &mut FrameBuffer, bytes: &[u8]) -> Result<(), EncodeError> {
    out.extend_from_slice(bytes).map_err(|_| EncodeError)
}
