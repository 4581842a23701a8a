mod common;

use common::{publish, publish_qos1, puback, suback};
use libpubsub::pubsub::dispatcher::deliver;
use libpubsub::pubsub::{
    ConnectionState, DecodeError, DecodedEvent, Dispatcher, Message, QoS, RX_BUFFER_SIZE, Registry,
};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use std::cell::Cell;

fn collect(dispatcher: &mut Dispatcher, bytes: &[u8]) -> Vec<Result<DecodedEvent, DecodeError>> {
    dispatcher.feed(bytes).collect()
}

fn message(topic: &str, payload: &[u8]) -> Message {
    Message::new(topic, payload).unwrap()
}

#[test]
fn test_decodes_back_to_back_frames() {
    let mut dispatcher: Dispatcher = Dispatcher::new();
    let mut bytes = publish("digital", b"1");
    bytes.extend(puback(7));
    bytes.extend(suback(3, 1));

    let events = collect(&mut dispatcher, &bytes);
    assert_eq!(
        events,
        vec![
            Ok(DecodedEvent::Publish {
                message: message("digital", b"1"),
                ack: None
            }),
            Ok(DecodedEvent::PubAck { packet_id: 7 }),
            Ok(DecodedEvent::SubAck {
                packet_id: 3,
                granted: Some(QoS::AtLeastOnce)
            }),
        ]
    );
    assert_eq!(dispatcher.buffered(), 0);
}

#[test]
fn test_partial_frame_completes_on_later_feed() {
    let mut dispatcher: Dispatcher = Dispatcher::new();
    let frame = publish_qos1("sensors/porch", b"23.5", 9);

    for split in 1..frame.len() {
        let (head, tail) = frame.split_at(split);
        assert!(collect(&mut dispatcher, head).is_empty());
        assert_eq!(dispatcher.buffered(), split);
        assert_eq!(
            collect(&mut dispatcher, tail),
            vec![Ok(DecodedEvent::Publish {
                message: message("sensors/porch", b"23.5"),
                ack: Some(9)
            })]
        );
    }
}

#[test]
fn test_one_byte_at_a_time() {
    let mut dispatcher: Dispatcher = Dispatcher::new();
    let mut bytes = publish("a", b"x");
    bytes.extend(publish("b", b"y"));

    let events: Vec<_> = bytes
        .iter()
        .flat_map(|byte| collect(&mut dispatcher, std::slice::from_ref(byte)))
        .collect();
    assert_eq!(events.len(), 2);
}

#[test]
fn test_corrupt_frame_then_valid_frame() {
    let mut dispatcher: Dispatcher = Dispatcher::new();
    // The topic claims nine bytes but the frame only holds one.
    let mut bytes = vec![0x30, 3, 0, 9, b'x'];
    bytes.extend(publish("digital", b"1"));

    let events = collect(&mut dispatcher, &bytes);
    assert_eq!(
        events,
        vec![
            Err(DecodeError::MalformedFrame),
            Ok(DecodedEvent::Publish {
                message: message("digital", b"1"),
                ack: None
            }),
        ]
    );
}

#[test]
fn test_garbage_run_reported_once() {
    let mut dispatcher: Dispatcher = Dispatcher::new();
    let mut bytes = vec![0x00, 0x01, 0x02, 0xFF, 0x05];
    bytes.extend(publish("digital", b"0"));

    let events = collect(&mut dispatcher, &bytes);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], Err(DecodeError::InvalidHeader));
    assert!(matches!(events[1], Ok(DecodedEvent::Publish { .. })));
}

#[test]
fn test_separate_garbage_runs_are_separate_errors() {
    let mut dispatcher: Dispatcher = Dispatcher::new();
    let mut bytes = vec![0x00];
    bytes.extend(puback(1));
    bytes.push(0x00);
    bytes.extend(puback(2));

    let errors = collect(&mut dispatcher, &bytes)
        .into_iter()
        .filter(Result::is_err)
        .count();
    assert_eq!(errors, 2);
}

#[test]
fn test_stray_bytes_in_later_reads_are_reported() {
    let mut dispatcher: Dispatcher = Dispatcher::new();

    assert_eq!(
        collect(&mut dispatcher, &[0x00, 0x01]),
        vec![Err(DecodeError::InvalidHeader)]
    );
    assert_eq!(dispatcher.buffered(), 0);
    assert_eq!(
        collect(&mut dispatcher, &[0x00]),
        vec![Err(DecodeError::InvalidHeader)]
    );

    let events = collect(&mut dispatcher, &puback(3));
    assert_eq!(events, vec![Ok(DecodedEvent::PubAck { packet_id: 3 })]);
}

#[test]
fn test_qos2_publish_is_rejected_alone() {
    let mut dispatcher: Dispatcher = Dispatcher::new();
    let mut bytes = vec![0x34, 7, 0, 1, b't', 0, 1, b'h', b'i'];
    bytes.extend(puback(4));

    assert_eq!(
        collect(&mut dispatcher, &bytes),
        vec![
            Err(DecodeError::UnsupportedQos),
            Ok(DecodedEvent::PubAck { packet_id: 4 })
        ]
    );
}

#[test]
fn test_oversized_frame_is_discarded_across_feeds() {
    let mut dispatcher: Dispatcher = Dispatcher::new();
    let payload = vec![b'z'; RX_BUFFER_SIZE + 100];
    let big = publish("big", &payload);

    let (head, tail) = big.split_at(10);
    assert_eq!(
        collect(&mut dispatcher, head),
        vec![Err(DecodeError::FrameTooLarge)]
    );
    assert_eq!(dispatcher.buffered(), 0);

    let mut rest = tail.to_vec();
    rest.extend(puback(5));
    assert_eq!(
        collect(&mut dispatcher, &rest),
        vec![Ok(DecodedEvent::PubAck { packet_id: 5 })]
    );
}

#[test]
fn test_dropping_iterator_keeps_unread_frames() {
    let mut dispatcher: Dispatcher = Dispatcher::new();
    let mut bytes = puback(1);
    bytes.extend(puback(2));
    bytes.extend(puback(3));

    let first = dispatcher.feed(&bytes).next();
    assert_eq!(first, Some(Ok(DecodedEvent::PubAck { packet_id: 1 })));

    assert_eq!(
        collect(&mut dispatcher, &[]),
        vec![
            Ok(DecodedEvent::PubAck { packet_id: 2 }),
            Ok(DecodedEvent::PubAck { packet_id: 3 })
        ]
    );
}

#[test]
fn test_reset_forgets_partial_frame() {
    let mut dispatcher: Dispatcher = Dispatcher::new();
    let frame = publish("digital", b"1");
    collect(&mut dispatcher, &frame[..3]);
    assert_eq!(dispatcher.buffered(), 3);

    dispatcher.reset();
    assert_eq!(dispatcher.buffered(), 0);
    assert_eq!(collect(&mut dispatcher, &puback(8)).len(), 1);
}

#[test]
fn test_no_dispatch_unless_connected() {
    let calls = Cell::new(0);
    let mut handler = |_: &Message| calls.set(calls.get() + 1);
    let mut registry = Registry::new();
    registry.subscribe("digital", QoS::AtMostOnce, &mut handler).unwrap();

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut dispatcher: Dispatcher = Dispatcher::new();
    for round in 0..200 {
        let mut bytes: Vec<u8> = (0..rng.gen_range(0..64)).map(|_| rng.r#gen()).collect();
        if round % 2 == 0 {
            bytes.extend(publish("digital", b"1"));
        }

        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Disconnecting,
        ] {
            for event in dispatcher.feed(&bytes) {
                if let Ok(DecodedEvent::Publish { message, .. }) = event {
                    assert!(!deliver(state, &mut registry, &message));
                }
            }
            dispatcher.reset();
        }
    }
    assert_eq!(calls.get(), 0);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_delivers_when_connected() {
    let calls = Cell::new(0);
    let mut handler = |message: &Message| {
        assert_eq!(message.payload_str(), Some("1"));
        calls.set(calls.get() + 1);
    };
    let mut registry = Registry::new();
    registry.subscribe("digital", QoS::AtMostOnce, &mut handler).unwrap();

    let mut dispatcher: Dispatcher = Dispatcher::new();
    for event in dispatcher.feed(&publish("digital", b"1")) {
        if let Ok(DecodedEvent::Publish { message, .. }) = event {
            assert!(deliver(ConnectionState::Connected, &mut registry, &message));
        }
    }
    assert_eq!(calls.get(), 1);
}
