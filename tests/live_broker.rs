//! Talks to a real broker. Run with
//! `cargo test --features std --test live_broker -- --ignored`.

use dotenvy::dotenv;
use libpubsub::credentials::Credentials;
use libpubsub::network::tcp::TcpNetwork;
use libpubsub::pubsub::{Client, ConnectionState, Message, Options, QoS};
use libpubsub::time::StdClock;
use std::cell::RefCell;
use std::env;
use std::time::{Duration, Instant};

fn broker() -> (String, u16) {
    dotenv().ok();
    let address = env::var("TEST_MQTT_ADDRESS").unwrap_or("test.mosquitto.org:1883".to_string());
    let (host, port) = address.rsplit_once(':').expect("address must be host:port");
    (host.to_string(), port.parse().expect("invalid port"))
}

fn credentials(client_id: &str) -> Credentials {
    let (host, port) = broker();
    Credentials::new(&host, client_id, "", "").unwrap().with_port(port)
}

#[test]
#[ignore]
fn test_connect_to_public_broker() {
    let mut client = Client::new(
        TcpNetwork::default(),
        credentials("libpubsub-test-12345"),
        StdClock::new(),
        Options::default(),
    );

    client.connect().expect("Failed to connect");
    assert_eq!(client.state(), ConnectionState::Connected);
    client.disconnect();
}

#[test]
#[ignore]
fn test_publish_and_subscribe() {
    let topic = "libpubsub/test-topic";
    let received = RefCell::new(Vec::new());
    let mut on_message = |message: &Message| received.borrow_mut().push(message.clone());

    let mut client = Client::new(
        TcpNetwork::default(),
        credentials("libpubsub-test-67890"),
        StdClock::new(),
        Options::default(),
    );
    client.subscribe(topic, &mut on_message).unwrap();
    client.connect().expect("Failed to connect");

    // Give the broker a moment to register the subscription.
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        client.run_loop(false);
        std::thread::sleep(Duration::from_millis(50));
    }

    client
        .publish_with_qos(topic, b"hello world", QoS::AtLeastOnce)
        .expect("Failed to publish");

    let deadline = Instant::now() + Duration::from_secs(5);
    while received.borrow().is_empty() && Instant::now() < deadline {
        client.run_loop(false);
        std::thread::sleep(Duration::from_millis(50));
    }
    client.disconnect();

    let received = received.borrow();
    assert!(!received.is_empty());
    assert_eq!(received[0].topic.as_str(), topic);
    assert_eq!(&received[0].payload[..], b"hello world");
}
