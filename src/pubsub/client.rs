//! The application-facing client and its run loop.
//!
//! A [`Client`] owns the transport factory, the clock, the credential source
//! and every callback the application registers. There is no global state:
//! two clients in one program are fully independent.
//!
//! Calls the application makes return their errors. Everything that goes
//! wrong while [`Client::run_loop`] services the connection is recovered
//! locally (the client drops back to disconnected and schedules a reconnect)
//! and reported through [`Client::on_status`].

use super::codec::{DecodedEvent, Framing, Mqtt311, Packet};
use super::dispatcher::{Dispatcher, deliver};
use super::error::{ConnectError, DecodeError, Fault, PublishError, SubscribeError};
use super::registry::{MessageHandler, Registry};
use super::session::{Session, SessionError};
use super::{ConnectionState, Options, QoS, topic};
use crate::credentials::CredentialSource;
use crate::network::Connect;
use crate::time::{Backoff, Clock};
use core::sync::atomic::{AtomicBool, Ordering};

/// Bytes read from the transport per poll.
const READ_CHUNK: usize = 256;
/// Reads per tick, so a chatty broker cannot starve keep-alive handling.
const MAX_READS_PER_TICK: usize = 8;
/// Sleep between polls while waiting for a publish acknowledgement.
const ACK_POLL_MS: u32 = 10;
/// Longest single sleep of a blocking run loop waiting to reconnect.
const MAX_IDLE_MS: u64 = 250;

/// Background events reported through the status callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// A session was established.
    Connected,
    /// A reconnection attempt made by the run loop failed.
    ConnectFailed(ConnectError),
    /// A live session was torn down.
    ConnectionLost(Fault),
    /// The next reconnection attempt will be made after `delay_ms`.
    ReconnectScheduled {
        /// Number the upcoming attempt will carry in `reconnect_attempts()`.
        attempt: u32,
        /// Delay before the attempt.
        delay_ms: u32,
    },
    /// An inbound frame was skipped.
    DecodeFailed(DecodeError),
    /// The broker refused a subscription.
    SubscribeRejected {
        /// Identifier of the refused request.
        packet_id: u16,
    },
}

#[cfg(feature = "defmt")]
impl defmt::Format for Status {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Status::Connected => defmt::write!(f, "Connected"),
            Status::ConnectFailed(error) => defmt::write!(f, "ConnectFailed({})", error),
            Status::ConnectionLost(fault) => defmt::write!(f, "ConnectionLost({})", fault),
            Status::ReconnectScheduled { attempt, delay_ms } => defmt::write!(
                f,
                "ReconnectScheduled {{ attempt: {}, delay_ms: {} }}",
                attempt,
                delay_ms
            ),
            Status::DecodeFailed(error) => defmt::write!(f, "DecodeFailed({})", error),
            Status::SubscribeRejected { packet_id } => {
                defmt::write!(f, "SubscribeRejected {{ packet_id: {} }}", packet_id)
            }
        }
    }
}

/// A reconnecting publish/subscribe client.
///
/// - `N` opens transport connections.
/// - `S` supplies credentials, read once per connection attempt.
/// - `K` measures time and sleeps.
/// - `F` is the broker wire protocol.
///
/// Handlers and callbacks are borrowed for `'a`, so they must be declared
/// before the client.
pub struct Client<'a, N, S, K, F = Mqtt311>
where
    N: Connect,
    S: CredentialSource,
    K: Clock,
    F: Framing,
{
    network: N,
    credentials: S,
    clock: K,
    options: Options,
    state: ConnectionState,
    session: Session<N::Connection, F>,
    dispatcher: Dispatcher<F>,
    registry: Registry<'a>,
    on_connect: Option<&'a mut dyn FnMut()>,
    on_disconnect: Option<&'a mut dyn FnMut()>,
    on_status: Option<&'a mut dyn FnMut(&Status)>,
    backoff: Backoff,
    next_attempt_at: Option<u64>,
    reconnect_attempts: u32,
    reconnect_enabled: bool,
    stop: Option<&'a AtomicBool>,
}

impl<'a, N, S, K> Client<'a, N, S, K, Mqtt311>
where
    N: Connect,
    S: CredentialSource,
    K: Clock,
{
    /// Create a disconnected MQTT 3.1.1 client.
    pub fn new(network: N, credentials: S, clock: K, options: Options) -> Self {
        Self::with_framing(network, credentials, clock, options)
    }
}

impl<'a, N, S, K, F> Client<'a, N, S, K, F>
where
    N: Connect,
    S: CredentialSource,
    K: Clock,
    F: Framing,
{
    /// Create a disconnected client speaking the wire protocol `F`.
    pub fn with_framing(network: N, credentials: S, clock: K, options: Options) -> Self {
        Self {
            network,
            credentials,
            clock,
            options,
            state: ConnectionState::Disconnected,
            session: Session::new(),
            dispatcher: Dispatcher::new(),
            registry: Registry::new(),
            on_connect: None,
            on_disconnect: None,
            on_status: None,
            backoff: Backoff::new(options.backoff),
            next_attempt_at: None,
            reconnect_attempts: 0,
            reconnect_enabled: true,
            stop: None,
        }
    }

    /// Establish a session.
    ///
    /// Replays every registered subscription and then calls `on_connect`. On
    /// failure the client stays disconnected and the run loop takes over
    /// retrying. Calling this after [`disconnect`](Self::disconnect) turns
    /// automatic reconnection back on.
    pub fn connect(&mut self) -> Result<(), ConnectError> {
        if self.state != ConnectionState::Disconnected {
            return Err(ConnectError::AlreadyConnected);
        }
        self.reconnect_enabled = true;
        self.establish().inspect_err(|_| self.schedule_reconnect())
    }

    /// Close the session gracefully and stop reconnecting until the next
    /// [`connect`](Self::connect).
    pub fn disconnect(&mut self) {
        self.reconnect_enabled = false;
        self.next_attempt_at = None;
        self.backoff.reset();
        if self.state != ConnectionState::Connected {
            return;
        }
        info!("disconnecting");
        self.teardown(true);
        if let Some(callback) = self.on_disconnect.as_mut() {
            callback();
        }
    }

    /// Route messages on `topic` to `handler` at QoS 0.
    ///
    /// See [`subscribe_with_qos`](Self::subscribe_with_qos).
    pub fn subscribe(
        &mut self,
        topic: &str,
        handler: &'a mut dyn MessageHandler,
    ) -> Result<(), SubscribeError> {
        self.subscribe_with_qos(topic, QoS::AtMostOnce, handler)
    }

    /// Route messages on `topic` (which may be a filter) to `handler`.
    ///
    /// Allowed in any state. The registration is kept across reconnects; when
    /// connected the broker is told immediately, otherwise on the next
    /// connect. Subscribing again replaces the previous handler. Malformed
    /// filters are refused with [`SubscribeError::InvalidTopic`] and never
    /// reach the broker.
    pub fn subscribe_with_qos(
        &mut self,
        topic: &str,
        qos: QoS,
        handler: &'a mut dyn MessageHandler,
    ) -> Result<(), SubscribeError> {
        self.registry.subscribe(topic, qos, handler)?;
        if self.state != ConnectionState::Connected {
            debug!("subscription to {} deferred until connected", topic);
            return Ok(());
        }

        let packet_id = self.session.next_packet_id();
        self.send_now(&Packet::Subscribe {
            packet_id,
            topic,
            qos,
        })
        .map_err(|error| match error {
            SessionError::FrameTooLarge => SubscribeError::FrameTooLarge,
            SessionError::NotOpen | SessionError::Transport => SubscribeError::TransportFault,
        })
    }

    /// Stop routing `topic`. Returns whether it was registered.
    ///
    /// When connected and the topic was registered the broker is told
    /// immediately.
    pub fn unsubscribe(&mut self, topic: &str) -> Result<bool, SubscribeError> {
        if !self.registry.unsubscribe(topic) {
            return Ok(false);
        }
        if self.state == ConnectionState::Connected {
            let packet_id = self.session.next_packet_id();
            self.send_now(&Packet::Unsubscribe { packet_id, topic })
                .map_err(|error| match error {
                    SessionError::FrameTooLarge => SubscribeError::FrameTooLarge,
                    SessionError::NotOpen | SessionError::Transport => {
                        SubscribeError::TransportFault
                    }
                })?;
        }
        Ok(true)
    }

    /// Publish at QoS 0. Nothing is awaited.
    pub fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        self.publish_with_qos(topic, payload, QoS::AtMostOnce)
    }

    /// Publish with the given delivery guarantee.
    ///
    /// At QoS 1 this waits up to `ack_timeout_ms` for the broker's
    /// acknowledgement. Messages arriving meanwhile are delivered as usual.
    /// Empty topics and topics containing wildcards are refused.
    pub fn publish_with_qos(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
    ) -> Result<(), PublishError> {
        if !topic::is_valid_name(topic) {
            return Err(PublishError::InvalidTopic);
        }
        if self.state != ConnectionState::Connected {
            return Err(PublishError::NotConnected);
        }

        let packet_id = match qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => self.session.next_packet_id(),
        };
        let publish = Packet::Publish {
            topic,
            payload,
            qos,
            packet_id,
        };
        match self.send_now(&publish) {
            Ok(()) => {}
            Err(SessionError::FrameTooLarge) => return Err(PublishError::FrameTooLarge),
            Err(SessionError::NotOpen | SessionError::Transport) => {
                return Err(PublishError::TransportFault);
            }
        }

        match qos {
            QoS::AtMostOnce => Ok(()),
            QoS::AtLeastOnce => self.await_puback(packet_id),
        }
    }

    /// Service the connection.
    ///
    /// Each tick reads and routes inbound traffic, handles keep-alive and,
    /// while disconnected, attempts a reconnect once its backoff delay has
    /// passed. With `blocking` set this repeats, sleeping `poll_interval_ms`
    /// between ticks, until the stop signal is raised. Otherwise one tick is
    /// performed.
    ///
    /// When the stop signal is seen the session is closed gracefully before
    /// returning.
    pub fn run_loop(&mut self, blocking: bool) {
        loop {
            self.tick();
            if self.stop_requested() {
                info!("stop requested");
                self.disconnect();
                return;
            }
            if !blocking {
                return;
            }
            self.idle();
        }
    }

    /// Called after every successful connect.
    pub fn on_connect(&mut self, callback: &'a mut dyn FnMut()) {
        self.on_connect = Some(callback);
    }

    /// Called whenever an established session ends.
    pub fn on_disconnect(&mut self, callback: &'a mut dyn FnMut()) {
        self.on_disconnect = Some(callback);
    }

    /// Called with every background [`Status`] event.
    pub fn on_status(&mut self, callback: &'a mut dyn FnMut(&Status)) {
        self.on_status = Some(callback);
    }

    /// Flag polled once per tick; raising it ends [`run_loop`](Self::run_loop).
    pub fn set_stop_signal(&mut self, stop: &'a AtomicBool) {
        self.stop = Some(stop);
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reconnection attempts made by the run loop so far.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Whether a handler is registered under exactly `topic`.
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.registry.contains(topic)
    }

    /// The options the client was built with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    fn tick(&mut self) {
        match self.state {
            ConnectionState::Connected => self.service_connection(),
            ConnectionState::Disconnected if self.reconnect_enabled => self.maybe_reconnect(),
            _ => {}
        }
    }

    fn service_connection(&mut self) {
        if let Err(fault) = self.poll_inbound(None) {
            self.handle_fault(fault);
            return;
        }

        let now = self.clock.now_ms();
        if self.session.keepalive_overdue(now) {
            self.handle_fault(Fault::KeepAliveTimeout);
        } else if self.session.keepalive_due(now) && self.session.send_keepalive(now).is_err() {
            self.handle_fault(Fault::Transport);
        }
    }

    /// Drain pending bytes and route the events they complete.
    ///
    /// Returns whether an acknowledgement for `awaiting` was seen.
    fn poll_inbound(&mut self, awaiting: Option<u16>) -> Result<bool, Fault> {
        let Self {
            session,
            dispatcher,
            registry,
            on_status,
            state,
            clock,
            ..
        } = self;

        let mut chunk = [0u8; READ_CHUNK];
        let mut acked = false;
        for _ in 0..MAX_READS_PER_TICK {
            let n = session.read(&mut chunk).map_err(|_| Fault::Transport)?;

            for event in dispatcher.feed(&chunk[..n]) {
                match event {
                    Ok(DecodedEvent::Publish { message, ack }) => {
                        trace!("message on {}", message.topic.as_str());
                        deliver(*state, registry, &message);
                        if let Some(packet_id) = ack {
                            session
                                .send(&Packet::PubAck { packet_id }, clock.now_ms())
                                .map_err(|_| Fault::Transport)?;
                        }
                    }
                    Ok(DecodedEvent::PubAck { packet_id }) => {
                        if awaiting == Some(packet_id) {
                            acked = true;
                        } else {
                            debug!("ignoring acknowledgement for {}", packet_id);
                        }
                    }
                    Ok(DecodedEvent::SubAck {
                        packet_id,
                        granted: None,
                    }) => {
                        warn!("subscription {} refused", packet_id);
                        report(on_status, Status::SubscribeRejected { packet_id });
                    }
                    Ok(DecodedEvent::SubAck { packet_id, .. })
                    | Ok(DecodedEvent::UnsubAck { packet_id }) => {
                        trace!("request {} acknowledged", packet_id);
                    }
                    Ok(DecodedEvent::KeepAliveAck) => session.keepalive_acked(),
                    Ok(DecodedEvent::Disconnect) => return Err(Fault::PeerDisconnected),
                    Ok(DecodedEvent::ConnAck { .. }) => debug!("ignoring stray acknowledgement"),
                    Err(error) => report(on_status, Status::DecodeFailed(error)),
                }
            }

            if n == 0 {
                break;
            }
        }
        Ok(acked)
    }

    fn await_puback(&mut self, packet_id: u16) -> Result<(), PublishError> {
        let deadline = self.clock.now_ms() + u64::from(self.options.ack_timeout_ms);
        loop {
            match self.poll_inbound(Some(packet_id)) {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(fault) => {
                    self.handle_fault(fault);
                    return Err(PublishError::TransportFault);
                }
            }

            let now = self.clock.now_ms();
            if now >= deadline {
                warn!("publish {} not acknowledged", packet_id);
                return Err(PublishError::Timeout);
            }
            let remaining = u32::try_from(deadline - now).unwrap_or(u32::MAX);
            self.clock.delay_ms(ACK_POLL_MS.min(remaining));
        }
    }

    fn maybe_reconnect(&mut self) {
        let now = self.clock.now_ms();
        if self.next_attempt_at.is_some_and(|at| now < at) {
            return;
        }

        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
        info!("reconnect attempt {}", self.reconnect_attempts);
        if let Err(error) = self.establish() {
            self.report(Status::ConnectFailed(error));
            self.schedule_reconnect();
        }
    }

    fn establish(&mut self) -> Result<(), ConnectError> {
        let credentials = self.credentials.credentials().map_err(|_| {
            warn!("credentials unavailable");
            ConnectError::CredentialsUnavailable
        })?;

        self.transition(ConnectionState::Connecting);
        info!(
            "connecting to {}:{} as {}",
            credentials.host.as_str(),
            credentials.port,
            credentials.client_id.as_str()
        );
        let opened = self.session.open(
            &mut self.network,
            &credentials,
            &self.options,
            &mut self.dispatcher,
            &mut self.clock,
        );
        if let Err(error) = opened {
            self.transition(ConnectionState::Disconnected);
            return Err(error);
        }
        self.transition(ConnectionState::Connected);

        if self.replay_subscriptions().is_err() {
            warn!("stream failed while restoring subscriptions");
            self.teardown(false);
            return Err(ConnectError::TransportFault);
        }

        self.backoff.reset();
        self.next_attempt_at = None;
        if let Some(callback) = self.on_connect.as_mut() {
            callback();
        }
        self.report(Status::Connected);
        Ok(())
    }

    fn replay_subscriptions(&mut self) -> Result<(), SessionError> {
        let now = self.clock.now_ms();
        for (topic, qos) in self.registry.topics() {
            let packet_id = self.session.next_packet_id();
            self.session.send(
                &Packet::Subscribe {
                    packet_id,
                    topic,
                    qos,
                },
                now,
            )?;
            debug!("subscribed to {}", topic);
        }
        Ok(())
    }

    fn send_now(&mut self, packet: &Packet<'_>) -> Result<(), SessionError> {
        let now = self.clock.now_ms();
        let sent = self.session.send(packet, now);
        if let Err(SessionError::NotOpen | SessionError::Transport) = sent {
            self.handle_fault(Fault::Transport);
        }
        sent
    }

    fn handle_fault(&mut self, fault: Fault) {
        warn!("connection lost: {:?}", fault);
        self.teardown(false);
        if let Some(callback) = self.on_disconnect.as_mut() {
            callback();
        }
        self.report(Status::ConnectionLost(fault));
        if self.reconnect_enabled {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&mut self) {
        let delay_ms = self.backoff.next_delay();
        self.next_attempt_at = Some(self.clock.now_ms() + u64::from(delay_ms));
        debug!("next reconnect in {} ms", delay_ms);
        self.report(Status::ReconnectScheduled {
            attempt: self.reconnect_attempts.saturating_add(1),
            delay_ms,
        });
    }

    fn teardown(&mut self, graceful: bool) {
        self.transition(ConnectionState::Disconnecting);
        if graceful {
            self.session.close();
        } else {
            self.session.abort();
        }
        self.transition(ConnectionState::Disconnected);
        self.dispatcher.reset();
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state.can_transition_to(next) {
            debug!("{:?} -> {:?}", self.state, next);
            self.state = next;
        } else {
            error!("refusing transition {:?} -> {:?}", self.state, next);
        }
    }

    fn idle(&mut self) {
        let delay = match self.next_attempt_at {
            Some(at) if self.state == ConnectionState::Disconnected && self.reconnect_enabled => {
                // `MAX_IDLE_MS` fits a u32.
                at.saturating_sub(self.clock.now_ms()).min(MAX_IDLE_MS) as u32
            }
            _ => self.options.poll_interval_ms,
        };
        if delay > 0 {
            self.clock.delay_ms(delay);
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop.is_some_and(|stop| stop.load(Ordering::Acquire))
    }

    fn report(&mut self, status: Status) {
        report(&mut self.on_status, status);
    }
}

fn report(on_status: &mut Option<&mut dyn FnMut(&Status)>, status: Status) {
    if let Some(callback) = on_status.as_mut() {
        callback(&status);
    }
}

impl<N, S, K, F> core::fmt::Debug for Client<'_, N, S, K, F>
where
    N: Connect,
    S: CredentialSource,
    K: Clock,
    F: Framing,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state)
            .field("session", &self.session)
            .field("registry", &self.registry)
            .field("reconnect_attempts", &self.reconnect_attempts)
            .field("next_attempt_at", &self.next_attempt_at)
            .finish()
    }
}
