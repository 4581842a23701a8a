//! Error taxonomy for the pub/sub client.
//!
//! Errors from calls the application makes (`connect`, `publish`,
//! `subscribe`) are returned to the caller. Errors found while the run loop
//! is servicing the connection in the background are never returned; they are
//! reported through the status callback as a [`Fault`] or [`DecodeError`].

/// Return code carried by a broker's connection acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReturnCode {
    /// The connection was accepted.
    Accepted,
    /// The broker does not speak the requested protocol level.
    UnacceptableProtocolVersion,
    /// The client identifier was refused.
    IdentifierRejected,
    /// The broker is up but the service is unavailable.
    ServerUnavailable,
    /// The user name or auth token was not accepted.
    BadUserNameOrPassword,
    /// The client is not authorized to connect.
    NotAuthorized,
    /// A code outside the range defined by the protocol.
    Other(u8),
}

impl From<u8> for ConnectReturnCode {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::Accepted,
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUserNameOrPassword,
            5 => Self::NotAuthorized,
            other => Self::Other(other),
        }
    }
}

/// Failures establishing a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectError {
    /// The transport could not be opened.
    TransportUnavailable,
    /// The broker answered with a negative acknowledgement.
    Rejected(ConnectReturnCode),
    /// No acknowledgement arrived within the connect timeout.
    Timeout,
    /// The stream broke while the handshake or a keep-alive was in flight.
    TransportFault,
    /// The credential source could not supply credentials.
    CredentialsUnavailable,
    /// `connect` was called while not disconnected.
    AlreadyConnected,
    /// The connect frame does not fit the transmit buffer.
    FrameTooLarge,
}

/// Failures publishing a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishError {
    /// The client is not connected; nothing was sent.
    NotConnected,
    /// The stream broke while sending; the client is now reconnecting.
    TransportFault,
    /// Topic plus payload do not fit the transmit buffer.
    FrameTooLarge,
    /// A QoS 1 publish was sent but not acknowledged in time.
    Timeout,
    /// The topic is empty, contains a wildcard or contains NUL.
    InvalidTopic,
}

/// Failures registering or removing a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeError {
    /// The filter is empty, contains NUL or misplaces a wildcard.
    InvalidTopic,
    /// The topic exceeds `MAX_TOPIC_LEN`.
    TopicTooLong,
    /// `MAX_SUBSCRIPTIONS` topics are already registered.
    RegistryFull,
    /// The registration was kept but the frame could not be sent; it will be
    /// replayed after the client reconnects.
    TransportFault,
    /// The subscribe frame does not fit the transmit buffer.
    FrameTooLarge,
}

/// Why an inbound frame was skipped. Local to that one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The fixed header is not one the client can receive.
    InvalidHeader,
    /// The header parsed but the body does not match its packet type.
    MalformedFrame,
    /// The topic is not valid UTF-8.
    InvalidUtf8,
    /// The topic exceeds `MAX_TOPIC_LEN`.
    TopicTooLong,
    /// The payload exceeds `MAX_PAYLOAD_LEN`.
    PayloadTooLarge,
    /// A publish used a delivery guarantee this client does not implement.
    UnsupportedQos,
    /// The frame is larger than the receive buffer.
    FrameTooLarge,
}

/// Why a live connection was torn down by the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Reading or writing the transport failed, or the peer closed it.
    Transport,
    /// The broker sent a disconnect.
    PeerDisconnected,
    /// A keep-alive went unanswered for a full keep-alive interval.
    KeepAliveTimeout,
}

macro_rules! impl_display {
    ($ty:ty { $($variant:pat => $text:expr),+ $(,)? }) => {
        impl core::fmt::Display for $ty {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                match self {
                    $($variant => f.write_str($text),)+
                }
            }
        }

        #[cfg(feature = "std")]
        impl std::error::Error for $ty {}
    };
}

impl_display!(ConnectError {
    ConnectError::TransportUnavailable => "transport unavailable",
    ConnectError::Rejected(_) => "connection rejected by broker",
    ConnectError::Timeout => "timed out waiting for connection acknowledgement",
    ConnectError::TransportFault => "transport failed during handshake",
    ConnectError::CredentialsUnavailable => "credentials unavailable",
    ConnectError::AlreadyConnected => "client is not disconnected",
    ConnectError::FrameTooLarge => "connect frame too large",
});

impl_display!(PublishError {
    PublishError::NotConnected => "not connected",
    PublishError::TransportFault => "transport failed while publishing",
    PublishError::FrameTooLarge => "publish frame too large",
    PublishError::Timeout => "timed out waiting for publish acknowledgement",
    PublishError::InvalidTopic => "invalid topic name",
});

impl_display!(SubscribeError {
    SubscribeError::InvalidTopic => "invalid topic filter",
    SubscribeError::TopicTooLong => "topic too long",
    SubscribeError::RegistryFull => "subscription registry full",
    SubscribeError::TransportFault => "transport failed while subscribing",
    SubscribeError::FrameTooLarge => "subscribe frame too large",
});

impl_display!(DecodeError {
    DecodeError::InvalidHeader => "invalid frame header",
    DecodeError::MalformedFrame => "malformed frame",
    DecodeError::InvalidUtf8 => "topic is not valid UTF-8",
    DecodeError::TopicTooLong => "topic too long",
    DecodeError::PayloadTooLarge => "payload too large",
    DecodeError::UnsupportedQos => "unsupported QoS",
    DecodeError::FrameTooLarge => "frame larger than receive buffer",
});

impl_display!(Fault {
    Fault::Transport => "transport fault",
    Fault::PeerDisconnected => "broker closed the session",
    Fault::KeepAliveTimeout => "keep-alive unanswered",
});

#[cfg(feature = "defmt")]
impl defmt::Format for ConnectReturnCode {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ConnectReturnCode::Accepted => defmt::write!(f, "Accepted"),
            ConnectReturnCode::UnacceptableProtocolVersion => {
                defmt::write!(f, "UnacceptableProtocolVersion")
            }
            ConnectReturnCode::IdentifierRejected => defmt::write!(f, "IdentifierRejected"),
            ConnectReturnCode::ServerUnavailable => defmt::write!(f, "ServerUnavailable"),
            ConnectReturnCode::BadUserNameOrPassword => defmt::write!(f, "BadUserNameOrPassword"),
            ConnectReturnCode::NotAuthorized => defmt::write!(f, "NotAuthorized"),
            ConnectReturnCode::Other(code) => defmt::write!(f, "Other({})", code),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConnectError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ConnectError::TransportUnavailable => defmt::write!(f, "TransportUnavailable"),
            ConnectError::Rejected(code) => defmt::write!(f, "Rejected({})", code),
            ConnectError::Timeout => defmt::write!(f, "Timeout"),
            ConnectError::TransportFault => defmt::write!(f, "TransportFault"),
            ConnectError::CredentialsUnavailable => defmt::write!(f, "CredentialsUnavailable"),
            ConnectError::AlreadyConnected => defmt::write!(f, "AlreadyConnected"),
            ConnectError::FrameTooLarge => defmt::write!(f, "FrameTooLarge"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PublishError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            PublishError::NotConnected => defmt::write!(f, "NotConnected"),
            PublishError::TransportFault => defmt::write!(f, "TransportFault"),
            PublishError::FrameTooLarge => defmt::write!(f, "FrameTooLarge"),
            PublishError::Timeout => defmt::write!(f, "Timeout"),
            PublishError::InvalidTopic => defmt::write!(f, "InvalidTopic"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SubscribeError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            SubscribeError::InvalidTopic => defmt::write!(f, "InvalidTopic"),
            SubscribeError::TopicTooLong => defmt::write!(f, "TopicTooLong"),
            SubscribeError::RegistryFull => defmt::write!(f, "RegistryFull"),
            SubscribeError::TransportFault => defmt::write!(f, "TransportFault"),
            SubscribeError::FrameTooLarge => defmt::write!(f, "FrameTooLarge"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DecodeError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            DecodeError::InvalidHeader => defmt::write!(f, "InvalidHeader"),
            DecodeError::MalformedFrame => defmt::write!(f, "MalformedFrame"),
            DecodeError::InvalidUtf8 => defmt::write!(f, "InvalidUtf8"),
            DecodeError::TopicTooLong => defmt::write!(f, "TopicTooLong"),
            DecodeError::PayloadTooLarge => defmt::write!(f, "PayloadTooLarge"),
            DecodeError::UnsupportedQos => defmt::write!(f, "UnsupportedQos"),
            DecodeError::FrameTooLarge => defmt::write!(f, "FrameTooLarge"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Fault {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Fault::Transport => defmt::write!(f, "Transport"),
            Fault::PeerDisconnected => defmt::write!(f, "PeerDisconnected"),
            Fault::KeepAliveTimeout => defmt::write!(f, "KeepAliveTimeout"),
        }
    }
}
