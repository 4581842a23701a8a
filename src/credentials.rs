//! Broker credentials and where they come from.
//!
//! The client reads credentials exactly once per connection attempt through a
//! [`CredentialSource`]. How they are stored on the device (flash, a secure
//! element, a provisioning file) is up to the application; a plain
//! [`Credentials`] value is itself a source, and [`Credentials::from_json`]
//! parses the common "secrets" document layout.

use heapless::String;
use serde::Deserialize;

/// Maximum length of the broker host name.
pub const MAX_HOST_LEN: usize = 64;
/// Maximum length of the client identifier.
pub const MAX_CLIENT_ID_LEN: usize = 32;
/// Maximum length of the user name.
pub const MAX_USERNAME_LEN: usize = 64;
/// Maximum length of the authentication token.
pub const MAX_TOKEN_LEN: usize = 128;

/// Default unencrypted MQTT port.
pub const DEFAULT_PORT: u16 = 1883;

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Everything needed to authenticate against a broker.
///
/// `Debug` output never includes the token.
///
/// # Examples
///
/// ```rust
/// use libpubsub::credentials::Credentials;
///
/// let secrets = r#"{
///     "host": "broker.example.com",
///     "client_id": "porch-light",
///     "username": "alice",
///     "auth_token": "aio_0123456789"
/// }"#;
///
/// let credentials = Credentials::from_json(secrets).unwrap();
/// assert_eq!(credentials.port, 1883);
/// assert!(!format!("{:?}", credentials).contains("aio_0123456789"));
/// ```
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    /// Broker host name or address.
    pub host: String<MAX_HOST_LEN>,
    /// Broker port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Client identity presented in the handshake.
    pub client_id: String<MAX_CLIENT_ID_LEN>,
    /// User name; empty when the broker does not use one.
    #[serde(default)]
    pub username: String<MAX_USERNAME_LEN>,
    /// Secret presented as the handshake password.
    #[serde(default)]
    pub auth_token: String<MAX_TOKEN_LEN>,
}

/// Failures reading or building credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    /// The backing store could not be read right now.
    Unavailable,
    /// The secrets document is not valid JSON of the expected shape.
    Malformed,
    /// A field does not fit its fixed-capacity buffer.
    TooLong,
}

impl core::fmt::Display for CredentialError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CredentialError::Unavailable => f.write_str("credentials unavailable"),
            CredentialError::Malformed => f.write_str("malformed credentials document"),
            CredentialError::TooLong => f.write_str("credential field too long"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CredentialError {}

#[cfg(feature = "defmt")]
impl defmt::Format for CredentialError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            CredentialError::Unavailable => defmt::write!(f, "Unavailable"),
            CredentialError::Malformed => defmt::write!(f, "Malformed"),
            CredentialError::TooLong => defmt::write!(f, "TooLong"),
        }
    }
}

impl Credentials {
    /// Build credentials for `host` on the default port.
    pub fn new(
        host: &str,
        client_id: &str,
        username: &str,
        auth_token: &str,
    ) -> Result<Self, CredentialError> {
        Ok(Self {
            host: String::try_from(host).map_err(|_| CredentialError::TooLong)?,
            port: DEFAULT_PORT,
            client_id: String::try_from(client_id).map_err(|_| CredentialError::TooLong)?,
            username: String::try_from(username).map_err(|_| CredentialError::TooLong)?,
            auth_token: String::try_from(auth_token).map_err(|_| CredentialError::TooLong)?,
        })
    }

    /// Same credentials, different port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Parse a JSON secrets document.
    ///
    /// `port` defaults to 1883; `username` and `auth_token` default to empty.
    pub fn from_json(json: &str) -> Result<Self, CredentialError> {
        serde_json_core::from_str::<Credentials>(json)
            .map(|(credentials, _)| credentials)
            .map_err(|_| CredentialError::Malformed)
    }
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host.as_str())
            .field("port", &self.port)
            .field("client_id", &self.client_id.as_str())
            .field("username", &self.username.as_str())
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

/// Supplies broker credentials on demand.
pub trait CredentialSource {
    /// Fetch the current credentials. Called once per connection attempt.
    fn credentials(&mut self) -> Result<Credentials, CredentialError>;
}

impl CredentialSource for Credentials {
    fn credentials(&mut self) -> Result<Credentials, CredentialError> {
        Ok(self.clone())
    }
}
