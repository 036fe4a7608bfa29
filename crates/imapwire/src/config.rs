//! Connection configuration types.
//!
//! Configuration is passed explicitly into [`Session`](crate::Session) and the
//! transport; nothing here is global.

use std::time::Duration;

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// No encryption (port 143). **Not recommended for production.**
    None,
    /// TLS from the start, `ssl` flavour (port 993).
    Ssl,
    /// TLS from the start (port 993). **Recommended.**
    #[default]
    Tls,
    /// Start with plaintext, upgrade with STARTTLS (port 143).
    StartTls,
}

impl Security {
    /// Returns the default port for this security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None | Self::StartTls => 143,
            Self::Ssl | Self::Tls => 993,
        }
    }

    /// Returns true if TLS is negotiated right after the TCP connect.
    #[must_use]
    pub const fn is_implicit(self) -> bool {
        matches!(self, Self::Ssl | Self::Tls)
    }
}

impl std::str::FromStr for Security {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "none" | "false" => Ok(Self::None),
            "ssl" => Ok(Self::Ssl),
            "tls" => Ok(Self::Tls),
            "starttls" => Ok(Self::StartTls),
            other => Err(crate::Error::Runtime(format!(
                "unknown encryption mode: {other}"
            ))),
        }
    }
}

/// Which identifier a message operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequenceMode {
    /// Unique identifiers (`UID FETCH`, `UID STORE`, ...).
    #[default]
    Uid,
    /// Message sequence numbers.
    MessageNumber,
}

impl SequenceMode {
    /// Prefixes a command with `UID` when addressing by UID.
    #[must_use]
    pub fn command(self, command: &str) -> String {
        match self {
            Self::Uid => format!("UID {command}"),
            Self::MessageNumber => command.to_string(),
        }
    }
}

/// HTTP CONNECT proxy used to tunnel the IMAP connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Proxy address as `host:port`.
    pub address: String,
    /// Send the request target in absolute form (`imap://host:port`).
    pub request_fulluri: bool,
    /// Basic-auth user name.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
}

impl ProxyConfig {
    /// Creates a proxy configuration without credentials.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            request_fulluri: false,
            username: None,
            password: None,
        }
    }

    /// Sets basic-auth credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the full-URI flag.
    #[must_use]
    pub const fn request_fulluri(mut self, enabled: bool) -> Self {
        self.request_fulluri = enabled;
        self
    }
}

/// Account credentials.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// `LOGIN` with a password.
    Password {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
    /// `AUTHENTICATE XOAUTH2` with a bearer token.
    OAuth2 {
        /// User name.
        username: String,
        /// Access token.
        access_token: String,
    },
}

impl Credentials {
    /// Password credentials.
    #[must_use]
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Password {
            username: username.into(),
            password: password.into(),
        }
    }

    /// OAuth2 credentials.
    #[must_use]
    pub fn oauth2(username: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self::OAuth2 {
            username: username.into(),
            access_token: access_token.into(),
        }
    }

    /// The user name.
    #[must_use]
    pub fn username(&self) -> &str {
        match self {
            Self::Password { username, .. } | Self::OAuth2 { username, .. } => username,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::OAuth2 { username, .. } => f
                .debug_struct("OAuth2")
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

/// Per-connection knobs consumed by a [`Session`](crate::Session).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Bound on every blocking read; `None` waits forever.
    pub stream_timeout: Option<Duration>,
    /// Echo raw traffic at `debug` level.
    pub debug: bool,
    /// Keep the message-number to UID map between calls.
    pub uid_cache: bool,
    /// Identifier type handed to IDLE callbacks.
    pub sequence: SequenceMode,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            stream_timeout: Some(Duration::from_secs(30)),
            debug: false,
            uid_cache: true,
            sequence: SequenceMode::MessageNumber,
        }
    }
}

/// IMAP connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Verify the server certificate chain and name.
    pub validate_cert: bool,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Read timeout for established connections.
    pub stream_timeout: Option<Duration>,
    /// Optional HTTP CONNECT proxy.
    pub proxy: Option<ProxyConfig>,
    /// Echo raw traffic.
    pub debug: bool,
    /// Enable the UID cache.
    pub uid_cache: bool,
    /// Identifier type handed to IDLE callbacks.
    pub sequence: SequenceMode,
}

impl Config {
    /// Creates a new configuration with implicit TLS on port 993.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        ConfigBuilder::new(host).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }

    /// Returns the options each session opened with this config uses.
    #[must_use]
    pub const fn session_options(&self) -> SessionOptions {
        SessionOptions {
            stream_timeout: self.stream_timeout,
            debug: self.debug,
            uid_cache: self.uid_cache,
            sequence: self.sequence,
        }
    }
}

/// Builder for connection configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    host: String,
    port: Option<u16>,
    security: Security,
    validate_cert: bool,
    connect_timeout: Duration,
    stream_timeout: Option<Duration>,
    proxy: Option<ProxyConfig>,
    debug: bool,
    uid_cache: bool,
    sequence: SequenceMode,
}

impl ConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        let defaults = SessionOptions::default();
        Self {
            host: host.into(),
            port: None,
            security: Security::Tls,
            validate_cert: true,
            connect_timeout: Duration::from_secs(30),
            stream_timeout: defaults.stream_timeout,
            proxy: None,
            debug: defaults.debug,
            uid_cache: defaults.uid_cache,
            sequence: defaults.sequence,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Enables or disables certificate validation.
    #[must_use]
    pub const fn validate_cert(mut self, validate: bool) -> Self {
        self.validate_cert = validate;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the read timeout; `None` disables it.
    #[must_use]
    pub const fn stream_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stream_timeout = timeout;
        self
    }

    /// Tunnels the connection through an HTTP proxy.
    #[must_use]
    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Enables raw traffic echo.
    #[must_use]
    pub const fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Enables or disables the UID cache.
    #[must_use]
    pub const fn uid_cache(mut self, enabled: bool) -> Self {
        self.uid_cache = enabled;
        self
    }

    /// Sets the identifier type handed to IDLE callbacks.
    #[must_use]
    pub const fn sequence(mut self, sequence: SequenceMode) -> Self {
        self.sequence = sequence;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        Config {
            host: self.host,
            port: self.port.unwrap_or_else(|| self.security.default_port()),
            security: self.security,
            validate_cert: self.validate_cert,
            connect_timeout: self.connect_timeout,
            stream_timeout: self.stream_timeout,
            proxy: self.proxy,
            debug: self.debug,
            uid_cache: self.uid_cache,
            sequence: self.sequence,
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        assert_eq!(Security::None.default_port(), 143);
        assert_eq!(Security::StartTls.default_port(), 143);
        assert_eq!(Security::Ssl.default_port(), 993);
        assert_eq!(Security::Tls.default_port(), 993);
    }

    #[test]
    fn test_security_from_str() {
        assert_eq!("SSL".parse::<Security>().unwrap(), Security::Ssl);
        assert_eq!("starttls".parse::<Security>().unwrap(), Security::StartTls);
        assert_eq!("none".parse::<Security>().unwrap(), Security::None);
        assert!("smoke-signals".parse::<Security>().is_err());
    }

    #[test]
    fn test_config_new() {
        let config = Config::new("imap.example.com");
        assert_eq!(config.host, "imap.example.com");
        assert_eq!(config.port, 993);
        assert_eq!(config.security, Security::Tls);
        assert!(config.validate_cert);
        assert!(config.uid_cache);
        assert!(config.proxy.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder("imap.example.com")
            .port(10993)
            .security(Security::Ssl)
            .validate_cert(false)
            .connect_timeout(Duration::from_secs(10))
            .stream_timeout(Some(Duration::from_secs(5)))
            .debug(true)
            .uid_cache(false)
            .build();

        assert_eq!(config.port, 10993);
        assert_eq!(config.security, Security::Ssl);
        assert!(!config.validate_cert);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));

        let options = config.session_options();
        assert_eq!(options.stream_timeout, Some(Duration::from_secs(5)));
        assert!(options.debug);
        assert!(!options.uid_cache);
    }

    #[test]
    fn test_config_builder_default_port() {
        let config = Config::builder("imap.example.com")
            .security(Security::StartTls)
            .build();

        assert_eq!(config.port, 143);
    }

    #[test]
    fn test_sequence_mode_command() {
        assert_eq!(SequenceMode::Uid.command("FETCH"), "UID FETCH");
        assert_eq!(SequenceMode::MessageNumber.command("FETCH"), "FETCH");
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let credentials = Credentials::password("alice", "hunter2");
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
        assert_eq!(Credentials::oauth2("bob", "tok").username(), "bob");
    }

    #[test]
    fn test_proxy_builder() {
        let proxy = ProxyConfig::new("proxy.local:3128")
            .credentials("alice", "secret")
            .request_fulluri(true);
        assert_eq!(proxy.username.as_deref(), Some("alice"));
        assert!(proxy.request_fulluri);
    }
}
