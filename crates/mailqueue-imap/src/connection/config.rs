//! Session configuration.

use std::fmt;
use std::time::Duration;

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// Cleartext (port 143).
    None,
    /// Cleartext greeting, then STARTTLS before anything else (port 143).
    StartTls,
    /// TLS from the first byte (port 993).
    #[default]
    Implicit,
}

impl Security {
    /// Returns the default port for this security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None | Self::StartTls => 143,
            Self::Implicit => 993,
        }
    }
}

/// How the session logs in after connecting or reconnecting.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// LOGIN with a user name and password.
    Password {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
    /// AUTHENTICATE XOAUTH2 with a bearer token.
    OAuth2 {
        /// Account address.
        user: String,
        /// Access token.
        token: String,
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

    /// XOAUTH2 credentials.
    #[must_use]
    pub fn oauth2(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self::OAuth2 {
            user: user.into(),
            token: token.into(),
        }
    }

    /// The account name, for logs.
    #[must_use]
    pub fn user(&self) -> &str {
        match self {
            Self::Password { username, .. } => username,
            Self::OAuth2 { user, .. } => user,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::OAuth2 { user, .. } => f
                .debug_struct("OAuth2")
                .field("user", user)
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Bound on TCP connect plus TLS handshake.
    pub connect_timeout: Duration,
    /// Watchdog bound on one in-flight operation. `None` disables it.
    pub operation_timeout: Option<Duration>,
    /// Used by reconnect to log in again.
    pub credentials: Option<Credentials>,
    /// How many times reconnect tries before giving up.
    pub max_reconnect_attempts: u32,
}

impl Config {
    /// Implicit TLS on port 993 with default timeouts.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        ConfigBuilder::new(host).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    host: String,
    port: Option<u16>,
    security: Security,
    connect_timeout: Duration,
    operation_timeout: Option<Duration>,
    credentials: Option<Credentials>,
    max_reconnect_attempts: u32,
}

impl ConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: Security::Implicit,
            connect_timeout: Duration::from_secs(30),
            operation_timeout: Some(Duration::from_secs(30)),
            credentials: None,
            max_reconnect_attempts: 3,
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

    /// Sets the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-operation watchdog; `None` disables it.
    #[must_use]
    pub const fn operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Sets the credentials used by reconnect.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the reconnect attempt bound.
    #[must_use]
    pub const fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        Config {
            host: self.host,
            port: self.port.unwrap_or_else(|| self.security.default_port()),
            security: self.security,
            connect_timeout: self.connect_timeout,
            operation_timeout: self.operation_timeout,
            credentials: self.credentials,
            max_reconnect_attempts: self.max_reconnect_attempts,
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
    fn test_defaults() {
        let config = Config::new("imap.example.com");
        assert_eq!(config.port, 993);
        assert_eq!(config.security, Security::Implicit);
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.operation_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.max_reconnect_attempts, 3);
        assert!(config.credentials.is_none());
    }

    #[test]
    fn test_port_follows_security() {
        let config = Config::builder("mail.local")
            .security(Security::StartTls)
            .build();
        assert_eq!(config.port, 143);

        let config = Config::builder("mail.local")
            .security(Security::None)
            .port(1143)
            .operation_timeout(None)
            .build();
        assert_eq!(config.port, 1143);
        assert!(config.operation_timeout.is_none());
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials::password("alice", "hunter2");
        let debug = format!("{creds:?}");
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));

        let creds = Credentials::oauth2("bob@example.com", "ya29.secret");
        assert!(!format!("{creds:?}").contains("ya29"));
        assert_eq!(creds.user(), "bob@example.com");
    }
}
