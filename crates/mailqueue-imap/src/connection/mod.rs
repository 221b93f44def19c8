//! Connection plumbing.
//!
//! This module provides:
//! - Configuration (host, port, security mode, timeouts, credentials)
//! - The [`Transport`] and [`Connector`] seams the engine runs over
//! - TLS/plaintext stream abstraction
//! - The engine's receive buffer

mod buffer;
mod config;
mod stream;

pub use buffer::{ReceiveBuffer, write_all};
pub use config::{Config, ConfigBuilder, Credentials, Security};
pub use stream::{Connector, ImapStream, TcpConnector, Transport, tls_connector};
