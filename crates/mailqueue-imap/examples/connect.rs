#![allow(clippy::doc_markdown, clippy::uninlined_format_args)]
//! Example: queue a whole session up front and watch it run
//!
//! Connects, logs in, selects INBOX, fetches the newest few envelopes and
//! logs out. Every call is submitted before the first one completes; the
//! session runs them one at a time in order.
//!
//! ## Running
//!
//! ```bash
//! IMAP_HOST=imap.example.com IMAP_USER=me@example.com IMAP_PASSWORD=secret \
//!     RUST_LOG=mailqueue_imap=debug \
//!     cargo run --package mailqueue-imap --example connect
//! ```
//!
//! `IMAP_PORT` and `IMAP_SECURITY` (`implicit`, `starttls` or `none`) are
//! optional.

use std::env;

use anyhow::{Context, bail};
use mailqueue_imap::{
    Config, Credentials, FetchAttribute, Security, SequenceSet, Session, SessionEvent,
};
use tracing_subscriber::EnvFilter;

fn config_from_env() -> anyhow::Result<Config> {
    let host = env::var("IMAP_HOST").context("IMAP_HOST is not set")?;
    let user = env::var("IMAP_USER").context("IMAP_USER is not set")?;
    let password = env::var("IMAP_PASSWORD").context("IMAP_PASSWORD is not set")?;

    let security = match env::var("IMAP_SECURITY").as_deref() {
        Ok("none") => Security::None,
        Ok("starttls") => Security::StartTls,
        Ok("implicit") | Err(_) => Security::Implicit,
        Ok(other) => bail!("unknown IMAP_SECURITY {other:?}"),
    };

    let mut builder = Config::builder(host)
        .security(security)
        .credentials(Credentials::password(user, password));
    if let Ok(port) = env::var("IMAP_PORT") {
        builder = builder.port(port.parse().context("IMAP_PORT is not a port number")?);
    }
    Ok(builder.build())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config_from_env()?;
    let Some(credentials) = config.credentials.clone() else {
        bail!("no credentials configured");
    };
    println!("Connecting to {}:{}...", config.host, config.port);

    let (session, mut events) = Session::new(config);
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Alert(text) => println!("ALERT: {text}"),
                SessionEvent::Disconnected { reason } => println!("disconnected: {reason}"),
                other => println!("event: {other:?}"),
            }
        }
    });

    // All three are queued before the greeting arrives.
    let connect = session.connect();
    let login = session.authenticate(&credentials);
    let select = session.select("INBOX");

    let capabilities = connect.await?;
    println!("✓ Connected ({} capabilities on greeting)", capabilities.iter().count());
    login.await?;
    println!("✓ Authenticated as {}", credentials.user());
    let status = select.await?;
    println!("✓ INBOX: {} messages, {} recent", status.exists, status.recent);

    if status.exists > 0 {
        let first = status.exists.saturating_sub(4).max(1);
        let range = SequenceSet::range(first, status.exists).context("empty range")?;
        let rows = session
            .fetch(range, vec![FetchAttribute::Uid, FetchAttribute::Envelope])
            .await?;
        for (seq, items) in rows {
            println!("  {seq}: {items:?}");
        }
    }

    session.logout().await?;
    println!("✓ Logged out");
    Ok(())
}
