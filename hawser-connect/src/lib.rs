#![doc = concat!(
    "[![crates.io](https://img.shields.io/crates/v/", env!("CARGO_PKG_NAME"), ")](https://crates.io/crates/", env!("CARGO_PKG_NAME"), ")",
    " ",
    "[![docs.rs](https://img.shields.io/docsrs/", env!("CARGO_PKG_NAME"), ")](https://docs.rs/", env!("CARGO_PKG_NAME"), ")"
)]
#![doc = ""]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! The [`Service`] turns an authenticated [`hawser::Session`] into a
//! [`Connect`] multiplexer, from which [`channel::Channel`]s are
//! opened and accepted, each carrying windowed data streams, channel
//! requests and a graceful close handshake.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    clippy::unwrap_used,
    clippy::panic,
    clippy::unimplemented,
    clippy::todo,
    clippy::undocumented_unsafe_blocks
)]
#![forbid(unsafe_code)]

const SERVICE_NAME: &str = "ssh-connection";

mod connect;
pub use connect::Connect;

pub mod channel;
pub mod channel_open;
pub mod global_request;

mod mux;

mod error;
pub use error::{Error, Result};

use hawser::{session::Session, side::Side, Pipe};

use channel::WindowConfig;

/// The `ssh-connection` service, usable either as a
/// [`hawser::service::Handler`] (server side) or as a
/// [`hawser::service::Request`] (client side).
#[derive(Debug, Default)]
pub struct Service {
    window: WindowConfig,
}

impl Service {
    /// Create the service with the default channel window sizing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the window sizing applied to every channel.
    pub fn window(mut self, window: WindowConfig) -> Self {
        self.window = window;

        self
    }
}

impl hawser::service::Handler for Service {
    type Err = hawser::Error;
    type Ok<IO: Pipe, S: Side> = Connect<IO, S>;

    const SERVICE_NAME: &'static str = SERVICE_NAME;

    async fn on_request<IO, S>(
        &mut self,
        session: Session<IO, S>,
    ) -> Result<Self::Ok<IO, S>, Self::Err>
    where
        IO: Pipe,
        S: Side,
    {
        Ok(Connect::new(session, self.window))
    }
}

impl hawser::service::Request for Service {
    type Err = hawser::Error;
    type Ok<IO: Pipe, S: Side> = Connect<IO, S>;

    const SERVICE_NAME: &'static str = SERVICE_NAME;

    async fn on_accept<IO, S>(
        &mut self,
        session: Session<IO, S>,
    ) -> Result<Self::Ok<IO, S>, Self::Err>
    where
        IO: Pipe,
        S: Side,
    {
        Ok(Connect::new(session, self.window))
    }
}
