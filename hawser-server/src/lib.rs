#![doc = concat!(
    "[![crates.io](https://img.shields.io/crates/v/", env!("CARGO_PKG_NAME"), ")](https://crates.io/crates/", env!("CARGO_PKG_NAME"), ")",
    " ",
    "[![docs.rs](https://img.shields.io/docsrs/", env!("CARGO_PKG_NAME"), ")](https://docs.rs/", env!("CARGO_PKG_NAME"), ")"
)]
#![doc = ""]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! [`serve`] drives an authenticated [`hawser_connect::Connect`]:
//! session channels dispatch `shell`/`exec` to a [`command::Command`]
//! factory and `subsystem` requests to the [`subsystem`] registry
//! (with `sftp` built in), while `direct-tcpip` channels and
//! `tcpip-forward` requests are honored behind a
//! [`forward::ForwardingFilter`].

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

use std::sync::Arc;

use futures::TryStreamExt;
use hawser::{side::Side, Pipe};
use hawser_connect::{
    channel_open::{ChannelOpenContext, ChannelOpenFailureReason},
    Connect,
};

mod error;
pub use error::{Error, Result};

pub mod command;
pub mod forward;
pub mod session;
pub mod socket;
pub mod subsystem;

use command::CommandFactory;
use forward::ForwardingFilter;
use subsystem::SubsystemRegistry;

/// The embedder-provided handlers wired into served sessions.
pub struct Handlers {
    pub(crate) commands: Option<Arc<dyn CommandFactory>>,
    pub(crate) subsystems: SubsystemRegistry,
    pub(crate) filter: Arc<dyn ForwardingFilter>,
}

impl Default for Handlers {
    fn default() -> Self {
        Self {
            commands: None,
            subsystems: SubsystemRegistry::new(),
            filter: Arc::new(forward::DenyAll),
        }
    }
}

impl Handlers {
    /// Create an empty set of handlers: no commands, no subsystems,
    /// no forwarding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `shell` and `exec` requests through the `factory`.
    pub fn commands(mut self, factory: impl CommandFactory + 'static) -> Self {
        self.commands = Some(Arc::new(factory));

        self
    }

    /// Register a named subsystem.
    pub fn subsystem(mut self, name: impl Into<String>, subsystem: impl subsystem::Subsystem + 'static) -> Self {
        self.subsystems.insert(name, subsystem);

        self
    }

    /// Register the built-in `sftp` subsystem.
    pub fn sftp(self, config: hawser_sftp::SftpConfig) -> Self {
        self.subsystem("sftp", subsystem::Sftp::new(config))
    }

    /// Allow TCP/IP forwarding through the `filter`.
    pub fn forwarding(mut self, filter: impl ForwardingFilter + 'static) -> Self {
        self.filter = Arc::new(filter);

        self
    }
}

/// Serve every channel and global request of the `connect` layer until
/// the peer disconnects.
pub async fn serve<IO, S>(connect: Arc<Connect<IO, S>>, handlers: Arc<Handlers>) -> Result<()>
where
    IO: Pipe,
    S: Side,
{
    let forwardings = tokio::spawn(forward::serve_global_requests(
        connect.clone(),
        handlers.clone(),
    ));

    let result = connect
        .channel_opens()
        .err_into::<Error>()
        .try_for_each_concurrent(None, |open| {
            let handlers = handlers.clone();

            async move {
                let context = open.cx().clone();

                match context {
                    ChannelOpenContext::Session => {
                        let channel = open.accept().await?;

                        session::drive(&channel, &handlers).await?;
                        channel.close().await?;

                        Ok(())
                    }
                    ChannelOpenContext::DirectTcpip {
                        address,
                        port,
                        originator_address,
                        originator_port,
                    } => {
                        forward::direct_tcpip(
                            open,
                            (address.into_string(), port),
                            (originator_address.into_string(), originator_port),
                            &handlers,
                        )
                        .await
                    }
                    context => {
                        tracing::debug!("Refused a channel of type `{}`", context.as_str());

                        open.reject(
                            ChannelOpenFailureReason::UnknownChannelType,
                            "This channel type is not served here",
                        )
                        .await?;

                        Ok(())
                    }
                }
            }
        })
        .await;

    forwardings.abort();

    result
}
