//! TCP/IP forwarding: `direct-tcpip` channels dialed on behalf of the
//! peer and `tcpip-forward` listeners opening `forwarded-tcpip`
//! channels back, both behind a [`ForwardingFilter`].

use std::{collections::HashMap, io, sync::Arc};

use async_compat::CompatExt;
use futures::{pin_mut, AsyncWriteExt, TryStreamExt};
use hawser::{side::Side, Pipe};
use hawser_connect::{
    channel::Channel,
    channel_open::{self, ChannelOpenContext, ChannelOpenFailureReason},
    global_request::GlobalRequestContext,
    Connect,
};
use tokio::net::{TcpListener, TcpStream};

use crate::{session, Error, Handlers, Result};

/// The policy predicate consulted before any forwarding is honored,
/// one decision per forwarding flavor.
pub trait ForwardingFilter: Send + Sync {
    /// Whether a `tcpip-forward` listener may be bound.
    fn allow_listen(&self, address: &str, port: u32) -> bool;

    /// Whether a `direct-tcpip` dial to `address:port` may proceed.
    fn allow_direct(&self, address: &str, port: u32, originator: (&str, u32)) -> bool;

    /// Whether `x11` channels may be opened.
    fn allow_x11(&self) -> bool {
        false
    }
}

/// The default filter, refusing every forwarding.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl ForwardingFilter for DenyAll {
    fn allow_listen(&self, _: &str, _: u32) -> bool {
        false
    }

    fn allow_direct(&self, _: &str, _: u32, _: (&str, u32)) -> bool {
        false
    }
}

/// A filter accepting every forwarding, development use only.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl ForwardingFilter for AllowAll {
    fn allow_listen(&self, _: &str, _: u32) -> bool {
        true
    }

    fn allow_direct(&self, _: &str, _: u32, _: (&str, u32)) -> bool {
        true
    }

    fn allow_x11(&self) -> bool {
        true
    }
}

/// Pump a channel and a TCP stream into each other until both
/// directions reported end-of-file.
pub(crate) async fn pump<IO, S>(
    channel: &Channel<'_, IO, S>,
    stream: TcpStream,
) -> Result<()>
where
    IO: Pipe,
    S: Side,
{
    let (tcp_reader, tcp_writer) = tokio::io::split(stream);
    let mut tcp_reader = tcp_reader.compat();
    let mut tcp_writer = tcp_writer.compat();

    let mut channel_reader = channel.as_reader();
    let mut channel_writer = channel.as_writer();

    let outbound = async {
        futures::io::copy(&mut channel_reader, &mut tcp_writer).await?;
        tcp_writer.close().await?;

        Ok::<_, io::Error>(())
    };

    let inbound = async {
        futures::io::copy(&mut tcp_reader, &mut channel_writer).await?;
        channel_writer.flush().await?;
        channel.eof().await.ok();

        Ok::<_, io::Error>(())
    };

    futures::try_join!(outbound, inbound)?;

    Ok(())
}

/// Serve one inbound `direct-tcpip` open: consult the filter, dial
/// the target, then pump both directions.
pub(crate) async fn direct_tcpip<IO, S>(
    open: channel_open::ChannelOpen<'_, IO, S>,
    target: (String, u32),
    originator: (String, u32),
    handlers: &Handlers,
) -> Result<()>
where
    IO: Pipe,
    S: Side,
{
    let (address, port) = target;

    if !handlers
        .filter
        .allow_direct(&address, port, (&originator.0, originator.1))
    {
        tracing::debug!("Refused a direct-tcpip dial to `{address}:{port}`");

        return session::refuse(open, "Forwarding to this target is not allowed").await;
    }

    match TcpStream::connect((address.as_str(), port as u16)).await {
        Ok(stream) => {
            let channel = open.accept().await?;

            tracing::debug!("Forwarding a direct-tcpip channel to `{address}:{port}`");

            pump(&channel, stream).await?;
            channel.close().await?;

            Ok(())
        }
        Err(err) => {
            open.reject(ChannelOpenFailureReason::ConnectFailed, err.to_string())
                .await?;

            Ok(())
        }
    }
}

/// Serve the session's global requests: `tcpip-forward` binds a
/// listener whose connections come back as `forwarded-tcpip` channels,
/// `cancel-tcpip-forward` stops it.
pub(crate) async fn serve_global_requests<IO, S>(
    connect: Arc<Connect<IO, S>>,
    handlers: Arc<Handlers>,
) -> Result<()>
where
    IO: Pipe,
    S: Side,
{
    let mut forwardings: HashMap<(String, u32), tokio::task::JoinHandle<()>> = HashMap::new();

    let result = async {
        let requests = connect.global_requests();
        pin_mut!(requests);

        while let Some(request) = requests.try_next().await? {
            match request.cx().clone() {
                GlobalRequestContext::TcpipForward {
                    bind_address,
                    bind_port,
                } => {
                    let address = bind_address.into_string();

                    if !handlers.filter.allow_listen(&address, bind_port) {
                        tracing::debug!("Refused a tcpip-forward on `{address}:{bind_port}`");

                        request.reject().await?;
                        continue;
                    }

                    // An empty address means "listen on all interfaces".
                    let bind_on = if address.is_empty() {
                        "0.0.0.0"
                    } else {
                        address.as_str()
                    };

                    match TcpListener::bind((bind_on, bind_port as u16)).await {
                        Ok(listener) => {
                            let port = u32::from(listener.local_addr()?.port());

                            request.accept(port).await?;

                            tracing::debug!("Bound a tcpip-forward on `{address}:{port}`");

                            let worker =
                                tokio::spawn(accept_loop(connect.clone(), listener, address.clone(), port));
                            forwardings.insert((address, port), worker);
                        }
                        Err(err) => {
                            tracing::debug!(
                                "Unable to bind a tcpip-forward on `{address}:{bind_port}`: {err}"
                            );

                            request.reject().await?;
                        }
                    }
                }
                GlobalRequestContext::CancelTcpipForward {
                    bind_address,
                    bind_port,
                } => {
                    let key = (bind_address.into_string(), bind_port);

                    match forwardings.remove(&key) {
                        Some(worker) => {
                            worker.abort();

                            tracing::debug!(
                                "Cancelled the tcpip-forward on `{}:{}`",
                                key.0,
                                key.1,
                            );

                            request.accept(0).await?;
                        }
                        None => request.reject().await?,
                    }
                }
            }
        }

        Ok::<_, Error>(())
    }
    .await;

    for (_, worker) in forwardings {
        worker.abort();
    }

    result
}

/// Accept connections on a bound forwarding listener and open the
/// matching `forwarded-tcpip` channels.
async fn accept_loop<IO, S>(
    connect: Arc<Connect<IO, S>>,
    listener: TcpListener,
    address: String,
    port: u32,
) where
    IO: Pipe,
    S: Side,
{
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                tracing::warn!("The forwarding listener on `{address}:{port}` died: {err}");

                break;
            }
        };

        let connect = connect.clone();
        let address = address.clone();

        tokio::spawn(async move {
            let opened = connect
                .channel_open(ChannelOpenContext::ForwardedTcpip {
                    address: address.as_str().into(),
                    port,
                    originator_address: peer.ip().to_string().into(),
                    originator_port: u32::from(peer.port()),
                })
                .await;

            match opened {
                Ok(channel_open::Response::Success(channel)) => {
                    if let Err(err) = pump(&channel, stream).await {
                        tracing::debug!("A forwarded-tcpip channel ended with an error: {err}");
                    }

                    channel.close().await.ok();
                }
                Ok(channel_open::Response::Failure { reason, description }) => {
                    tracing::debug!(
                        "The peer refused a forwarded-tcpip channel: {description} ({reason:?})"
                    );
                }
                Err(err) => {
                    tracing::debug!("Unable to open a forwarded-tcpip channel: {err}");
                }
            }
        });
    }
}
