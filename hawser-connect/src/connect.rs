//! Facilities to interact with the SSH _connect_ protocol.

use futures::TryStream;
use hawser::{session::Session, side::Side, Pipe};
use hawser_packet::connect;

use crate::{
    channel::WindowConfig,
    channel_open, global_request,
    mux::{slots::Slots, Interest, Mux},
    Error, Result,
};

#[doc(no_inline)]
pub use hawser_packet::connect::{ChannelOpenContext, GlobalRequestContext};

/// How many channels can be open at once on a single session.
const CHANNEL_SLOTS: usize = 256;

/// A wrapper around a [`Session`] to interact with the connect layer.
pub struct Connect<IO: Pipe, S: Side> {
    mux: Mux<IO, S>,
    channels: Slots<u32>,
    window: WindowConfig,
}

impl<IO, S> Connect<IO, S>
where
    IO: Pipe,
    S: Side,
{
    pub(crate) fn new(session: Session<IO, S>, window: WindowConfig) -> Self {
        Self {
            mux: Mux::from(session),
            channels: Slots::new(CHANNEL_SLOTS),
            window,
        }
    }

    pub(crate) fn mux(&self) -> &Mux<IO, S> {
        &self.mux
    }

    pub(crate) fn window(&self) -> WindowConfig {
        self.window
    }

    pub(crate) fn channels(&self) -> &Slots<u32> {
        &self.channels
    }

    /// Iterate over the incoming _channel open requests_ from the peer.
    pub fn channel_opens(
        &self,
    ) -> impl TryStream<Ok = channel_open::ChannelOpen<'_, IO, S>, Error = Error> + '_ {
        const INTEREST: Interest = Interest::ChannelOpenRequest;

        self.mux.register(INTEREST);
        let unregister_on_drop = defer::defer(|| self.mux.unregister(&INTEREST));

        futures::stream::poll_fn(move |cx| {
            let _moved = &unregister_on_drop;

            self.mux.poll_interest(cx, &INTEREST).map(|polled| {
                polled.map(|result| {
                    let open = result?
                        .to::<connect::ChannelOpen>()
                        .map_err(hawser::Error::from)?;

                    Ok(channel_open::ChannelOpen::new(self, open))
                })
            })
        })
    }

    /// Request a new _channel_ with the provided `context`.
    pub async fn channel_open(
        &self,
        context: ChannelOpenContext,
    ) -> Result<channel_open::Response<'_, IO, S>> {
        let Some(reservation) = self.channels.reserve() else {
            return Err(Error::ChannelOpenFailure {
                reason: connect::ChannelOpenFailureReason::ResourceShortage,
                message: "No more free local channel identifiers".into(),
            });
        };

        let local_id = reservation.index() as u32;

        let interest = Interest::ChannelOpenResponse(local_id);
        self.mux.register(interest);
        let unregister_on_drop = defer::defer(|| self.mux.unregister(&interest));

        self.mux
            .send(&connect::ChannelOpen {
                sender_channel: local_id,
                initial_window_size: self.window.initial,
                maximum_packet_size: self.window.max_packet,
                context,
            })
            .await?;

        let polled = futures::future::poll_fn(|cx| {
            let _moved = &unregister_on_drop;

            self.mux.poll_interest(cx, &interest)
        })
        .await;

        let Some(packet) = polled.transpose()? else {
            return Err(Error::ChannelClosed);
        };

        if let Ok(confirmation) = packet.to::<connect::ChannelOpenConfirmation>() {
            let lease = reservation.into_lease(confirmation.sender_channel);

            Ok(channel_open::Response::Success(crate::channel::Channel::new(
                self,
                lease.into(),
                confirmation.initial_window_size,
                confirmation.maximum_packet_size,
            )))
        } else if let Ok(failure) = packet.to::<connect::ChannelOpenFailure>() {
            Ok(channel_open::Response::Failure {
                reason: failure.reason,
                description: failure.description.into_string(),
            })
        } else {
            Err(hawser::Error::UnexpectedMessage.into())
        }
    }

    /// Iterate over the incoming _global requests_ from the peer.
    pub fn global_requests(
        &self,
    ) -> impl TryStream<Ok = global_request::GlobalRequest<'_, IO, S>, Error = Error> + '_ {
        const INTEREST: Interest = Interest::GlobalRequest;

        self.mux.register(INTEREST);
        let unregister_on_drop = defer::defer(|| self.mux.unregister(&INTEREST));

        futures::stream::poll_fn(move |cx| {
            let _moved = &unregister_on_drop;

            self.mux.poll_interest(cx, &INTEREST).map(|polled| {
                polled.map(|result| {
                    let request = result?
                        .to::<connect::GlobalRequest>()
                        .map_err(hawser::Error::from)?;

                    Ok(global_request::GlobalRequest::new(self, request))
                })
            })
        })
    }

    /// Make a _global request_ with the provided `context`.
    pub async fn global_request(
        &self,
        context: GlobalRequestContext,
    ) -> Result<global_request::Response> {
        let with_port = matches!(
            context,
            GlobalRequestContext::TcpipForward { bind_port: 0, .. }
        );

        const INTEREST: Interest = Interest::GlobalResponse;
        self.mux.register(INTEREST);
        let unregister_on_drop = defer::defer(|| self.mux.unregister(&INTEREST));

        self.mux
            .send(&connect::GlobalRequest {
                want_reply: true.into(),
                context,
            })
            .await?;

        let polled = futures::future::poll_fn(|cx| {
            let _moved = &unregister_on_drop;

            self.mux.poll_interest(cx, &INTEREST)
        })
        .await;

        let Some(packet) = polled.transpose()? else {
            return Err(Error::ChannelClosed);
        };

        if packet.to::<connect::RequestFailure>().is_ok() {
            Ok(global_request::Response::Rejected)
        } else if with_port {
            if let Ok(connect::ForwardingSuccess { bound_port }) = packet.to() {
                Ok(global_request::Response::AcceptedPort(bound_port))
            } else {
                Err(hawser::Error::UnexpectedMessage.into())
            }
        } else if packet.to::<connect::RequestSuccess>().is_ok() {
            Ok(global_request::Response::Accepted)
        } else {
            Err(hawser::Error::UnexpectedMessage.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use hawser::side::{client::Client, server::Server};

    use async_compat::Compat;
    use futures::io::BufReader;
    use tokio::net::TcpStream;

    #[test]
    fn assert_connect_is_send_and_sync() {
        fn is_send<T: Send>() {}
        fn is_sync<T: Sync>() {}

        is_send::<Connect<BufReader<Compat<TcpStream>>, Client>>();
        is_sync::<Connect<BufReader<Compat<TcpStream>>, Server>>();
    }
}
