//! Definition of the [`Channel`] struct providing isolated I/O on SSH channels.

use std::{
    num::NonZeroU32,
    sync::atomic::{AtomicBool, Ordering},
    task,
};

use futures::{AsyncRead, AsyncWrite, TryStream};
use hawser::{side::Side, Pipe};
use hawser_packet::{connect, Packet};

use crate::{
    connect::Connect,
    mux::Interest,
    Error, Result,
};

#[doc(no_inline)]
pub use hawser_packet::connect::ChannelRequestContext;

mod id;
pub(crate) use id::Id;

mod io;

mod window;
pub use window::WindowConfig;
pub(crate) use window::{LocalWindow, RemoteWindow};

pub mod request;

/// A reference to an opened channel in the session.
pub struct Channel<'c, IO: Pipe, S: Side> {
    connect: &'c Connect<IO, S>,

    id: Id,

    local_window: LocalWindow,
    remote_window: RemoteWindow,
    remote_maxpack: u32,

    eof_sent: AtomicBool,
    close_sent: AtomicBool,
    close_received: AtomicBool,
}

impl<'c, IO: Pipe, S: Side> Channel<'c, IO, S> {
    pub(crate) fn new(
        connect: &'c Connect<IO, S>,
        id: Id,
        remote_window: u32,
        remote_maxpack: u32,
    ) -> Self {
        connect.mux().register(Interest::ChannelClose(id.local()));
        connect.mux().register(Interest::ChannelEof(id.local()));
        connect
            .mux()
            .register(Interest::ChannelWindowAdjust(id.local()));

        Self {
            connect,

            local_window: LocalWindow::new(connect.window()),
            remote_window: RemoteWindow::from(remote_window),
            remote_maxpack,

            id,

            eof_sent: AtomicBool::new(false),
            close_sent: AtomicBool::new(false),
            close_received: AtomicBool::new(false),
        }
    }

    pub(crate) fn connect(&self) -> &'c Connect<IO, S> {
        self.connect
    }

    pub(crate) fn id(&self) -> &Id {
        &self.id
    }

    pub(crate) fn local_window(&self) -> &LocalWindow {
        &self.local_window
    }

    pub(crate) fn remote_window(&self) -> &RemoteWindow {
        &self.remote_window
    }

    pub(crate) fn remote_maxpack(&self) -> u32 {
        self.remote_maxpack
    }

    pub(crate) fn is_writable(&self) -> bool {
        !self.close_sent.load(Ordering::SeqCst) && !self.close_received.load(Ordering::SeqCst)
    }

    /// The peer's sending credit to us, in bytes.
    pub fn local_window_size(&self) -> u32 {
        self.local_window.size()
    }

    /// Our sending credit to the peer, in bytes.
    pub fn remote_window_size(&self) -> u32 {
        self.remote_window.size()
    }

    /// Whether the channel's close handshake has started or completed.
    pub fn is_closed(&self) -> bool {
        self.close_sent.load(Ordering::SeqCst) || self.close_received.load(Ordering::SeqCst)
    }

    fn unregister(&self) {
        self.connect
            .mux()
            .unregister(&Interest::ChannelWindowAdjust(self.id.local()));
        self.connect
            .mux()
            .unregister(&Interest::ChannelEof(self.id.local()));
        self.connect
            .mux()
            .unregister(&Interest::ChannelClose(self.id.local()));
    }

    fn unregister_streams(&self) {
        let local_id = self.id.local();

        self.connect.mux().unregister_if(
            |interest| matches!(interest, Interest::ChannelData(id, _) if id == &local_id),
        );
    }

    /// Poll for a packet matching the `interest`, transparently
    /// handling the channel's close, end-of-file and window-adjust
    /// messages whichever task observes them first.
    pub(crate) fn poll_take(
        &self,
        cx: &mut task::Context,
        interest: &Interest,
    ) -> task::Poll<Option<hawser::Result<Packet>>> {
        if let task::Poll::Ready(Some(result)) = self
            .connect
            .mux()
            .poll_interest(cx, &Interest::ChannelClose(self.id.local()))
        {
            if let Err(err) = result {
                return task::Poll::Ready(Some(Err(err)));
            }

            self.close_received.store(true, Ordering::SeqCst);

            if !self.close_sent.swap(true, Ordering::SeqCst) {
                self.connect.mux().push(&connect::ChannelClose {
                    recipient_channel: self.id.remote(),
                });
            }

            self.unregister_streams();
            self.unregister();

            tracing::debug!(
                "Peer closed channel {}:{}, unregistered all interests",
                self.id.local(),
                self.id.remote(),
            );

            self.poll_take(cx, interest)
        } else if let task::Poll::Ready(Some(result)) = self
            .connect
            .mux()
            .poll_interest(cx, &Interest::ChannelEof(self.id.local()))
        {
            if let Err(err) = result {
                return task::Poll::Ready(Some(Err(err)));
            }

            self.unregister_streams();

            tracing::debug!(
                "Peer sent an EOF for channel {}:{}, unregistered the streams",
                self.id.local(),
                self.id.remote(),
            );

            self.poll_take(cx, interest)
        } else if let task::Poll::Ready(Some(result)) = self
            .connect
            .mux()
            .poll_interest(cx, &Interest::ChannelWindowAdjust(self.id.local()))
        {
            match result.and_then(|packet| {
                packet
                    .to::<connect::ChannelWindowAdjust>()
                    .map_err(Into::into)
            }) {
                Ok(adjust) => {
                    self.remote_window.replenish(adjust.bytes_to_add);

                    tracing::debug!(
                        "Peer granted `{}` more bytes for channel {}:{}",
                        adjust.bytes_to_add,
                        self.id.local(),
                        self.id.remote(),
                    );
                }
                Err(err) => return task::Poll::Ready(Some(Err(err))),
            }

            self.poll_take(cx, interest)
        } else {
            self.connect.mux().poll_interest(cx, interest)
        }
    }

    /// Iterate over the incoming _channel requests_.
    pub fn requests(&self) -> impl TryStream<Ok = request::Request<'_, IO, S>, Error = Error> + '_ {
        let interest = Interest::ChannelRequest(self.id.local());

        self.connect.mux().register(interest);
        let unregister_on_drop = defer::defer(move || self.connect.mux().unregister(&interest));

        futures::stream::poll_fn(move |cx| {
            let _moved = &unregister_on_drop;

            self.poll_take(cx, &interest).map(|polled| {
                polled.map(|result| {
                    let request = result?
                        .to::<connect::ChannelRequest>()
                        .map_err(hawser::Error::from)?;

                    Ok(request::Request::new(self, request))
                })
            })
        })
    }

    /// Send a _channel request_, without asking for a reply.
    pub async fn request(&self, context: ChannelRequestContext) -> Result<()> {
        self.connect
            .mux()
            .send(&connect::ChannelRequest {
                recipient_channel: self.id.remote(),
                want_reply: false.into(),
                context,
            })
            .await?;

        Ok(())
    }

    /// Send a _channel request_ and wait for the peer's response.
    pub async fn request_wait(&self, context: ChannelRequestContext) -> Result<request::Response> {
        let interest = Interest::ChannelResponse(self.id.local());
        self.connect.mux().register(interest);
        let unregister_on_drop = defer::defer(|| self.connect.mux().unregister(&interest));

        self.connect
            .mux()
            .send(&connect::ChannelRequest {
                recipient_channel: self.id.remote(),
                want_reply: true.into(),
                context,
            })
            .await?;

        let response = futures::future::poll_fn(|cx| {
            let _moved = &unregister_on_drop;

            let polled = futures::ready!(self.poll_take(cx, &interest));
            let response = polled.map(|result| {
                result.map(|packet| {
                    if packet.to::<connect::ChannelSuccess>().is_ok() {
                        request::Response::Success
                    } else {
                        request::Response::Failure
                    }
                })
            });

            task::Poll::Ready(response)
        })
        .await;

        match response {
            Some(result) => Ok(result?),
            None => Err(Error::ChannelClosed),
        }
    }

    /// Make a reader for the channel's _data_ stream.
    #[must_use]
    pub fn as_reader(&self) -> impl AsyncRead + Send + Unpin + '_ {
        io::Read::new(self, None)
    }

    /// Make a reader for the channel's _extended data_ stream.
    #[must_use]
    pub fn as_reader_ext(&self, ext: NonZeroU32) -> impl AsyncRead + Send + Unpin + '_ {
        io::Read::new(self, Some(ext))
    }

    /// Make a writer for the channel's _data_ stream.
    ///
    /// ## Note:
    /// The writer does not flush on [`Drop`], the caller is responsible
    /// to call [`futures::AsyncWriteExt::flush`] before dropping.
    #[must_use]
    pub fn as_writer(&self) -> impl AsyncWrite + Send + Unpin + '_ {
        io::Write::new(self, None)
    }

    /// Make a writer for the channel's _extended data_ stream.
    ///
    /// ## Note:
    /// The writer does not flush on [`Drop`], the caller is responsible
    /// to call [`futures::AsyncWriteExt::flush`] before dropping.
    #[must_use]
    pub fn as_writer_ext(&self, ext: NonZeroU32) -> impl AsyncWrite + Send + Unpin + '_ {
        io::Write::new(self, Some(ext))
    }

    /// Signal to the peer we won't send any more data on the channel.
    pub async fn eof(&self) -> Result<()> {
        if self.eof_sent.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.connect
            .mux()
            .send(&connect::ChannelEof {
                recipient_channel: self.id.remote(),
            })
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    /// Close the channel gracefully: signal end-of-file if not done
    /// already, send our `SSH_MSG_CHANNEL_CLOSE` exactly once and wait
    /// for the peer's own close message.
    ///
    /// Closing an already closed (or closing) channel performs no I/O
    /// and returns immediately.
    pub async fn close(&self) -> Result<()> {
        if self.close_sent.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if !self.eof_sent.swap(true, Ordering::SeqCst) {
            self.connect.mux().push(&connect::ChannelEof {
                recipient_channel: self.id.remote(),
            });
        }

        self.connect
            .mux()
            .send(&connect::ChannelClose {
                recipient_channel: self.id.remote(),
            })
            .await?;

        tracing::debug!(
            "Closing channel {}:{}, awaiting the peer's close message",
            self.id.local(),
            self.id.remote(),
        );

        futures::future::poll_fn(|cx| {
            if self.close_received.load(Ordering::SeqCst) {
                return task::Poll::Ready(Ok(()));
            }

            match futures::ready!(
                self.poll_take(cx, &Interest::ChannelClose(self.id.local()))
            ) {
                Some(Err(err)) => task::Poll::Ready(Err(err)),
                Some(Ok(_)) | None => task::Poll::Ready(Ok(())),
            }
        })
        .await?;

        Ok(())
    }
}

impl<IO: Pipe, S: Side> Drop for Channel<'_, IO, S> {
    fn drop(&mut self) {
        if !self.close_sent.swap(true, Ordering::SeqCst)
            && !self.close_received.load(Ordering::SeqCst)
        {
            self.connect.mux().push(&connect::ChannelClose {
                recipient_channel: self.id.remote(),
            });
        }

        self.unregister_streams();
        self.unregister();

        tracing::debug!(
            "Released channel {}:{}",
            self.id.local(),
            self.id.remote(),
        );
    }
}
