use std::{io, num::NonZeroU32, pin::Pin, task};

use hawser::{side::Side, Pipe};
use hawser_packet::connect;

use crate::{channel::Channel, mux::Interest};

/// A writer over one of the channel's streams, chunking to the peer's
/// maximum packet size and respecting its window.
pub struct Write<'a, IO: Pipe, S: Side> {
    channel: &'a Channel<'a, IO, S>,
    stream_id: Option<NonZeroU32>,

    buffer: Vec<u8>,
}

impl<'a, IO: Pipe, S: Side> Write<'a, IO, S> {
    pub fn new(channel: &'a Channel<'a, IO, S>, stream_id: Option<NonZeroU32>) -> Self {
        Self {
            channel,
            stream_id,

            buffer: Vec::new(),
        }
    }
}

impl<IO: Pipe, S: Side> futures::AsyncWrite for Write<'_, IO, S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
        buf: &[u8],
    ) -> task::Poll<io::Result<usize>> {
        if !self.channel.is_writable() {
            return task::Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                crate::Error::ChannelClosed,
            )));
        }

        loop {
            let writable = buf
                .len()
                .min(self.channel.remote_maxpack() as usize - self.buffer.len());
            if writable == 0 {
                futures::ready!(self.as_mut().poll_flush(cx))?;

                continue;
            }

            let reserved: u32 = match self.channel.remote_window().poll_reserve(cx, writable as u32)
            {
                task::Poll::Ready(reserved) => reserved,
                task::Poll::Pending => {
                    // Pump the multiplexer ourselves, the peer's
                    // window-adjust has to come through even when no
                    // reader is active on the channel.
                    let adjust = Interest::ChannelWindowAdjust(self.channel.id().local());
                    if let task::Poll::Ready(polled) = self.channel.poll_take(cx, &adjust) {
                        match polled {
                            Some(Err(err)) => {
                                return task::Poll::Ready(Err(io::Error::new(
                                    io::ErrorKind::BrokenPipe,
                                    err,
                                )))
                            }
                            Some(Ok(_)) | None => (),
                        }
                    }

                    match self.channel.remote_window().poll_reserve(cx, writable as u32) {
                        task::Poll::Ready(reserved) => reserved,
                        task::Poll::Pending => return task::Poll::Pending,
                    }
                }
            };
            let reserved = reserved as usize;

            self.buffer.extend_from_slice(&buf[..reserved]);

            break task::Poll::Ready(Ok(reserved));
        }
    }

    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<io::Result<()>> {
        if !self.buffer.is_empty() {
            let data: hawser_packet::arch::Bytes =
                self.buffer.drain(..).collect::<Vec<_>>().into();

            let mux = self.channel.connect().mux();
            if let Some(data_type) = self.stream_id {
                mux.push(&connect::ChannelExtendedData {
                    recipient_channel: self.channel.id().remote(),
                    data_type: data_type.get(),
                    data,
                });
            } else {
                mux.push(&connect::ChannelData {
                    recipient_channel: self.channel.id().remote(),
                    data,
                });
            }
        }

        self.channel
            .connect()
            .mux()
            .poll_flush(cx)
            .map_err(|err| io::Error::new(io::ErrorKind::BrokenPipe, err))
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> task::Poll<io::Result<()>> {
        self.poll_flush(cx)
    }
}
