use std::{
    collections::VecDeque,
    io::{self, Read as _},
    num::NonZeroU32,
    pin::Pin,
    task,
};

use hawser::{side::Side, Pipe};
use hawser_packet::connect;

use crate::{channel::Channel, mux::Interest};

/// A reader over one of the channel's streams, the only one allowed
/// for that stream at a time.
pub struct Read<'a, IO: Pipe, S: Side> {
    channel: &'a Channel<'a, IO, S>,
    stream_id: Option<NonZeroU32>,

    buffer: VecDeque<u8>,

    /// Whether another reader already claimed the stream, which fails
    /// every read on this one.
    conflicted: bool,
}

impl<'a, IO: Pipe, S: Side> Read<'a, IO, S> {
    pub fn new(channel: &'a Channel<'a, IO, S>, stream_id: Option<NonZeroU32>) -> Self {
        let conflicted = !channel
            .connect()
            .mux()
            .try_register(Interest::ChannelData(channel.id().local(), stream_id));

        Self {
            channel,
            stream_id,

            buffer: VecDeque::new(),
            conflicted,
        }
    }

    /// Hand accumulated credit back to the peer once the advertised
    /// window shrunk below half of its initial size.
    fn adjust_window(&mut self) {
        if let Some(bytes_to_add) = self.channel.local_window().adjustable() {
            self.channel.connect().mux().push(&connect::ChannelWindowAdjust {
                recipient_channel: self.channel.id().remote(),
                bytes_to_add,
            });

            tracing::debug!(
                "Granting `{}` more bytes for channel {}:{}",
                bytes_to_add,
                self.channel.id().local(),
                self.channel.id().remote(),
            );
        }
    }
}

impl<IO: Pipe, S: Side> futures::AsyncRead for Read<'_, IO, S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
        buf: &mut [u8],
    ) -> task::Poll<io::Result<usize>> {
        if self.conflicted {
            return task::Poll::Ready(Err(io::Error::new(
                io::ErrorKind::Other,
                "previous pending read on the channel's stream",
            )));
        }

        self.adjust_window();

        // Drive queued messages out opportunistically; reads must not
        // fail on flush errors, data may still be buffered.
        let _ = self.channel.connect().mux().poll_flush(cx);

        if self.buffer.is_empty() {
            let interest = Interest::ChannelData(self.channel.id().local(), self.stream_id);

            if let Some(result) = futures::ready!(self.channel.poll_take(cx, &interest)) {
                let packet =
                    result.map_err(|err| io::Error::new(io::ErrorKind::BrokenPipe, err))?;

                let data = if self.stream_id.is_none() {
                    packet
                        .to::<connect::ChannelData>()
                        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?
                        .data
                } else {
                    packet
                        .to::<connect::ChannelExtendedData>()
                        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?
                        .data
                };

                if let Err(overflowed) = self.channel.local_window().consume(data.len() as u32) {
                    return task::Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        crate::Error::WindowExceeded(overflowed),
                    )));
                }

                self.buffer.extend(data.iter());

                tracing::trace!(
                    "Received a data block for stream `{:?}` on channel {}:{} of size `{}`",
                    self.stream_id,
                    self.channel.id().local(),
                    self.channel.id().remote(),
                    data.len(),
                );
            } else {
                tracing::trace!(
                    "End-of-file for stream `{:?}` on channel {}:{}",
                    self.stream_id,
                    self.channel.id().local(),
                    self.channel.id().remote(),
                );
            }
        }

        let count = self.buffer.read(buf);

        task::Poll::Ready(count)
    }
}

impl<IO: Pipe, S: Side> Drop for Read<'_, IO, S> {
    fn drop(&mut self) {
        if !self.conflicted {
            self.channel.connect().mux().unregister(&Interest::ChannelData(
                self.channel.id().local(),
                self.stream_id,
            ));
        }
    }
}
