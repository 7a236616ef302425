//! Primitives to extract and encode packets from/to a [`Pipe`] stream.

use std::{collections::VecDeque, time::Instant};

use futures::{AsyncBufReadExt, AsyncWriteExt, FutureExt};
use futures_time::{future::FutureExt as _, time::Duration};
use hawser_packet::IntoPacket;

use crate::{Pipe, Result};

mod counter;
use counter::IoCounter;

mod transport;
pub use transport::{Transport, TransportPair};

mod keys;
pub use keys::Keys;

#[doc(no_inline)]
pub use hawser_packet::Packet;

/// The re-keying thresholds applied to the stream, after either of
/// which a new key-exchange is initiated, as recommended by
/// RFC 4253 section 9.
#[derive(Debug, Clone, Copy)]
pub struct RekeyLimits {
    /// Re-key after this many exchanged bytes (default 1GiB).
    pub bytes: usize,

    /// Re-key after this much elapsed time (default one hour).
    pub time: std::time::Duration,
}

impl Default for RekeyLimits {
    fn default() -> Self {
        Self {
            bytes: 0x4000_0000,
            time: std::time::Duration::from_secs(3600),
        }
    }
}

/// A wrapper around a [`Pipe`] interfacing with the SSH binary packet protocol.
pub struct Stream<S> {
    inner: IoCounter<S>,
    timeout: Duration,
    rekey: RekeyLimits,

    /// The pair of transport algorithms and keys computed from the key exchange.
    transport: TransportPair,

    /// The session identifier derived from the first key exchange.
    session: Option<Vec<u8>>,

    /// The instant of the last key exchange.
    keyed_at: Instant,

    /// Sequence number for the `tx` side.
    txseq: u32,

    /// Sequence number for the `rx` side.
    rxseq: u32,

    /// A buffer for the `peek` method.
    buffer: Option<Packet>,

    /// Packets received during a key-exchange that belong to the
    /// application, delivered once the exchange completes.
    backlog: VecDeque<Packet>,
}

impl<S> Stream<S>
where
    S: Pipe,
{
    pub(crate) fn new(stream: S, timeout: Duration, rekey: RekeyLimits) -> Self {
        Self {
            inner: IoCounter::new(stream),
            timeout,
            rekey,
            transport: Default::default(),
            session: None,
            keyed_at: Instant::now(),
            txseq: 0,
            rxseq: 0,
            buffer: None,
            backlog: VecDeque::new(),
        }
    }

    /// Whether a key-exchange is required before exchanging any more
    /// data packets, either because none happened yet or because a
    /// re-keying threshold has been crossed.
    pub(crate) fn is_rekeyable(&self) -> bool {
        self.session.is_none()
            || self.inner.count() > self.rekey.bytes
            || self.keyed_at.elapsed() > self.rekey.time
    }

    pub(crate) fn with_transport(&mut self, transport: TransportPair) {
        self.transport = transport;
        self.inner.reset();
        self.keyed_at = Instant::now();
    }

    pub(crate) fn with_session(&mut self, session: &[u8]) -> &[u8] {
        self.session.get_or_insert_with(|| session.to_vec())
    }

    pub(crate) fn session_id(&self) -> Option<&[u8]> {
        self.session.as_deref()
    }

    pub(crate) async fn fill_buf(&mut self) -> Result<()> {
        self.inner.fill_buf().await?;

        Ok(())
    }

    /// Poll the stream to detect whether data is immediately readable.
    pub(crate) async fn is_readable(&mut self) -> Result<bool> {
        futures::select_biased! {
            buf = self.inner.fill_buf().fuse() => {
                buf?;

                Ok(true)
            }
            _ = futures::future::ready(()).fuse() => {
                Ok(false)
            }
        }
    }

    /// Receive and decrypt a _packet_ from the peer without removing it from the queue.
    pub(crate) async fn peek(&mut self) -> Result<&Packet> {
        let packet = self.recv().await?;

        Ok(self.buffer.insert(packet))
    }

    /// Put back a _packet_ received out of context, delivered again
    /// before anything else is read from the wire.
    pub(crate) fn defer(&mut self, packet: Packet) {
        self.backlog.push_back(packet);
    }

    /// Receive and decrypt a _packet_ from the peer.
    pub(crate) async fn recv(&mut self) -> Result<Packet> {
        match self.buffer.take().or_else(|| self.backlog.pop_front()) {
            Some(packet) => Ok(packet),
            None => {
                let packet =
                    Packet::from_async_reader(&mut self.inner, &mut self.transport.rx, self.rxseq)
                        .timeout(self.timeout)
                        .await??;

                tracing::trace!(
                    "<~- #{}: ^{:#x} ({} bytes)",
                    self.rxseq,
                    packet.payload[0],
                    packet.payload.len(),
                );

                self.rxseq = self.rxseq.wrapping_add(1);

                Ok(packet)
            }
        }
    }

    /// Encrypt and send a _packet_ to the peer.
    pub(crate) async fn send(&mut self, message: impl IntoPacket) -> Result<()> {
        let packet = message.into_packet();

        packet
            .to_async_writer(&mut self.inner, &mut self.transport.tx, self.txseq)
            .timeout(self.timeout)
            .await??;
        self.inner.flush().await?;

        tracing::trace!(
            "-~> #{}: ^{:#x} ({} bytes)",
            self.txseq,
            packet.payload[0],
            packet.payload.len(),
        );

        self.txseq = self.txseq.wrapping_add(1);

        Ok(())
    }
}
