//! The _channel open requests_ and their responses.

use hawser::{side::Side, Pipe};
use hawser_packet::{arch::Utf8, connect};

use crate::{
    channel::Channel,
    connect::Connect,
    Result,
};

#[doc(no_inline)]
pub use hawser_packet::connect::{ChannelOpenContext, ChannelOpenFailureReason};

/// A response to an outgoing _channel open request_.
pub enum Response<'c, IO: Pipe, S: Side> {
    /// The request succeeded, with an opened channel.
    Success(Channel<'c, IO, S>),

    /// The request failed.
    Failure {
        /// The reason for failure.
        reason: ChannelOpenFailureReason,

        /// A textual description of the failure.
        description: String,
    },
}

/// A received _channel open request_.
pub struct ChannelOpen<'c, IO: Pipe, S: Side> {
    connect: &'c Connect<IO, S>,

    inner: Option<connect::ChannelOpen>,
}

impl<'c, IO: Pipe, S: Side> ChannelOpen<'c, IO, S> {
    pub(crate) fn new(connect: &'c Connect<IO, S>, inner: connect::ChannelOpen) -> Self {
        Self {
            connect,
            inner: Some(inner),
        }
    }

    /// Access the _context_ of the channel open request.
    pub fn cx(&self) -> &ChannelOpenContext {
        &self
            .inner
            .as_ref()
            .expect("Inner value has been dropped before the outer structure")
            .context
    }

    /// Accept the channel open request.
    pub async fn accept(mut self) -> Result<Channel<'c, IO, S>> {
        let inner = self
            .inner
            .take()
            .expect("Inner value has been dropped before the outer structure");

        let Some(lease) = self.connect.channels().insert(inner.sender_channel) else {
            Self::rejected(
                self.connect,
                inner.sender_channel,
                Some(ChannelOpenFailureReason::ResourceShortage),
                Some("No more free local channel identifiers".into()),
            );
            futures::future::poll_fn(|cx| self.connect.mux().poll_flush(cx))
                .await
                .ok();

            return Err(crate::Error::ChannelOpenFailure {
                reason: ChannelOpenFailureReason::ResourceShortage,
                message: "No more free local channel identifiers".into(),
            });
        };

        self.connect
            .mux()
            .send(&connect::ChannelOpenConfirmation {
                recipient_channel: inner.sender_channel,
                sender_channel: lease.index() as u32,
                initial_window_size: self.connect.window().initial,
                maximum_packet_size: self.connect.window().max_packet,
            })
            .await?;

        Ok(Channel::new(
            self.connect,
            lease.into(),
            inner.initial_window_size,
            inner.maximum_packet_size,
        ))
    }

    fn rejected(
        connect: &Connect<IO, S>,
        recipient_channel: u32,
        reason: Option<ChannelOpenFailureReason>,
        description: Option<Utf8>,
    ) {
        connect.mux().push(&connect::ChannelOpenFailure {
            recipient_channel,
            reason: reason.unwrap_or(ChannelOpenFailureReason::AdministrativelyProhibited),
            description: description
                .unwrap_or_else(|| "Opening channels is disallowed at this time".into()),
            language: Default::default(),
        });
    }

    /// Reject the channel open request.
    pub async fn reject(
        mut self,
        reason: ChannelOpenFailureReason,
        description: impl Into<Utf8>,
    ) -> Result<()> {
        let inner = self
            .inner
            .take()
            .expect("Inner value has been dropped before the outer structure");

        Self::rejected(
            self.connect,
            inner.sender_channel,
            Some(reason),
            Some(description.into()),
        );

        futures::future::poll_fn(|cx| self.connect.mux().poll_flush(cx)).await?;

        Ok(())
    }
}

impl<IO: Pipe, S: Side> Drop for ChannelOpen<'_, IO, S> {
    fn drop(&mut self) {
        if let Some(inner) = &self.inner {
            Self::rejected(self.connect, inner.sender_channel, None, None);
        }
    }
}
