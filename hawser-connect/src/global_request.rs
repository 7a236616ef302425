//! The _global requests_ and their responses.

use hawser::{side::Side, Pipe};
use hawser_packet::connect;

use crate::{connect::Connect, Result};

#[doc(no_inline)]
pub use hawser_packet::connect::GlobalRequestContext;

/// A response to an outgoing _global request_.
#[derive(Debug, PartialEq, Eq)]
pub enum Response {
    /// The request succeeded.
    Accepted,

    /// The request succeeded, with the port the peer bound.
    AcceptedPort(u32),

    /// The request failed.
    Rejected,
}

/// A received _global request_.
pub struct GlobalRequest<'c, IO: Pipe, S: Side> {
    connect: &'c Connect<IO, S>,
    inner: connect::GlobalRequest,
}

impl<'c, IO: Pipe, S: Side> GlobalRequest<'c, IO, S> {
    pub(crate) fn new(connect: &'c Connect<IO, S>, inner: connect::GlobalRequest) -> Self {
        Self { connect, inner }
    }

    /// Access the _context_ of the global request.
    pub fn cx(&self) -> &GlobalRequestContext {
        &self.inner.context
    }

    /// Accept the global request, with the locally bound port when the
    /// peer asked for a `tcpip-forward` on port `0`.
    pub async fn accept(self, bound_port: u32) -> Result<()> {
        if *self.inner.want_reply {
            match self.inner.context {
                GlobalRequestContext::TcpipForward { bind_port: 0, .. } => {
                    self.connect
                        .mux()
                        .send(&connect::ForwardingSuccess { bound_port })
                        .await?
                }
                _ => self.connect.mux().send(&connect::RequestSuccess).await?,
            }
        }

        Ok(())
    }

    /// Reject the global request.
    pub async fn reject(self) -> Result<()> {
        if *self.inner.want_reply {
            self.connect.mux().send(&connect::RequestFailure).await?;
        }

        Ok(())
    }
}
