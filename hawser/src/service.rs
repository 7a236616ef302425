//! Services layered on top of the _session_, either
//! [`handled`](Handler) server-side or [`requested`](Request) client-side.

use futures::Future;

use crate::{session::Session, side::Side, Pipe};

/// A service _handler_ for incoming service requests.
pub trait Handler {
    /// The erroneous outcome of the service.
    type Err: From<crate::Error>;

    /// The successful outcome of the service.
    type Ok<IO: Pipe, S: Side>;

    /// The service _identifier_ answered for.
    const SERVICE_NAME: &'static str;

    /// The service callback, called once the service request has been accepted.
    fn on_request<IO, S>(
        &mut self,
        session: Session<IO, S>,
    ) -> impl Future<Output = Result<Self::Ok<IO, S>, Self::Err>>
    where
        IO: Pipe,
        S: Side;
}

/// A service _request_ to send to the peer.
pub trait Request {
    /// The erroneous outcome of the service.
    type Err: From<crate::Error>;

    /// The successful outcome of the service.
    type Ok<IO: Pipe, S: Side>;

    /// The service _identifier_ to request.
    const SERVICE_NAME: &'static str;

    /// The service callback, called once the peer accepted the service request.
    fn on_accept<IO, S>(
        &mut self,
        session: Session<IO, S>,
    ) -> impl Future<Output = Result<Self::Ok<IO, S>, Self::Err>>
    where
        IO: Pipe,
        S: Side;
}
