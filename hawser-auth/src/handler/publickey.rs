//! The `publickey` authentication method.

use ssh_key::public::PublicKey;

/// The response to a `publickey` authentication request.
#[derive(Debug, PartialEq, Eq)]
pub enum Response {
    /// _Accept_ the authentication request.
    Accept,

    /// _Reject_ the authentication request.
    Reject,
}

/// The `publickey` method handler, consulted both for the unsigned
/// probe (before `SSH_MSG_USERAUTH_PK_OK` is emitted) and for the
/// signed request.
pub trait Publickey: Send + Sync {
    /// Process the authentication request for `user` with the presented `key`.
    fn process(&mut self, user: String, key: PublicKey) -> Response;
}

impl<T: FnMut(String, PublicKey) -> Response + Send + Sync> Publickey for T {
    fn process(&mut self, user: String, key: PublicKey) -> Response {
        (self)(user, key)
    }
}

/// A default implementation of the method that rejects all requests.
impl Publickey for () {
    fn process(&mut self, _: String, _: PublicKey) -> Response {
        Response::Reject
    }
}
