//! The `password` authentication method.

/// The response to a `password` authentication request.
#[derive(Debug, PartialEq, Eq)]
pub enum Response {
    /// _Accept_ the authentication request.
    Accept,

    /// Ask for a password change before accepting the request.
    PasswordExpired {
        /// The prompt displayed to the user before the password change.
        prompt: String,
    },

    /// _Reject_ the authentication request.
    Reject,
}

/// The `password` method handler.
pub trait Password: Send + Sync {
    /// Process the authentication request for `user`, with the
    /// replacement password when answering an expiry prompt.
    fn process(&mut self, user: String, password: String, newpassword: Option<String>) -> Response;
}

impl<T: FnMut(String, String, Option<String>) -> Response + Send + Sync> Password for T {
    fn process(&mut self, user: String, password: String, newpassword: Option<String>) -> Response {
        (self)(user, password, newpassword)
    }
}

/// A default implementation of the method that rejects all requests.
impl Password for () {
    fn process(&mut self, _: String, _: String, _: Option<String>) -> Response {
        Response::Reject
    }
}
