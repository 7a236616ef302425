//! The `keyboard-interactive` authentication method of RFC 4256.

/// A single prompt in an interactive challenge.
#[derive(Debug, Clone)]
pub struct Prompt {
    /// The text displayed to the user.
    pub prompt: String,

    /// Whether the client should echo the typed characters back.
    pub echo: bool,
}

/// A challenge sent to the peer as `SSH_MSG_USERAUTH_INFO_REQUEST`.
#[derive(Debug, Clone, Default)]
pub struct Challenge {
    /// Name of the challenge.
    pub name: String,

    /// Instructions displayed before the prompts.
    pub instruction: String,

    /// The prompts the user has to answer.
    pub prompts: Vec<Prompt>,
}

/// The outcome of a challenge round.
#[derive(Debug)]
pub enum Response {
    /// _Accept_ the authentication request.
    Accept,

    /// Challenge (or challenge again) the peer.
    Challenge(Challenge),

    /// _Reject_ the authentication request.
    Reject,
}

/// The `keyboard-interactive` method handler, driving as many
/// challenge rounds as it answers with [`Response::Challenge`].
pub trait KeyboardInteractive: Send + Sync {
    /// Open the exchange for `user`, with the client's preferred `submethods` hint.
    fn challenge(&mut self, user: String, submethods: String) -> Response;

    /// Check the `responses` to the previous challenge, one per prompt, in order.
    fn verify(&mut self, user: String, responses: Vec<String>) -> Response;
}

/// A default implementation of the method that rejects all requests.
impl KeyboardInteractive for () {
    fn challenge(&mut self, _: String, _: String) -> Response {
        Response::Reject
    }

    fn verify(&mut self, _: String, _: Vec<String>) -> Response {
        Response::Reject
    }
}
