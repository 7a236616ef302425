//! Server-side service answering authentication requests.

use enumset::EnumSet;
use hawser::{service::Handler, session::Session, side::Side, Error, Pipe, Result};
use hawser_packet::{
    arch::{NameList, Utf8},
    crypto,
    trans::DisconnectReason,
    userauth, Packet,
};
use ssh_key::{public::PublicKey, Signature};

mod method;
use method::Method;

pub mod keyboard;
pub mod none;
pub mod password;
pub mod publickey;

/// The attempt budgets applied to a session, exceeding either
/// disconnects the peer.
#[derive(Debug, Clone, Copy)]
pub struct Attempts {
    /// Total allowed authentication requests for the session.
    pub session: usize,

    /// Allowed authentication requests per method.
    pub per_method: usize,
}

impl Default for Attempts {
    fn default() -> Self {
        Self {
            session: 20,
            per_method: 10,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    total: usize,
    methods: [usize; 4],
}

#[derive(Debug)]
enum Attempt {
    Success,
    Failure,
    Continue,

    /// The method was interrupted by a new, already-received request.
    Next(Packet),
}

/// The authentication service [`Handler`] for sessions, rejecting
/// everything until method engines are plugged with the builder
/// methods.
#[derive(Debug)]
pub struct Auth<H, N = (), P = (), PK = (), KI = ()> {
    banner: Option<Utf8>,
    methods: EnumSet<Method>,
    attempts: Attempts,
    counters: Counters,

    handler: H,

    none: N,
    password: P,
    publickey: PK,
    keyboard: KI,
}

impl<H> Auth<H>
where
    H: Handler,
{
    /// Create an [`Auth`] handler around the `service` that follows a
    /// successful authentication, rejecting all requests by default.
    pub fn new(service: H) -> Self {
        Self {
            banner: Default::default(),
            methods: Method::None.into(), // always serve the `none` method
            attempts: Default::default(),
            counters: Default::default(),

            handler: service,

            none: (),
            password: (),
            publickey: (),
            keyboard: (),
        }
    }
}

impl<H, N, P, PK, KI> Auth<H, N, P, PK, KI>
where
    H: Handler,
    N: none::None,
    P: password::Password,
    PK: publickey::Publickey,
    KI: keyboard::KeyboardInteractive,
{
    /// Set the authentication banner text displayed upon connection
    /// (the string should be `\r\n` terminated).
    pub fn banner(mut self, banner: impl Into<Utf8>) -> Self {
        self.banner = Some(banner.into());

        self
    }

    /// Override the attempt budgets for the session.
    pub fn attempts(mut self, attempts: Attempts) -> Self {
        self.attempts = attempts;

        self
    }

    /// Plug the handler for the `none` method.
    pub fn none(self, none: impl none::None) -> Auth<H, impl none::None, P, PK, KI> {
        let Self {
            banner,
            methods,
            attempts,
            counters,
            handler,
            none: _,
            password,
            publickey,
            keyboard,
        } = self;

        Auth {
            banner,
            methods: methods | Method::None,
            attempts,
            counters,
            handler,
            none,
            password,
            publickey,
            keyboard,
        }
    }

    /// Plug the handler for the `password` method.
    pub fn password(
        self,
        password: impl password::Password,
    ) -> Auth<H, N, impl password::Password, PK, KI> {
        let Self {
            banner,
            methods,
            attempts,
            counters,
            handler,
            none,
            password: _,
            publickey,
            keyboard,
        } = self;

        Auth {
            banner,
            methods: methods | Method::Password,
            attempts,
            counters,
            handler,
            none,
            password,
            publickey,
            keyboard,
        }
    }

    /// Plug the handler for the `publickey` method.
    pub fn publickey(
        self,
        publickey: impl publickey::Publickey,
    ) -> Auth<H, N, P, impl publickey::Publickey, KI> {
        let Self {
            banner,
            methods,
            attempts,
            counters,
            handler,
            none,
            password,
            publickey: _,
            keyboard,
        } = self;

        Auth {
            banner,
            methods: methods | Method::Publickey,
            attempts,
            counters,
            handler,
            none,
            password,
            publickey,
            keyboard,
        }
    }

    /// Plug the handler for the `keyboard-interactive` method.
    pub fn keyboard_interactive(
        self,
        keyboard: impl keyboard::KeyboardInteractive,
    ) -> Auth<H, N, P, PK, impl keyboard::KeyboardInteractive> {
        let Self {
            banner,
            methods,
            attempts,
            counters,
            handler,
            none,
            password,
            publickey,
            keyboard: _,
        } = self;

        Auth {
            banner,
            methods: methods | Method::KeyboardInteractive,
            attempts,
            counters,
            handler,
            none,
            password,
            publickey,
            keyboard,
        }
    }

    fn continue_with(&self) -> NameList {
        NameList::from_iter(self.methods.iter().map(|method| method.as_str()))
    }

    async fn failure<IO: Pipe, S: Side>(&self, session: &mut Session<IO, S>) -> Result<()> {
        session
            .send(&userauth::Failure {
                continue_with: self.continue_with(),
                partial_success: false.into(),
            })
            .await
    }

    async fn handle_attempt<IO: Pipe, S: Side>(
        &mut self,
        session: &mut Session<IO, S>,
        username: Utf8,
        method: userauth::Method,
    ) -> Result<Attempt> {
        Ok(match method {
            userauth::Method::None => {
                tracing::debug!("Attempt using method `none` for user `{username}`");

                match self.none.process(username.into_string()) {
                    none::Response::Accept => Attempt::Success,
                    none::Response::Reject => Attempt::Failure,
                }
            }

            userauth::Method::Publickey {
                algorithm,
                blob,
                signature,
            } => {
                tracing::debug!(
                    "Attempt using method `publickey` (signed: {}, algorithm: {}) for user `{username}`",
                    signature.is_some(),
                    String::from_utf8_lossy(&algorithm),
                );

                let key = PublicKey::from_bytes(&blob);

                match signature {
                    None => match key {
                        Ok(key)
                            if self.publickey.process(username.into_string(), key.clone())
                                == publickey::Response::Accept =>
                        {
                            session.send(&userauth::PkOk { algorithm, blob }).await?;

                            Attempt::Continue
                        }
                        _ => Attempt::Failure,
                    },
                    Some(signature) => match key {
                        Ok(key) if key.algorithm().as_str().as_bytes() == algorithm.as_ref() => {
                            let message = crypto::PublickeySignature {
                                session_id: &session
                                    .session_id()
                                    .expect("authentication attempted before key-exchange")
                                    .into(),
                                username: &username,
                                service_name: &crate::CONNECTION_SERVICE_NAME.into(),
                                algorithm: &algorithm,
                                blob: &blob,
                            };

                            if message
                                .verify(&key, &Signature::try_from(signature.as_ref())?)
                                .is_ok()
                                && self.publickey.process(username.into_string(), key)
                                    == publickey::Response::Accept
                            {
                                Attempt::Success
                            } else {
                                Attempt::Failure
                            }
                        }
                        _ => Attempt::Failure,
                    },
                }
            }

            userauth::Method::Password { password, new } => {
                tracing::debug!(
                    "Attempt using method `password` (update: {}) for user `{username}`",
                    new.is_some(),
                );

                match self.password.process(
                    username.into_string(),
                    password.into_string(),
                    new.map(Utf8::into_string),
                ) {
                    password::Response::Accept => Attempt::Success,
                    password::Response::PasswordExpired { prompt } => {
                        session
                            .send(&userauth::PasswdChangereq {
                                prompt: prompt.into(),
                                ..Default::default()
                            })
                            .await?;

                        Attempt::Continue
                    }
                    password::Response::Reject => Attempt::Failure,
                }
            }

            userauth::Method::KeyboardInteractive { submethods, .. } => {
                tracing::debug!(
                    "Attempt using method `keyboard-interactive` for user `{username}`"
                );

                let mut outcome = self
                    .keyboard
                    .challenge(username.to_string(), submethods.into_string());

                loop {
                    match outcome {
                        keyboard::Response::Accept => break Attempt::Success,
                        keyboard::Response::Reject => break Attempt::Failure,
                        keyboard::Response::Challenge(challenge) => {
                            session
                                .send(&userauth::InfoRequest {
                                    name: challenge.name.into(),
                                    instruction: challenge.instruction.into(),
                                    language: Default::default(),
                                    prompts: challenge
                                        .prompts
                                        .into_iter()
                                        .map(|prompt| userauth::InfoRequestPrompt {
                                            prompt: prompt.prompt.into(),
                                            echo: prompt.echo.into(),
                                        })
                                        .collect(),
                                })
                                .await?;

                            let packet = session.recv().await?;

                            if let Ok(userauth::InfoResponse { responses }) = packet.to() {
                                outcome = self.keyboard.verify(
                                    username.to_string(),
                                    responses.into_iter().map(Utf8::into_string).collect(),
                                );
                            } else if packet.to::<userauth::Request>().is_ok() {
                                // The peer aborted the exchange with a new request.
                                break Attempt::Next(packet);
                            } else {
                                break Attempt::Failure;
                            }
                        }
                    }
                }
            }

            userauth::Method::Hostbased { .. } => Attempt::Failure,
        })
    }
}

impl<H, N, P, PK, KI> Handler for Auth<H, N, P, PK, KI>
where
    H: Handler,
    N: none::None,
    P: password::Password,
    PK: publickey::Publickey,
    KI: keyboard::KeyboardInteractive,
{
    type Err = H::Err;
    type Ok<IO: Pipe, S: Side> = H::Ok<IO, S>;

    const SERVICE_NAME: &'static str = crate::SERVICE_NAME;

    async fn on_request<IO, S>(
        &mut self,
        mut session: Session<IO, S>,
    ) -> Result<Self::Ok<IO, S>, Self::Err>
    where
        IO: Pipe,
        S: Side,
    {
        if let Some(message) = self.banner.take() {
            session
                .send(&userauth::Banner {
                    message,
                    ..Default::default()
                })
                .await?;
        }

        let mut packet = session.recv().await?;

        loop {
            let Ok(userauth::Request {
                username,
                service_name,
                method,
            }) = packet.to()
            else {
                break Err(Error::from(
                    session
                        .disconnect(
                            DisconnectReason::ProtocolError,
                            format!(
                                "Unexpected message in the context of the `{}` service",
                                Self::SERVICE_NAME
                            ),
                        )
                        .await,
                )
                .into());
            };

            if service_name.as_str() != H::SERVICE_NAME {
                break Err(Error::from(
                    session
                        .disconnect(
                            DisconnectReason::ServiceNotAvailable,
                            format!(
                                "Unknown service `{service_name}` in authentication request"
                            ),
                        )
                        .await,
                )
                .into());
            }

            let enabled = Method::of(&method)
                .filter(|method| self.methods.contains(*method));

            let Some(kind) = enabled else {
                self.failure(&mut session).await?;

                packet = session.recv().await?;
                continue;
            };

            self.counters.total += 1;
            self.counters.methods[kind.index()] += 1;

            if self.counters.total > self.attempts.session
                || self.counters.methods[kind.index()] > self.attempts.per_method
            {
                break Err(Error::from(
                    session
                        .disconnect(
                            DisconnectReason::NoMoreAuthMethodsAvailable,
                            "Authentication attempts exhausted for the current session",
                        )
                        .await,
                )
                .into());
            }

            match self.handle_attempt(&mut session, username, method).await? {
                Attempt::Success => {
                    session.send(&userauth::Success).await?;

                    break self.handler.on_request(session).await;
                }
                Attempt::Failure => {
                    self.failure(&mut session).await?;

                    packet = session.recv().await?;
                }
                Attempt::Continue => {
                    packet = session.recv().await?;
                }
                Attempt::Next(next) => {
                    packet = next;
                }
            }
        }
    }
}
