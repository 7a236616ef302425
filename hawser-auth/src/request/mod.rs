//! Client-side requester authenticating an outgoing session.

use std::collections::VecDeque;

use hawser::{service::Request, session::Session, side::Side, Error, Pipe, Result};
use hawser_packet::{
    arch::Bytes,
    crypto,
    trans::DisconnectReason,
    userauth,
};
use signature::SignatureEncoding;
use ssh_key::{private::PrivateKey, Signature};

/// A prompt received in a `keyboard-interactive` challenge.
#[derive(Debug, Clone)]
pub struct Prompt {
    /// The text to display to the user.
    pub prompt: String,

    /// Whether the typed characters should be echoed back.
    pub echo: bool,
}

/// An interactive responder answering `keyboard-interactive` prompts.
pub trait Interactive: Send + Sync {
    /// Answer the challenge's `prompts`, one response per prompt, in order.
    fn respond(&mut self, instruction: String, prompts: Vec<Prompt>) -> Vec<String>;
}

impl<T: FnMut(String, Vec<Prompt>) -> Vec<String> + Send + Sync> Interactive for T {
    fn respond(&mut self, instruction: String, prompts: Vec<Prompt>) -> Vec<String> {
        (self)(instruction, prompts)
    }
}

enum Method {
    None,
    Password {
        password: String,
    },
    Publickey {
        key: Box<PrivateKey>,
    },
    KeyboardInteractive {
        responder: Box<dyn Interactive>,
    },
}

/// What the requester is currently waiting an answer for.
enum Pending {
    Plain,
    Probe { key: Box<PrivateKey> },
    Interactive { responder: Box<dyn Interactive> },
}

/// The authentication service [`Request`] for outgoing sessions,
/// trying the plugged methods in order after an initial `none` probe.
pub struct Auth<R> {
    username: String,
    service: R,

    methods: VecDeque<Method>,
}

impl<R> Auth<R>
where
    R: Request,
{
    /// Create an [`Auth`] requester for `username`, continuing with
    /// the `service` once authenticated.
    pub fn new(username: impl Into<String>, service: R) -> Self {
        Self {
            username: username.into(),
            service,

            methods: VecDeque::new(),
        }
    }

    /// Try authenticating with the provided password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.methods.push_back(Method::Password {
            password: password.into(),
        });

        self
    }

    /// Try authenticating with the provided private key.
    pub fn publickey(mut self, key: impl Into<PrivateKey>) -> Self {
        self.methods.push_back(Method::Publickey {
            key: Box::new(key.into()),
        });

        self
    }

    /// Try authenticating interactively with the provided responder.
    pub fn keyboard_interactive(mut self, responder: impl Interactive + 'static) -> Self {
        self.methods.push_back(Method::KeyboardInteractive {
            responder: Box::new(responder),
        });

        self
    }

    fn request(username: &str, method: userauth::Method) -> userauth::Request {
        userauth::Request {
            username: username.into(),
            service_name: crate::CONNECTION_SERVICE_NAME.into(),
            method,
        }
    }

    fn publickey_blob(key: &PrivateKey) -> Result<(Bytes, Bytes)> {
        let algorithm: Bytes = key.algorithm().as_str().as_bytes().into();
        let blob: Bytes = key.public_key().to_bytes()?.into();

        Ok((algorithm, blob))
    }

    async fn attempt<IO: Pipe, S: Side>(
        &mut self,
        session: &mut Session<IO, S>,
        method: Method,
    ) -> Result<Pending> {
        Ok(match method {
            Method::None => {
                session
                    .send(&Self::request(&self.username, userauth::Method::None))
                    .await?;

                Pending::Plain
            }
            Method::Password { password } => {
                session
                    .send(&Self::request(
                        &self.username,
                        userauth::Method::Password {
                            password: password.into(),
                            new: None,
                        },
                    ))
                    .await?;

                Pending::Plain
            }
            Method::Publickey { key } => {
                let (algorithm, blob) = Self::publickey_blob(&key)?;

                session
                    .send(&Self::request(
                        &self.username,
                        userauth::Method::Publickey {
                            algorithm,
                            blob,
                            signature: None,
                        },
                    ))
                    .await?;

                Pending::Probe { key }
            }
            Method::KeyboardInteractive { responder } => {
                session
                    .send(&Self::request(
                        &self.username,
                        userauth::Method::KeyboardInteractive {
                            language: Default::default(),
                            submethods: Default::default(),
                        },
                    ))
                    .await?;

                Pending::Interactive { responder }
            }
        })
    }

    async fn sign_and_send<IO: Pipe, S: Side>(
        &mut self,
        session: &mut Session<IO, S>,
        key: &PrivateKey,
    ) -> Result<()> {
        let (algorithm, blob) = Self::publickey_blob(key)?;

        let message = crypto::PublickeySignature {
            session_id: &session
                .session_id()
                .expect("authentication attempted before key-exchange")
                .into(),
            username: &self.username.as_str().into(),
            service_name: &crate::CONNECTION_SERVICE_NAME.into(),
            algorithm: &algorithm,
            blob: &blob,
        };
        let signature: Signature = message.sign(key);

        session
            .send(&Self::request(
                &self.username,
                userauth::Method::Publickey {
                    algorithm,
                    blob,
                    signature: Some(signature.to_vec().into()),
                },
            ))
            .await
    }
}

impl<R> Request for Auth<R>
where
    R: Request,
{
    type Err = R::Err;
    type Ok<IO: Pipe, S: Side> = R::Ok<IO, S>;

    const SERVICE_NAME: &'static str = crate::SERVICE_NAME;

    async fn on_accept<IO, S>(
        &mut self,
        mut session: Session<IO, S>,
    ) -> Result<Self::Ok<IO, S>, Self::Err>
    where
        IO: Pipe,
        S: Side,
    {
        let mut pending = self.attempt(&mut session, Method::None).await?;

        loop {
            let packet = session.recv().await?;

            if packet.to::<userauth::Success>().is_ok() {
                break self.service.on_accept(session).await;
            } else if let Ok(userauth::Banner { message, .. }) = packet.to() {
                tracing::info!("Authentication banner: {}", &*message);
            } else if packet.to::<userauth::Failure>().is_ok() {
                let Some(method) = self.methods.pop_front() else {
                    break Err(Error::from(
                        session
                            .disconnect(
                                DisconnectReason::AuthCancelledByUser,
                                "Authentication methods exhausted",
                            )
                            .await,
                    )
                    .into());
                };

                pending = self.attempt(&mut session, method).await?;
            } else {
                match std::mem::replace(&mut pending, Pending::Plain) {
                    Pending::Probe { key } if packet.to::<userauth::PkOk>().is_ok() => {
                        self.sign_and_send(&mut session, &key).await?;
                    }
                    Pending::Interactive { mut responder } => {
                        let Ok(userauth::InfoRequest {
                            instruction,
                            prompts,
                            ..
                        }) = packet.to()
                        else {
                            break Err(Error::UnexpectedMessage.into());
                        };

                        let responses = responder.respond(
                            instruction.into_string(),
                            prompts
                                .into_iter()
                                .map(|prompt| Prompt {
                                    prompt: prompt.prompt.into_string(),
                                    echo: *prompt.echo,
                                })
                                .collect(),
                        );

                        session
                            .send(&userauth::InfoResponse {
                                responses: responses.into_iter().map(Into::into).collect(),
                            })
                            .await?;

                        pending = Pending::Interactive { responder };
                    }
                    _ => break Err(Error::UnexpectedMessage.into()),
                }
            }
        }
    }
}
