//! The driver for `session` channels: environment collection, command
//! execution and subsystem wiring.

use std::num::NonZeroU32;
use std::sync::Arc;

use futures::{future::Either, pin_mut, TryStreamExt};
use hawser::{side::Side, Pipe};
use hawser_connect::{
    channel::{Channel, ChannelRequestContext},
    channel_open,
};
use hawser_packet::connect::EXTENDED_DATA_STDERR;

use crate::{
    command::{Command, Env},
    subsystem::Subsystem,
    Error, Handlers, Result,
};

/// What a `session` channel request resolved to.
enum Job {
    Command(Box<dyn Command>),
    Subsystem(Arc<dyn Subsystem>),
}

/// Drive one `session` channel to completion: collect `env` and
/// `pty-req` state, start the requested command or subsystem, then
/// pump its streams while still answering channel requests.
pub async fn drive<IO, S>(channel: &Channel<'_, IO, S>, handlers: &Handlers) -> Result<()>
where
    IO: Pipe,
    S: Side,
{
    let mut env = Env::default();

    let requests = channel.requests();
    pin_mut!(requests);

    let job = loop {
        let Some(request) = requests.try_next().await? else {
            // The peer closed the channel without starting anything.
            return Ok(());
        };

        match request.cx().clone() {
            ChannelRequestContext::Env { name, value } => {
                env.vars.insert(name.into_string(), value.into_string());

                request.accept().await?;
            }
            ChannelRequestContext::Pty {
                width_chars,
                height_chars,
                width_pixels,
                height_pixels,
                ..
            } => {
                env.terminal = Some((width_chars, height_chars, width_pixels, height_pixels));

                request.accept().await?;
            }
            ChannelRequestContext::WindowChange {
                width_chars,
                height_chars,
                width_pixels,
                height_pixels,
            } => {
                env.terminal = Some((width_chars, height_chars, width_pixels, height_pixels));

                request.accept().await?;
            }
            ChannelRequestContext::Shell => match &handlers.commands {
                Some(factory) => {
                    let command = factory.create(None, &env)?;

                    request.accept().await?;
                    break Job::Command(command);
                }
                None => request.reject().await?,
            },
            ChannelRequestContext::Exec { command } => match &handlers.commands {
                Some(factory) => {
                    let command = factory.create(Some(&command.into_string()), &env)?;

                    request.accept().await?;
                    break Job::Command(command);
                }
                None => request.reject().await?,
            },
            ChannelRequestContext::Subsystem { name } => {
                let name = name.into_string();

                match handlers.subsystems.get(&name) {
                    Some(subsystem) => {
                        tracing::debug!("Starting the `{name}` subsystem");

                        request.accept().await?;
                        break Job::Subsystem(subsystem);
                    }
                    None => {
                        tracing::debug!("Refused the unknown `{name}` subsystem");

                        request.reject().await?;
                    }
                }
            }
            ChannelRequestContext::Signal { .. } | ChannelRequestContext::XonXoff { .. } => {
                request.accept().await?;
            }
            context => {
                tracing::debug!("Refused a channel request of type `{}`", context.as_str());

                request.reject().await?;
            }
        }
    };

    let mut stdin = channel.as_reader();
    let mut stdout = channel.as_writer();
    let mut stderr = channel.as_writer_ext(
        NonZeroU32::new(EXTENDED_DATA_STDERR).expect("the stderr stream code is non-zero"),
    );

    let outcome = {
        let job = async {
            match job {
                Job::Command(mut command) => {
                    command.run(&mut stdin, &mut stdout, &mut stderr).await
                }
                Job::Subsystem(subsystem) => subsystem
                    .run(&mut stdin, &mut stdout)
                    .await
                    .map(|()| 0),
            }
        };
        pin_mut!(job);

        let mut requests_done = false;

        // Answer channel requests (window changes, signals) while the
        // job runs.
        loop {
            if requests_done {
                break job.await;
            }

            let next = requests.try_next();
            pin_mut!(next);

            match futures::future::select(job.as_mut(), next).await {
                Either::Left((outcome, _)) => break outcome,
                Either::Right((request, _)) => match request? {
                    Some(request) => match request.cx().clone() {
                        ChannelRequestContext::WindowChange { .. }
                        | ChannelRequestContext::Signal { .. } => request.accept().await?,
                        _ => request.reject().await?,
                    },
                    None => requests_done = true,
                },
            }
        }
    };

    match outcome {
        Ok(code) => {
            channel
                .request(ChannelRequestContext::ExitStatus { code })
                .await?;
        }
        Err(err) => {
            tracing::warn!("The command ended with an error: {err}");

            channel
                .request(ChannelRequestContext::ExitSignal {
                    name: "KILL".into(),
                    core_dumped: false.into(),
                    error_message: err.to_string().into(),
                    language: Default::default(),
                })
                .await?;
        }
    }

    channel.eof().await.map_err(Error::from)
}

/// Answer a rejected `direct-tcpip` open with the filter's verdict;
/// kept here for the symmetry with [`drive`].
pub(crate) async fn refuse<IO, S>(
    open: channel_open::ChannelOpen<'_, IO, S>,
    why: &str,
) -> Result<()>
where
    IO: Pipe,
    S: Side,
{
    open.reject(
        channel_open::ChannelOpenFailureReason::AdministrativelyProhibited,
        why,
    )
    .await?;

    Ok(())
}
