//! Commands backing the `shell` and `exec` channel requests.

use std::{collections::HashMap, io};

use async_trait::async_trait;
use futures::{AsyncRead, AsyncWrite};

/// The environment a command starts with: the variables accepted from
/// `env` requests and the terminal parameters from `pty-req`.
#[derive(Debug, Clone, Default)]
pub struct Env {
    /// Accepted environment variables.
    pub vars: HashMap<String, String>,

    /// The terminal geometry, when a `pty-req` was accepted:
    /// `(columns, rows, width pixels, height pixels)`.
    pub terminal: Option<(u32, u32, u32, u32)>,
}

/// A running command wired to the channel's streams.
///
/// `run` pumps `stdin`/`stdout`/`stderr` until the command finishes
/// and resolves to its exit code; the driver reports that code to the
/// peer with an `exit-status` request before closing the channel.
#[async_trait]
pub trait Command: Send {
    /// Run the command over the channel's streams.
    async fn run(
        &mut self,
        stdin: &mut (dyn AsyncRead + Send + Unpin),
        stdout: &mut (dyn AsyncWrite + Send + Unpin),
        stderr: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> io::Result<u32>;
}

/// The factory resolving `shell` (no command line) and `exec`
/// requests into [`Command`]s.
pub trait CommandFactory: Send + Sync {
    /// Create the command for `command_line`, `None` for a shell.
    fn create(&self, command_line: Option<&str>, env: &Env) -> io::Result<Box<dyn Command>>;
}

impl<T> CommandFactory for T
where
    T: Fn(Option<&str>, &Env) -> io::Result<Box<dyn Command>> + Send + Sync,
{
    fn create(&self, command_line: Option<&str>, env: &Env) -> io::Result<Box<dyn Command>> {
        (self)(command_line, env)
    }
}

/// A command echoing its input back, the classic development shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoCommand;

#[async_trait]
impl Command for EchoCommand {
    async fn run(
        &mut self,
        stdin: &mut (dyn AsyncRead + Send + Unpin),
        stdout: &mut (dyn AsyncWrite + Send + Unpin),
        _stderr: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> io::Result<u32> {
        futures::io::copy(stdin, stdout).await?;

        Ok(0)
    }
}

/// A factory spawning [`EchoCommand`]s for every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoShell;

impl CommandFactory for EchoShell {
    fn create(&self, _: Option<&str>, _: &Env) -> io::Result<Box<dyn Command>> {
        Ok(Box::new(EchoCommand))
    }
}
