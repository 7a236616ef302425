//! The registry of named subsystems, `sftp` built in.

use std::{collections::HashMap, io, sync::Arc};

use async_trait::async_trait;
use futures::{AsyncRead, AsyncWrite};

/// A subsystem serving one channel, addressed by name through
/// `SSH_MSG_CHANNEL_REQUEST "subsystem"`.
#[async_trait]
pub trait Subsystem: Send + Sync {
    /// Serve the subsystem over the channel's streams until the peer
    /// is done.
    async fn run(
        &self,
        stdin: &mut (dyn AsyncRead + Send + Unpin),
        stdout: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> io::Result<()>;
}

/// The name-to-subsystem table consulted by the session driver.
#[derive(Default)]
pub struct SubsystemRegistry {
    map: HashMap<String, Arc<dyn Subsystem>>,
}

impl SubsystemRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subsystem under `name`.
    pub fn insert(&mut self, name: impl Into<String>, subsystem: impl Subsystem + 'static) {
        self.map.insert(name.into(), Arc::new(subsystem));
    }

    /// Look a subsystem up by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Subsystem>> {
        self.map.get(name).cloned()
    }
}

/// The built-in `sftp` subsystem, one engine instance per channel.
pub struct Sftp {
    config: hawser_sftp::SftpConfig,
}

impl Sftp {
    /// Create the subsystem with the provided engine configuration.
    pub fn new(config: hawser_sftp::SftpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Subsystem for Sftp {
    async fn run(
        &self,
        stdin: &mut (dyn AsyncRead + Send + Unpin),
        stdout: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> io::Result<()> {
        hawser_sftp::Subsystem::new(self.config.clone())
            .run(stdin, stdout)
            .await
            .map_err(|err| match err {
                hawser_sftp::Error::Io(err) => err,
                err => io::Error::new(io::ErrorKind::InvalidData, err),
            })
    }
}
