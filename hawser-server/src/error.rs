use thiserror::Error;

/// The error types that can occur while serving sessions.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// Connect-layer error.
    #[error(transparent)]
    Connect(#[from] hawser_connect::Error),

    /// Transport error.
    #[error(transparent)]
    Transport(#[from] hawser::Error),

    /// I/O error on a forwarded socket or a command stream.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A handy [`std::result::Result`] type alias bounding the [`enum@Error`] struct as `E`.
pub type Result<T, E = Error> = std::result::Result<T, E>;
