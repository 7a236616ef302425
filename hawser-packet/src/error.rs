use thiserror::Error;

/// The error type used in the library.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// An error occured while using [`binrw`].
    #[error(transparent)]
    BinRw(#[from] binrw::Error),

    /// An error occured while performing I/O operations.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The parsed identification string was not conformant.
    #[error("The SSH identifier was either misformatted or misprefixed")]
    BadIdentifer,
}
