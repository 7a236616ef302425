use thiserror::Error;

/// The error types that can occur when running the subsystem.
///
/// Filesystem-level failures never surface here: they are answered to
/// the peer as `SSH_FXP_STATUS` messages. An [`enum@Error`] terminates
/// the subsystem and tears the carrying channel down.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the carrying streams.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The peer sent a packet that cannot be decoded.
    #[error("Truncated or malformed packet payload")]
    BadMessage,

    /// The peer sent a packet kind unknown to any protocol version.
    #[error("Unknown packet type `{0}`")]
    UnknownPacket(u8),

    /// The peer spoke before or instead of `SSH_FXP_INIT`.
    #[error("The peer did not open the session with `SSH_FXP_INIT`")]
    NoInit,

    /// No protocol version is spoken by both sides.
    #[error("Unable to agree on a protocol version with the peer")]
    VersionNegotiation,

    /// The `version-select` contract was violated, which disconnects
    /// instead of answering a status.
    #[error("Invalid `version-select`: {0}")]
    VersionSelect(&'static str),

    /// The peer sent a packet larger than the authorized maximum.
    #[error("Packet of size {0} exceeds the maximum authorized size")]
    PacketTooLarge(usize),
}

/// A handy [`std::result::Result`] type alias bounding the [`enum@Error`] struct as `E`.
pub type Result<T, E = Error> = std::result::Result<T, E>;
