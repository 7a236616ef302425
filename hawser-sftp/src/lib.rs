#![doc = concat!(
    "[![crates.io](https://img.shields.io/crates/v/", env!("CARGO_PKG_NAME"), ")](https://crates.io/crates/", env!("CARGO_PKG_NAME"), ")",
    " ",
    "[![docs.rs](https://img.shields.io/docsrs/", env!("CARGO_PKG_NAME"), ")](https://docs.rs/", env!("CARGO_PKG_NAME"), ")"
)]
#![doc = ""]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! The [`Subsystem`] reads length-prefixed SFTP packets from any
//! [`futures::AsyncRead`] and answers on any [`futures::AsyncWrite`],
//! the way the `sftp` subsystem of an SSH session channel is wired.
//! The protocol version is negotiated down from the client's `INIT`
//! (and optionally through the `version-select` extension), between
//! versions 3 and 6 inclusive.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    clippy::unwrap_used,
    clippy::panic,
    clippy::unimplemented,
    clippy::todo,
    clippy::undocumented_unsafe_blocks
)]

mod error;
pub use error::{Error, Result};

pub mod wire;

mod handles;

mod extensions;

mod subsystem;
pub use subsystem::Subsystem;

/// The lowest protocol version the subsystem speaks.
pub const VERSION_MIN: u32 = 3;

/// The highest protocol version the subsystem speaks.
pub const VERSION_MAX: u32 = 6;

/// What to do with attributes the platform (or the negotiated
/// protocol version) cannot represent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnsupportedAttributePolicy {
    /// Silently skip them.
    Ignore,

    /// Skip them with a warning log.
    #[default]
    Warn,

    /// Fail the whole request.
    ThrowException,
}

/// The configuration surface of the subsystem.
#[derive(Debug, Clone)]
pub struct SftpConfig {
    /// Cap the negotiated protocol version (still clamped to
    /// [`VERSION_MAX`]).
    pub version: u32,

    /// Size of the generated file handles, in bytes (4 to 64).
    pub handle_size: usize,

    /// How many rounds of random generation to attempt before giving
    /// up on a colliding handle.
    pub handle_rand_max_rounds: usize,

    /// Cap on concurrently open handles, `None` for unlimited.
    pub max_open_handles: Option<usize>,

    /// Largest data area of a single response packet, and the bound
    /// applied to `READ` requests, in bytes.
    pub max_packet_length: u32,

    /// What to do with attributes that cannot be honored.
    pub unsupported_attribute_policy: UnsupportedAttributePolicy,

    /// Extra `name => data` extension pairs advertised in the
    /// `VERSION` answer.
    pub client_extensions: Vec<(String, String)>,

    /// Whether to advertise and serve the OpenSSH extensions
    /// (`fsync@openssh.com`).
    pub openssh_extensions: bool,
}

impl Default for SftpConfig {
    fn default() -> Self {
        Self {
            version: VERSION_MAX,
            handle_size: 16,
            handle_rand_max_rounds: 64,
            max_open_handles: None,
            max_packet_length: 0x4000,
            unsupported_attribute_policy: Default::default(),
            client_extensions: Vec::new(),
            openssh_extensions: true,
        }
    }
}
