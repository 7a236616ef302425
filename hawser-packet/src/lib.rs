#![doc = concat!(
    "[![crates.io](https://img.shields.io/crates/v/", env!("CARGO_PKG_NAME"), ")](https://crates.io/crates/", env!("CARGO_PKG_NAME"), ")",
    " ",
    "[![docs.rs](https://img.shields.io/docsrs/", env!("CARGO_PKG_NAME"), ")](https://docs.rs/", env!("CARGO_PKG_NAME"), ")"
)]
#![doc = ""]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! The message families live in their protocol modules: [`trans`] for
//! the transport layer ([RFC 4253]), [`userauth`] for the
//! authentication protocol ([RFC 4252], [RFC 4256]) and [`connect`]
//! for the connection protocol ([RFC 4254]).
//!
//! [RFC 4252]: https://datatracker.ietf.org/doc/html/rfc4252
//! [RFC 4253]: https://datatracker.ietf.org/doc/html/rfc4253
//! [RFC 4254]: https://datatracker.ietf.org/doc/html/rfc4254
//! [RFC 4256]: https://datatracker.ietf.org/doc/html/rfc4256

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    clippy::unwrap_used,
    clippy::panic,
    clippy::unimplemented,
    clippy::todo,
    clippy::undocumented_unsafe_blocks
)]
#![forbid(unsafe_code)]

pub use ::binrw;

mod error;
pub use error::Error;

mod id;
pub use id::Id;

mod packet;
pub use packet::{IntoPacket, Mac, OpeningCipher, Packet, SealingCipher};

pub mod arch;
pub mod connect;
pub mod crypto;
pub mod trans;
pub mod userauth;
