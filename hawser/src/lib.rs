#![doc = concat!(
    "[![crates.io](https://img.shields.io/crates/v/", env!("CARGO_PKG_NAME"), ")](https://crates.io/crates/", env!("CARGO_PKG_NAME"), ")",
    " ",
    "[![docs.rs](https://img.shields.io/docsrs/", env!("CARGO_PKG_NAME"), ")](https://docs.rs/", env!("CARGO_PKG_NAME"), ")"
)]
#![doc = ""]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! The crate revolves around the [`session::Session`] type, which
//! wraps any [`Pipe`]-alike I/O object to speak the `SSH-TRANS`
//! protocol on it, from the identification exchange to the encrypted
//! and authenticated packet stream, with transparent re-keying.
//!
//! Services ([`service::Handler`], [`service::Request`]) are layered
//! on top of the session, the way the `hawser-auth` and
//! `hawser-connect` crates do.

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

use futures::{AsyncBufRead, AsyncWrite};

mod error;
pub use error::{DisconnectedBy, DisconnectedError, Error, Result};

pub mod algorithm;
pub mod service;
pub mod session;
pub mod side;
pub mod stream;

#[doc(no_inline)]
pub use session::Session;

/// A trait alias for something _pipe-alike_, implementing [`AsyncBufRead`] and [`AsyncWrite`].
pub trait Pipe: AsyncBufRead + AsyncWrite + Unpin + Send + Sync + 'static {}
impl<T: AsyncBufRead + AsyncWrite + Unpin + Send + Sync + 'static> Pipe for T {}
