#![doc = concat!(
    "[![crates.io](https://img.shields.io/crates/v/", env!("CARGO_PKG_NAME"), ")](https://crates.io/crates/", env!("CARGO_PKG_NAME"), ")",
    " ",
    "[![docs.rs](https://img.shields.io/docsrs/", env!("CARGO_PKG_NAME"), ")](https://docs.rs/", env!("CARGO_PKG_NAME"), ")"
)]
#![doc = ""]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! The [`handler::Auth`] type services authentication requests
//! server-side, with pluggable engines for the `none`, `password`,
//! `publickey` and `keyboard-interactive` methods; [`request::Auth`]
//! is its client-side counterpart used to authenticate outgoing
//! sessions.

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

const SERVICE_NAME: &str = "ssh-userauth";
const CONNECTION_SERVICE_NAME: &str = "ssh-connection";

pub mod authorized_keys;
pub use authorized_keys::AuthorizedKeys;

pub mod handler;
pub mod request;
