//! Supported algorithms for **key-exchange**, **encryption**,
//! **integrity** and **compression**, along with their negotiation.

mod cipher;
pub use cipher::{Cipher, CipherState};

mod compress;
pub use compress::Compress;

mod hmac;
pub use hmac::Hmac;

pub(crate) mod kex;
pub use kex::Kex;

pub(crate) mod hostkey;
pub use hostkey::Key;
