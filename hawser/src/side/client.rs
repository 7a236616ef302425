//! Client-[`Side`] implementation of the _session_.

use std::time::Duration;

use futures_time::time::Duration as Timeout;
use hawser_packet::{arch::NameList, trans::KexInit, Id};
use rand::RngCore;

use super::Side;
use crate::{
    algorithm::{self, Cipher, Compress, Hmac, Kex},
    stream::{RekeyLimits, Stream, TransportPair},
    Pipe, Result,
};

#[doc(no_inline)]
pub use ssh_key::Algorithm as Key;

/// A _client_-side session configuration.
#[derive(Debug, Clone)]
pub struct Client {
    /// [`Id`] for this _client_ session.
    pub id: Id,

    /// Timeout for sending and receiving packets.
    pub timeout: Duration,

    /// Re-keying thresholds for the session.
    pub rekey: RekeyLimits,

    /// The algorithms enabled for this _client_ session.
    pub algorithms: Algorithms,
}

impl Default for Client {
    fn default() -> Self {
        Self {
            id: Id::v2(
                concat!(
                    env!("CARGO_PKG_NAME"),
                    "@client:",
                    env!("CARGO_PKG_VERSION")
                ),
                None::<&str>,
            ),
            timeout: Duration::from_secs(120),
            rekey: Default::default(),
            algorithms: Default::default(),
        }
    }
}

/// Algorithms for a _client_-side session.
#[derive(Debug, Clone)]
pub struct Algorithms {
    /// Enabled algorithms for _key-exchange_.
    pub kexs: Vec<Kex>,

    /// Accepted algorithms for the server's _host key_.
    pub keys: Vec<Key>,

    /// Enabled algorithms for _encryption & decryption_.
    pub ciphers: Vec<Cipher>,

    /// Enabled algorithms for _hmac_.
    pub macs: Vec<Hmac>,

    /// Enabled algorithms for _compression_.
    pub compressions: Vec<Compress>,
}

impl Default for Algorithms {
    fn default() -> Self {
        let server = super::server::Algorithms::default();

        Self {
            kexs: server.kexs,
            keys: vec![
                Key::Ed25519,
                Key::Rsa { hash: None },
                Key::Ecdsa {
                    curve: ssh_key::EcdsaCurve::NistP256,
                },
                Key::Dsa,
            ],
            ciphers: server.ciphers,
            macs: server.macs,
            compressions: server.compressions,
        }
    }
}

impl Side for Client {
    fn id(&self) -> &Id {
        &self.id
    }

    fn timeout(&self) -> Timeout {
        self.timeout.into()
    }

    fn rekey(&self) -> RekeyLimits {
        self.rekey
    }

    fn kexinit(&self) -> KexInit {
        let mut cookie = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut cookie);

        KexInit {
            cookie,
            kex_algorithms: NameList::from_iter(&self.algorithms.kexs),
            server_host_key_algorithms: NameList::from_iter(&self.algorithms.keys),
            encryption_algorithms_client_to_server: NameList::from_iter(&self.algorithms.ciphers),
            encryption_algorithms_server_to_client: NameList::from_iter(&self.algorithms.ciphers),
            mac_algorithms_client_to_server: NameList::from_iter(&self.algorithms.macs),
            mac_algorithms_server_to_client: NameList::from_iter(&self.algorithms.macs),
            compression_algorithms_client_to_server: NameList::from_iter(
                &self.algorithms.compressions,
            ),
            compression_algorithms_server_to_client: NameList::from_iter(
                &self.algorithms.compressions,
            ),
            languages_client_to_server: NameList::default(),
            languages_server_to_client: NameList::default(),
            first_kex_packet_follows: false.into(),
        }
    }

    async fn exchange(
        &self,
        stream: &mut Stream<impl Pipe>,
        kexinit: KexInit,
        peerkexinit: KexInit,
        peer_id: &Id,
    ) -> Result<TransportPair> {
        let kex = algorithm::kex::negotiate(&kexinit, &peerkexinit)?;

        // A wrongly-guessed initial kex packet from the peer must be ignored.
        if *peerkexinit.first_kex_packet_follows
            && peerkexinit.kex_algorithms.iter().next() != Some(kex.as_ref())
        {
            let _ = stream.recv().await?;
        }

        kex.as_client(stream, self.id(), peer_id, &kexinit, &peerkexinit)
            .await
    }
}
