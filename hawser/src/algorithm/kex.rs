use hawser_packet::{
    arch::{Bytes, MpInt},
    crypto::EcdhExchange,
    trans::{KexEcdhInit, KexEcdhReply, KexInit},
    Id, IntoPacket,
};
use sha2::Sha256;
use signature::{SignatureEncoding, Signer, Verifier};
use ssh_key::{PrivateKey, PublicKey, Signature};
use strum::{AsRefStr, EnumString};

use crate::{
    stream::{Keys, Stream, Transport, TransportPair},
    Error, Pipe, Result,
};

use super::{cipher, compress, hmac};

pub(crate) fn negotiate(clientkex: &KexInit, serverkex: &KexInit) -> Result<Kex> {
    clientkex
        .kex_algorithms
        .preferred_in(&serverkex.kex_algorithms)
        .ok_or(Error::NoCommonKex)?
        .parse()
        .map_err(|_| Error::UnsupportedAlgorithm)
}

/// SSH key-exchange algorithms.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, EnumString, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Kex {
    /// Curve25519 ECDH with sha-2-256 digest.
    Curve25519Sha256,

    /// Curve25519 ECDH with sha-2-256 digest (pre-RFC 8731).
    #[strum(serialize = "curve25519-sha256@libssh.org")]
    Curve25519Sha256Libssh,

    /// NIST P-256 ECDH with sha-2-256 digest.
    #[strum(serialize = "ecdh-sha2-nistp256")]
    EcdhSha2Nistp256,
}

/// The negotiated directional algorithms, before any key material exists.
struct Negotiated {
    client_cipher: cipher::Cipher,
    server_cipher: cipher::Cipher,
    client_hmac: hmac::Hmac,
    server_hmac: hmac::Hmac,
    client_compress: compress::Compress,
    server_compress: compress::Compress,
}

impl Negotiated {
    fn from(i_c: &KexInit, i_s: &KexInit) -> Result<Self> {
        let (client_hmac, server_hmac) = hmac::negotiate(i_c, i_s)?;
        let (client_compress, server_compress) = compress::negotiate(i_c, i_s)?;
        let (client_cipher, server_cipher) = cipher::negotiate(i_c, i_s)?;

        Ok(Self {
            client_cipher,
            server_cipher,
            client_hmac,
            server_hmac,
            client_compress,
            server_compress,
        })
    }

    /// Build the client's transport pair: receiving the
    /// server-to-client direction, sending the client-to-server one.
    fn into_client_pair(self, secret: &MpInt, hash: &[u8], session_id: &[u8]) -> TransportPair {
        TransportPair {
            rx: Transport {
                chain: Keys::as_server::<Sha256>(
                    &secret,
                    hash,
                    session_id,
                    &self.server_cipher,
                    &self.server_hmac,
                ),
                state: None,
                cipher: self.server_cipher,
                hmac: self.server_hmac,
                compress: self.server_compress,
            },
            tx: Transport {
                chain: Keys::as_client::<Sha256>(
                    &secret,
                    hash,
                    session_id,
                    &self.client_cipher,
                    &self.client_hmac,
                ),
                state: None,
                cipher: self.client_cipher,
                hmac: self.client_hmac,
                compress: self.client_compress,
            },
        }
    }

    /// Build the server's transport pair, the mirror of
    /// [`Negotiated::into_client_pair`].
    fn into_server_pair(self, secret: &MpInt, hash: &[u8], session_id: &[u8]) -> TransportPair {
        TransportPair {
            rx: Transport {
                chain: Keys::as_client::<Sha256>(
                    &secret,
                    hash,
                    session_id,
                    &self.client_cipher,
                    &self.client_hmac,
                ),
                state: None,
                cipher: self.client_cipher,
                hmac: self.client_hmac,
                compress: self.client_compress,
            },
            tx: Transport {
                chain: Keys::as_server::<Sha256>(
                    &secret,
                    hash,
                    session_id,
                    &self.server_cipher,
                    &self.server_hmac,
                ),
                state: None,
                cipher: self.server_cipher,
                hmac: self.server_hmac,
                compress: self.server_compress,
            },
        }
    }
}

/// An ephemeral ECDH secret for either of the supported curves.
enum Ephemeral {
    X25519(x25519_dalek::EphemeralSecret),
    Nistp256(p256::ecdh::EphemeralSecret),
}

impl Ephemeral {
    fn generate(kex: &Kex) -> Self {
        match kex {
            Kex::Curve25519Sha256 | Kex::Curve25519Sha256Libssh => Self::X25519(
                x25519_dalek::EphemeralSecret::random_from_rng(rand::thread_rng()),
            ),
            Kex::EcdhSha2Nistp256 => {
                Self::Nistp256(p256::ecdh::EphemeralSecret::random(&mut rand::thread_rng()))
            }
        }
    }

    /// The public key octet string to transmit to the peer.
    fn public(&self) -> Vec<u8> {
        match self {
            Self::X25519(secret) => x25519_dalek::PublicKey::from(secret).as_bytes().to_vec(),
            Self::Nistp256(secret) => {
                use p256::elliptic_curve::sec1::ToEncodedPoint;

                secret.public_key().to_encoded_point(false).as_bytes().to_vec()
            }
        }
    }

    /// Derive the shared secret from the peer's public key octet string.
    fn diffie_hellman(self, peer: &[u8]) -> Result<MpInt> {
        match self {
            Self::X25519(secret) => {
                let peer = x25519_dalek::PublicKey::from(
                    <[u8; 32]>::try_from(peer).map_err(|_| Error::KexError)?,
                );

                Ok(MpInt::positive(
                    secret.diffie_hellman(&peer).to_bytes().as_ref(),
                ))
            }
            Self::Nistp256(secret) => {
                let peer = p256::PublicKey::from_sec1_bytes(peer).map_err(|_| Error::KexError)?;

                Ok(MpInt::positive(
                    secret.diffie_hellman(&peer).raw_secret_bytes().as_ref(),
                ))
            }
        }
    }
}

impl Kex {
    /// Run the key-exchange from the client's side of the `stream`.
    pub(crate) async fn as_client(
        &self,
        stream: &mut Stream<impl Pipe>,
        v_c: &Id,
        v_s: &Id,
        i_c: &KexInit,
        i_s: &KexInit,
    ) -> Result<TransportPair> {
        let negotiated = Negotiated::from(i_c, i_s)?;

        let ephemeral = Ephemeral::generate(self);
        let q_c: Bytes = ephemeral.public().into();

        stream.send(&KexEcdhInit { q_c: q_c.clone() }).await?;

        let ecdh: KexEcdhReply = stream.recv().await?.to()?;

        let secret = ephemeral.diffie_hellman(&ecdh.q_s)?;
        let k_s = PublicKey::from_bytes(&ecdh.k_s)?;

        let exchange = EcdhExchange {
            v_c: &v_c.to_string().into_bytes().into(),
            v_s: &v_s.to_string().into_bytes().into(),
            i_c: &i_c.into_packet().payload.into(),
            i_s: &i_s.into_packet().payload.into(),
            k_s: &ecdh.k_s,
            q_c: &q_c,
            q_s: &ecdh.q_s,
            k: &secret,
        };
        let hash = exchange.hash::<Sha256>();

        Verifier::verify(&k_s, &hash, &Signature::try_from(&*ecdh.signature)?)?;

        let session_id = stream.with_session(&hash).to_vec();

        Ok(negotiated.into_client_pair(&secret, &hash, &session_id))
    }

    /// Run the key-exchange from the server's side of the `stream`,
    /// signing the exchange hash with the host `key`.
    pub(crate) async fn as_server(
        &self,
        stream: &mut Stream<impl Pipe>,
        v_c: &Id,
        v_s: &Id,
        i_c: &KexInit,
        i_s: &KexInit,
        key: &PrivateKey,
    ) -> Result<TransportPair> {
        let negotiated = Negotiated::from(i_c, i_s)?;

        let ecdh: KexEcdhInit = stream.recv().await?.to()?;

        let ephemeral = Ephemeral::generate(self);
        let q_s: Bytes = ephemeral.public().into();

        let secret = ephemeral.diffie_hellman(&ecdh.q_c)?;
        let k_s: Bytes = key.public_key().to_bytes()?.into();

        let exchange = EcdhExchange {
            v_c: &v_c.to_string().into_bytes().into(),
            v_s: &v_s.to_string().into_bytes().into(),
            i_c: &i_c.into_packet().payload.into(),
            i_s: &i_s.into_packet().payload.into(),
            k_s: &k_s,
            q_c: &ecdh.q_c,
            q_s: &q_s,
            k: &secret,
        };
        let hash = exchange.hash::<Sha256>();

        let signature: Signature = Signer::sign(key, &hash);
        stream
            .send(&KexEcdhReply {
                k_s,
                q_s,
                signature: signature.to_vec().into(),
            })
            .await?;

        let session_id = stream.with_session(&hash).to_vec();

        Ok(negotiated.into_server_pair(&secret, &hash, &session_id))
    }
}
