//! Helpers for the hashes and signed blobs encountered through the protocol.

use binrw::binwrite;

use crate::arch;

/// The exchange hash input for ECDH key exchanges, the
/// concatenation of the following fields hashed with the kex digest.
///
/// see <https://datatracker.ietf.org/doc/html/rfc5656#section-4>.
#[binwrite]
#[derive(Debug)]
#[bw(big)]
pub struct EcdhExchange<'e> {
    /// Client's identification string (`\r` and `\n` excluded).
    pub v_c: &'e arch::Bytes,

    /// Server's identification string (`\r` and `\n` excluded).
    pub v_s: &'e arch::Bytes,

    /// Payload of the client's `SSH_MSG_KEXINIT` message.
    pub i_c: &'e arch::Bytes,

    /// Payload of the server's `SSH_MSG_KEXINIT` message.
    pub i_s: &'e arch::Bytes,

    /// Server's public host key blob.
    pub k_s: &'e arch::Bytes,

    /// Client's ephemeral public key octet string.
    pub q_c: &'e arch::Bytes,

    /// Server's ephemeral public key octet string.
    pub q_s: &'e arch::Bytes,

    /// Computed shared secret.
    pub k: &'e arch::MpInt,
}

impl EcdhExchange<'_> {
    /// Produce the exchange hash with the specified digest algorithm.
    pub fn hash<D: digest::Digest>(&self) -> digest::Output<D> {
        use binrw::BinWrite;

        let mut buffer = Vec::new();
        self.write(&mut std::io::Cursor::new(&mut buffer))
            .expect("The binrw structure serialization failed");

        D::digest(&buffer)
    }
}

/// The blob that gets _signed_ and _verified_ to prove the possession
/// of the private key in the `publickey` authentication method.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4252#section-7>.
#[binwrite]
#[derive(Debug)]
#[bw(big)]
pub struct PublickeySignature<'s> {
    /// The session identifier issued by the first key-exchange.
    pub session_id: &'s arch::Bytes,

    #[bw(calc = 50)]
    magic: u8,

    /// Username of the authentication request.
    pub username: &'s arch::Utf8,

    /// Service name to start.
    pub service_name: &'s arch::Ascii,

    #[bw(calc = "publickey".into())]
    method: arch::Utf8,

    #[bw(calc = true.into())]
    signed: arch::Bool,

    /// Public key algorithm's name.
    pub algorithm: &'s arch::Bytes,

    /// Public key blob.
    pub blob: &'s arch::Bytes,
}

impl PublickeySignature<'_> {
    fn to_bytes(&self) -> Vec<u8> {
        use binrw::BinWrite;

        let mut buffer = Vec::new();
        self.write(&mut std::io::Cursor::new(&mut buffer))
            .expect("The binrw structure serialization failed");

        buffer
    }

    /// Verify the blob against the provided `signature` with the `key`.
    pub fn verify<S, K: signature::Verifier<S>>(
        &self,
        key: &K,
        signature: &S,
    ) -> signature::Result<()> {
        K::verify(key, &self.to_bytes(), signature)
    }

    /// Sign the blob with the provided `key` to produce the `signature`.
    pub fn sign<S, K: signature::Signer<S>>(&self, key: &K) -> S {
        K::sign(key, &self.to_bytes())
    }
}
