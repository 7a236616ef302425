use hawser_packet::{Mac, OpeningCipher, Packet, SealingCipher};
use rand::Rng;

use crate::{algorithm, Error, Result};

use super::Keys;

/// The pair of directional transports negotiated by a key-exchange.
#[derive(Debug, Default)]
pub struct TransportPair {
    /// Transport for the receiving side.
    pub rx: Transport,

    /// Transport for the sending side.
    pub tx: Transport,
}

/// The packet codec for one direction: compression, cipher and MAC
/// algorithms along with their negotiated key material.
#[derive(Debug, Default)]
pub struct Transport {
    pub compress: algorithm::Compress,
    pub cipher: algorithm::Cipher,
    pub hmac: algorithm::Hmac,

    pub state: Option<algorithm::CipherState>,
    pub chain: Keys,
}

impl Transport {
    /// Compute the padding length for a payload of the provided size,
    /// at least 4 bytes of padding aligning the packet on the cipher's
    /// block size and above the protocol's minimal packet size.
    fn padding(&self, payload: usize) -> u8 {
        const MIN_PAD_SIZE: usize = 4;
        const MIN_ALIGN: usize = 8;

        let align = self.cipher.block_size().max(MIN_ALIGN);

        let size = if self.hmac.etm() {
            std::mem::size_of::<u8>() + payload
        } else {
            std::mem::size_of::<u32>() + std::mem::size_of::<u8>() + payload
        };
        let padding = align - size % align;

        let padding = if padding < MIN_PAD_SIZE {
            padding + align
        } else {
            padding
        };

        if size + padding < self.cipher.block_size().max(Packet::MIN_SIZE) {
            (padding + align) as u8
        } else {
            padding as u8
        }
    }
}

impl OpeningCipher for Transport {
    type Err = Error;

    fn mac(&self) -> &dyn Mac {
        &self.hmac
    }

    fn block_size(&self) -> usize {
        self.cipher.block_size()
    }

    fn decrypt(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.cipher != algorithm::Cipher::None {
            self.cipher
                .decrypt(&mut self.state, &self.chain.key, &self.chain.iv, buf)?;
        }

        Ok(())
    }

    fn open(&mut self, buf: &[u8], mac: &[u8], seq: u32) -> Result<()> {
        if self.hmac.size() > 0 {
            self.hmac.verify(seq, buf, &self.chain.hmac, mac)?;
        }

        Ok(())
    }

    fn decompress(&mut self, buf: Vec<u8>) -> Result<Vec<u8>> {
        self.compress.decompress(buf)
    }
}

impl SealingCipher for Transport {
    type Err = Error;

    fn mac(&self) -> &dyn Mac {
        &self.hmac
    }

    fn block_size(&self) -> usize {
        self.cipher.block_size()
    }

    fn compress(&mut self, buf: &[u8]) -> Result<Vec<u8>> {
        self.compress.compress(buf)
    }

    fn pad(&mut self, mut buf: Vec<u8>) -> Result<Vec<u8>> {
        let mut rng = rand::thread_rng();

        let padding = self.padding(buf.len());

        // prefix with the padding length
        let mut padded = vec![padding];
        padded.append(&mut buf);

        // fill the end with random padding
        padded.resize_with(padded.len() + padding as usize, || rng.gen());

        Ok(padded)
    }

    fn encrypt(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.cipher != algorithm::Cipher::None {
            self.cipher
                .encrypt(&mut self.state, &self.chain.key, &self.chain.iv, buf)?;
        }

        Ok(())
    }

    fn seal(&mut self, buf: &[u8], seq: u32) -> Result<Vec<u8>> {
        Ok(self.hmac.sign(seq, buf, &self.chain.hmac))
    }
}
