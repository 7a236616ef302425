use binrw::{
    meta::{ReadEndian, WriteEndian},
    BinRead, BinWrite,
};
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// A SSH 2.0 binary packet representation, holding it's decrypted payload.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4253#section-6>.
#[derive(Debug, Clone)]
pub struct Packet {
    /// SSH packet's payload as binary.
    pub payload: Vec<u8>,
}

impl Packet {
    /// Maximum size for a SSH packet, the protocol's
    /// required minimum is 32768 bytes, we accept up to 256KiB.
    pub const MAX_SIZE: usize = 0x40000;

    /// Minimum size for a SSH packet, coincidentally this is
    /// the largest block cipher's block-size.
    pub const MIN_SIZE: usize = 16;

    /// Try to deserialize the [`Packet`] into `T`.
    pub fn to<T>(&self) -> Result<T, binrw::Error>
    where
        T: BinRead + ReadEndian,
        for<'a> T::Args<'a>: Default,
    {
        T::read(&mut std::io::Cursor::new(&self.payload))
    }

    /// Read a [`Packet`] from the provided asynchronous `reader`,
    /// decrypting, verifying and decompressing it with the `cipher`.
    pub async fn from_async_reader<R, C>(
        reader: &mut R,
        cipher: &mut C,
        seq: u32,
    ) -> Result<Self, C::Err>
    where
        R: AsyncRead + Unpin,
        C: OpeningCipher,
    {
        let blocksize = cipher.block_size().max(8);

        let mut buf = vec![0u8; blocksize];
        reader.read_exact(&mut buf[..]).await?;

        if !cipher.mac().etm() {
            cipher.decrypt(&mut buf[..])?;
        }

        let len = u32::from_be_bytes(
            buf[..4]
                .try_into()
                .expect("The buffer of size 4 is not of size 4"),
        );

        if len as usize > Self::MAX_SIZE {
            return Err(binrw::Error::Custom {
                pos: 0x0,
                err: Box::new(format!("Packet size too large, {len} > {}", Self::MAX_SIZE)),
            })?;
        }

        buf.resize(std::mem::size_of_val(&len) + len as usize, 0);
        reader.read_exact(&mut buf[blocksize..]).await?;

        let mut mac = vec![0u8; cipher.mac().size()];
        reader.read_exact(&mut mac[..]).await?;

        if cipher.mac().etm() {
            cipher.open(&buf, &mac, seq)?;
            cipher.decrypt(&mut buf[4..])?;
        } else {
            cipher.decrypt(&mut buf[blocksize..])?;
            cipher.open(&buf, &mac, seq)?;
        }

        let (padlen, mut decrypted) =
            buf[4..].split_first().ok_or_else(|| binrw::Error::Custom {
                pos: 0x4,
                err: Box::new(format!("Packet size too small ({len})")),
            })?;

        if *padlen as usize + 1 > len as usize {
            return Err(binrw::Error::Custom {
                pos: 0x4,
                err: Box::new(format!("Padding size too large, {padlen} > {len} - 1")),
            })?;
        }

        let mut payload = vec![0u8; len as usize - *padlen as usize - std::mem::size_of_val(padlen)];
        std::io::Read::read_exact(&mut decrypted, &mut payload[..])?;

        let payload = cipher.decompress(payload)?;

        Ok(Self { payload })
    }

    /// Write the [`Packet`] to the provided asynchronous `writer`,
    /// compressing, padding, encrypting and sealing it with the `cipher`.
    pub async fn to_async_writer<W, C>(
        &self,
        writer: &mut W,
        cipher: &mut C,
        seq: u32,
    ) -> Result<(), C::Err>
    where
        W: AsyncWrite + Unpin,
        C: SealingCipher,
    {
        let compressed = cipher.compress(&self.payload)?;
        let padded = cipher.pad(compressed)?;

        let mut buf = [(padded.len() as u32).to_be_bytes().to_vec(), padded].concat();

        let mac = if cipher.mac().etm() {
            cipher.encrypt(&mut buf[4..])?;

            cipher.seal(&buf, seq)?
        } else {
            let mac = cipher.seal(&buf, seq)?;
            cipher.encrypt(&mut buf[..])?;

            mac
        };

        writer.write_all(&buf).await?;
        writer.write_all(&mac).await?;

        Ok(())
    }
}

impl std::ops::Deref for Packet {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.payload
    }
}

/// Conversion of a message to a [`Packet`], readily implemented for
/// every [`BinWrite`] message in this crate.
pub trait IntoPacket {
    /// Convert the value into a [`Packet`].
    fn into_packet(self) -> Packet;
}

impl IntoPacket for Packet {
    fn into_packet(self) -> Packet {
        self
    }
}

impl<T> IntoPacket for &T
where
    T: BinWrite + WriteEndian,
    for<'a> T::Args<'a>: Default,
{
    fn into_packet(self) -> Packet {
        let mut buffer = std::io::Cursor::new(Vec::new());
        self.write(&mut buffer)
            .expect("The binrw message serialization failed");

        Packet {
            payload: buffer.into_inner(),
        }
    }
}

/// The _Message Authentication Code_ description for a cipher.
pub trait Mac {
    /// The size of the produced authentication code, in bytes.
    fn size(&self) -> usize;

    /// Whether the code is computed over the ciphertext
    /// (`-etm@openssh.com` algorithms) rather than the plaintext.
    fn etm(&self) -> bool;
}

/// A cipher able to `open` a received [`Packet`] to it's payload.
pub trait OpeningCipher {
    /// The associated error type returned by the methods.
    type Err: From<binrw::Error> + From<std::io::Error>;

    /// The [`Mac`] associated with the cipher.
    fn mac(&self) -> &dyn Mac;

    /// The cipher's block size, in bytes.
    fn block_size(&self) -> usize;

    /// Decrypt the received `buf` in place.
    fn decrypt(&mut self, buf: &mut [u8]) -> Result<(), Self::Err>;

    /// Verify the authentication code of the received packet.
    fn open(&mut self, buf: &[u8], mac: &[u8], seq: u32) -> Result<(), Self::Err>;

    /// Decompress the received `buf`.
    fn decompress(&mut self, buf: Vec<u8>) -> Result<Vec<u8>, Self::Err>;
}

/// A cipher able to `seal` a payload to create a [`Packet`].
pub trait SealingCipher {
    /// The associated error type returned by the methods.
    type Err: From<binrw::Error> + From<std::io::Error>;

    /// The [`Mac`] associated with the cipher.
    fn mac(&self) -> &dyn Mac;

    /// The cipher's block size, in bytes.
    fn block_size(&self) -> usize;

    /// Compress the `buf`.
    fn compress(&mut self, buf: &[u8]) -> Result<Vec<u8>, Self::Err>;

    /// Prefix the `buf` with the padding length and fill the end with
    /// random padding to align on the cipher's block size.
    fn pad(&mut self, buf: Vec<u8>) -> Result<Vec<u8>, Self::Err>;

    /// Encrypt the `buf` in place.
    fn encrypt(&mut self, buf: &mut [u8]) -> Result<(), Self::Err>;

    /// Compute the authentication code for the packet.
    fn seal(&mut self, buf: &[u8], seq: u32) -> Result<Vec<u8>, Self::Err>;
}
