//! The SFTP wire protocol: length-prefixed packets, requests decoded
//! and responses encoded according to the negotiated version.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Error, Result};

mod attrs;
pub use attrs::{Attrs, FileType};

mod status;
pub use status::StatusCode;

pub mod open;

/// Largest packet tolerated from the peer, data area plus framing.
const PACKET_CEILING: usize = 0x40000;

pub(crate) const SSH_FXP_INIT: u8 = 1;
pub(crate) const SSH_FXP_VERSION: u8 = 2;
pub(crate) const SSH_FXP_OPEN: u8 = 3;
pub(crate) const SSH_FXP_CLOSE: u8 = 4;
pub(crate) const SSH_FXP_READ: u8 = 5;
pub(crate) const SSH_FXP_WRITE: u8 = 6;
pub(crate) const SSH_FXP_LSTAT: u8 = 7;
pub(crate) const SSH_FXP_FSTAT: u8 = 8;
pub(crate) const SSH_FXP_SETSTAT: u8 = 9;
pub(crate) const SSH_FXP_FSETSTAT: u8 = 10;
pub(crate) const SSH_FXP_OPENDIR: u8 = 11;
pub(crate) const SSH_FXP_READDIR: u8 = 12;
pub(crate) const SSH_FXP_REMOVE: u8 = 13;
pub(crate) const SSH_FXP_MKDIR: u8 = 14;
pub(crate) const SSH_FXP_RMDIR: u8 = 15;
pub(crate) const SSH_FXP_REALPATH: u8 = 16;
pub(crate) const SSH_FXP_STAT: u8 = 17;
pub(crate) const SSH_FXP_RENAME: u8 = 18;
pub(crate) const SSH_FXP_READLINK: u8 = 19;
pub(crate) const SSH_FXP_SYMLINK: u8 = 20;
pub(crate) const SSH_FXP_LINK: u8 = 21;
pub(crate) const SSH_FXP_BLOCK: u8 = 22;
pub(crate) const SSH_FXP_UNBLOCK: u8 = 23;

pub(crate) const SSH_FXP_STATUS: u8 = 101;
pub(crate) const SSH_FXP_HANDLE: u8 = 102;
pub(crate) const SSH_FXP_DATA: u8 = 103;
pub(crate) const SSH_FXP_NAME: u8 = 104;
pub(crate) const SSH_FXP_ATTRS: u8 = 105;

pub(crate) const SSH_FXP_EXTENDED: u8 = 200;
pub(crate) const SSH_FXP_EXTENDED_REPLY: u8 = 201;

/// `SSH_FXP_RENAME` flag bits (version 5 and later).
pub(crate) const SSH_FXF_RENAME_OVERWRITE: u32 = 0x1;
pub(crate) const SSH_FXF_RENAME_ATOMIC: u32 = 0x2;

/// `SSH_FXP_REALPATH` control bytes (version 6).
pub(crate) const SSH_FXP_REALPATH_NO_CHECK: u8 = 1;
pub(crate) const SSH_FXP_REALPATH_STAT_IF: u8 = 2;
pub(crate) const SSH_FXP_REALPATH_STAT_ALWAYS: u8 = 3;

/// Checked byte-level accessors over a packet payload.
pub(crate) trait TryBuf {
    fn try_get_u8(&mut self) -> Result<u8>;
    fn try_get_u32(&mut self) -> Result<u32>;
    fn try_get_u64(&mut self) -> Result<u64>;
    fn try_get_bytes(&mut self) -> Result<Bytes>;
    fn try_get_string(&mut self) -> Result<String>;
}

impl TryBuf for Bytes {
    fn try_get_u8(&mut self) -> Result<u8> {
        (self.remaining() >= 1)
            .then(|| self.get_u8())
            .ok_or(Error::BadMessage)
    }

    fn try_get_u32(&mut self) -> Result<u32> {
        (self.remaining() >= 4)
            .then(|| self.get_u32())
            .ok_or(Error::BadMessage)
    }

    fn try_get_u64(&mut self) -> Result<u64> {
        (self.remaining() >= 8)
            .then(|| self.get_u64())
            .ok_or(Error::BadMessage)
    }

    fn try_get_bytes(&mut self) -> Result<Bytes> {
        let len = TryBuf::try_get_u32(self)? as usize;

        (self.remaining() >= len)
            .then(|| self.copy_to_bytes(len))
            .ok_or(Error::BadMessage)
    }

    fn try_get_string(&mut self) -> Result<String> {
        let bytes = self.try_get_bytes()?;

        String::from_utf8(bytes.to_vec()).map_err(|_| Error::BadMessage)
    }
}

/// Length-prefixed string writer, the dual of [`TryBuf::try_get_bytes`].
pub(crate) trait PutString: BufMut {
    fn put_str(&mut self, s: &str) {
        self.put_bytes_field(s.as_bytes());
    }

    fn put_bytes_field(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.put_slice(bytes);
    }
}

impl<B: BufMut> PutString for B {}

/// A request decoded from the peer, already versioned; the variants
/// mirror the `SSH_FXP_*` request opcodes.
#[allow(missing_docs)]
#[derive(Debug)]
pub enum Request {
    Init {
        version: u32,
    },
    Open {
        id: u32,
        path: String,
        options: open::OpenOptions,
        attrs: Attrs,
    },
    Close {
        id: u32,
        handle: Bytes,
    },
    Read {
        id: u32,
        handle: Bytes,
        offset: u64,
        length: u32,
    },
    Write {
        id: u32,
        handle: Bytes,
        offset: u64,
        data: Bytes,
    },
    Lstat {
        id: u32,
        path: String,
    },
    Fstat {
        id: u32,
        handle: Bytes,
    },
    Setstat {
        id: u32,
        path: String,
        attrs: Attrs,
    },
    Fsetstat {
        id: u32,
        handle: Bytes,
        attrs: Attrs,
    },
    Opendir {
        id: u32,
        path: String,
    },
    Readdir {
        id: u32,
        handle: Bytes,
    },
    Remove {
        id: u32,
        path: String,
    },
    Mkdir {
        id: u32,
        path: String,
        attrs: Attrs,
    },
    Rmdir {
        id: u32,
        path: String,
    },
    Realpath {
        id: u32,
        path: String,
        control: Option<u8>,
        compose: Vec<String>,
    },
    Stat {
        id: u32,
        path: String,
    },
    Rename {
        id: u32,
        oldpath: String,
        newpath: String,
        overwrite: bool,
        atomic: bool,
    },
    Readlink {
        id: u32,
        path: String,
    },
    Symlink {
        id: u32,
        target: String,
        linkpath: String,
    },
    Link {
        id: u32,
        newpath: String,
        existingpath: String,
        symlink: bool,
    },
    Block {
        id: u32,
        handle: Bytes,
        offset: u64,
        length: u64,
        mask: u32,
    },
    Unblock {
        id: u32,
        handle: Bytes,
        offset: u64,
        length: u64,
    },
    Extended {
        id: u32,
        name: String,
        data: Bytes,
    },
}

impl Request {
    /// Decode a request packet's `body` (packet type included)
    /// according to the negotiated `version`.
    pub fn decode(version: u32, mut body: Bytes) -> Result<Self> {
        let kind = TryBuf::try_get_u8(&mut body)?;

        Ok(match kind {
            SSH_FXP_INIT => Self::Init {
                version: TryBuf::try_get_u32(&mut body)?,
            },
            SSH_FXP_OPEN => {
                let id = TryBuf::try_get_u32(&mut body)?;
                let path = body.try_get_string()?;
                let options = open::OpenOptions::decode(version, &mut body)?;
                let attrs = Attrs::decode(version, &mut body)?;

                Self::Open {
                    id,
                    path,
                    options,
                    attrs,
                }
            }
            SSH_FXP_CLOSE => Self::Close {
                id: TryBuf::try_get_u32(&mut body)?,
                handle: body.try_get_bytes()?,
            },
            SSH_FXP_READ => Self::Read {
                id: TryBuf::try_get_u32(&mut body)?,
                handle: body.try_get_bytes()?,
                offset: TryBuf::try_get_u64(&mut body)?,
                length: TryBuf::try_get_u32(&mut body)?,
            },
            SSH_FXP_WRITE => Self::Write {
                id: TryBuf::try_get_u32(&mut body)?,
                handle: body.try_get_bytes()?,
                offset: TryBuf::try_get_u64(&mut body)?,
                data: body.try_get_bytes()?,
            },
            SSH_FXP_LSTAT => {
                let id = TryBuf::try_get_u32(&mut body)?;
                let path = body.try_get_string()?;

                // Versions 4+ append the desired-attribute flags,
                // which a server is free to disregard.
                Self::Lstat { id, path }
            }
            SSH_FXP_FSTAT => Self::Fstat {
                id: TryBuf::try_get_u32(&mut body)?,
                handle: body.try_get_bytes()?,
            },
            SSH_FXP_SETSTAT => {
                let id = TryBuf::try_get_u32(&mut body)?;
                let path = body.try_get_string()?;
                let attrs = Attrs::decode(version, &mut body)?;

                Self::Setstat { id, path, attrs }
            }
            SSH_FXP_FSETSTAT => {
                let id = TryBuf::try_get_u32(&mut body)?;
                let handle = body.try_get_bytes()?;
                let attrs = Attrs::decode(version, &mut body)?;

                Self::Fsetstat { id, handle, attrs }
            }
            SSH_FXP_OPENDIR => Self::Opendir {
                id: TryBuf::try_get_u32(&mut body)?,
                path: body.try_get_string()?,
            },
            SSH_FXP_READDIR => Self::Readdir {
                id: TryBuf::try_get_u32(&mut body)?,
                handle: body.try_get_bytes()?,
            },
            SSH_FXP_REMOVE => Self::Remove {
                id: TryBuf::try_get_u32(&mut body)?,
                path: body.try_get_string()?,
            },
            SSH_FXP_MKDIR => {
                let id = TryBuf::try_get_u32(&mut body)?;
                let path = body.try_get_string()?;
                let attrs = Attrs::decode(version, &mut body)?;

                Self::Mkdir { id, path, attrs }
            }
            SSH_FXP_RMDIR => Self::Rmdir {
                id: TryBuf::try_get_u32(&mut body)?,
                path: body.try_get_string()?,
            },
            SSH_FXP_REALPATH => {
                let id = TryBuf::try_get_u32(&mut body)?;
                let path = body.try_get_string()?;

                let (control, compose) = if version >= 6 && body.remaining() > 0 {
                    let control = TryBuf::try_get_u8(&mut body)?;

                    let mut compose = Vec::new();
                    while body.remaining() > 0 {
                        compose.push(body.try_get_string()?);
                    }

                    (Some(control), compose)
                } else {
                    (None, Vec::new())
                };

                Self::Realpath {
                    id,
                    path,
                    control,
                    compose,
                }
            }
            SSH_FXP_STAT => {
                let id = TryBuf::try_get_u32(&mut body)?;
                let path = body.try_get_string()?;

                Self::Stat { id, path }
            }
            SSH_FXP_RENAME => {
                let id = TryBuf::try_get_u32(&mut body)?;
                let oldpath = body.try_get_string()?;
                let newpath = body.try_get_string()?;

                let flags = if version >= 5 { TryBuf::try_get_u32(&mut body)? } else { 0 };

                Self::Rename {
                    id,
                    oldpath,
                    newpath,
                    overwrite: flags & SSH_FXF_RENAME_OVERWRITE != 0,
                    atomic: flags & SSH_FXF_RENAME_ATOMIC != 0,
                }
            }
            SSH_FXP_READLINK => Self::Readlink {
                id: TryBuf::try_get_u32(&mut body)?,
                path: body.try_get_string()?,
            },
            SSH_FXP_SYMLINK => Self::Symlink {
                id: TryBuf::try_get_u32(&mut body)?,
                target: body.try_get_string()?,
                linkpath: body.try_get_string()?,
            },
            SSH_FXP_LINK if version >= 6 => Self::Link {
                id: TryBuf::try_get_u32(&mut body)?,
                newpath: body.try_get_string()?,
                existingpath: body.try_get_string()?,
                symlink: TryBuf::try_get_u8(&mut body)? != 0,
            },
            SSH_FXP_BLOCK if version >= 6 => Self::Block {
                id: TryBuf::try_get_u32(&mut body)?,
                handle: body.try_get_bytes()?,
                offset: TryBuf::try_get_u64(&mut body)?,
                length: TryBuf::try_get_u64(&mut body)?,
                mask: TryBuf::try_get_u32(&mut body)?,
            },
            SSH_FXP_UNBLOCK if version >= 6 => Self::Unblock {
                id: TryBuf::try_get_u32(&mut body)?,
                handle: body.try_get_bytes()?,
                offset: TryBuf::try_get_u64(&mut body)?,
                length: TryBuf::try_get_u64(&mut body)?,
            },
            SSH_FXP_EXTENDED => Self::Extended {
                id: TryBuf::try_get_u32(&mut body)?,
                name: body.try_get_string()?,
                data: body,
            },
            kind => return Err(Error::UnknownPacket(kind)),
        })
    }

    /// The request identifier echoed in the answer, absent on `INIT`.
    pub fn id(&self) -> Option<u32> {
        match self {
            Self::Init { .. } => None,
            Self::Open { id, .. }
            | Self::Close { id, .. }
            | Self::Read { id, .. }
            | Self::Write { id, .. }
            | Self::Lstat { id, .. }
            | Self::Fstat { id, .. }
            | Self::Setstat { id, .. }
            | Self::Fsetstat { id, .. }
            | Self::Opendir { id, .. }
            | Self::Readdir { id, .. }
            | Self::Remove { id, .. }
            | Self::Mkdir { id, .. }
            | Self::Rmdir { id, .. }
            | Self::Realpath { id, .. }
            | Self::Stat { id, .. }
            | Self::Rename { id, .. }
            | Self::Readlink { id, .. }
            | Self::Symlink { id, .. }
            | Self::Link { id, .. }
            | Self::Block { id, .. }
            | Self::Unblock { id, .. }
            | Self::Extended { id, .. } => Some(*id),
        }
    }
}

/// One entry of a `SSH_FXP_NAME` answer.
#[derive(Debug, Clone)]
pub struct NameEntry {
    /// The (possibly relative) file name.
    pub filename: String,

    /// The `ls -l`-style presentation line, on the wire up to
    /// version 5; version 6 dropped it.
    pub longname: String,

    /// The entry's attributes.
    pub attrs: Attrs,
}

/// A response to encode for the peer; the variants mirror the
/// `SSH_FXP_*` answer opcodes.
#[allow(missing_docs)]
#[derive(Debug)]
pub enum Response {
    Version {
        version: u32,
        extensions: Vec<(String, Bytes)>,
    },
    Status {
        id: u32,
        code: StatusCode,
        message: String,
    },
    Handle {
        id: u32,
        handle: Bytes,
    },
    Data {
        id: u32,
        data: Bytes,
    },
    Name {
        id: u32,
        entries: Vec<NameEntry>,
        end_of_list: bool,
    },
    Attrs {
        id: u32,
        attrs: Attrs,
    },
    ExtendedReply {
        id: u32,
        data: Bytes,
    },
}

impl Response {
    /// A `SSH_FXP_STATUS` answer with the code's canonical message.
    pub fn status(id: u32, code: StatusCode) -> Self {
        Self::Status {
            id,
            code,
            message: code.message().into(),
        }
    }

    /// Encode the response (packet type included, length prefix
    /// excluded) according to the negotiated `version`.
    pub fn encode(&self, version: u32) -> Bytes {
        let mut buf = BytesMut::new();

        match self {
            Self::Version {
                version: chosen,
                extensions,
            } => {
                buf.put_u8(SSH_FXP_VERSION);
                buf.put_u32(*chosen);

                for (name, data) in extensions {
                    buf.put_str(name);
                    buf.put_bytes_field(data);
                }
            }
            Self::Status { id, code, message } => {
                buf.put_u8(SSH_FXP_STATUS);
                buf.put_u32(*id);
                buf.put_u32(code.clamp(version) as u32);
                buf.put_str(message);
                buf.put_str("en-US");
            }
            Self::Handle { id, handle } => {
                buf.put_u8(SSH_FXP_HANDLE);
                buf.put_u32(*id);
                buf.put_bytes_field(handle);
            }
            Self::Data { id, data } => {
                buf.put_u8(SSH_FXP_DATA);
                buf.put_u32(*id);
                buf.put_bytes_field(data);
            }
            Self::Name {
                id,
                entries,
                end_of_list,
            } => {
                buf.put_u8(SSH_FXP_NAME);
                buf.put_u32(*id);
                buf.put_u32(entries.len() as u32);

                for entry in entries {
                    buf.put_str(&entry.filename);

                    if version <= 5 {
                        buf.put_str(&entry.longname);
                    }

                    entry.attrs.encode(version, &mut buf);
                }

                if version >= 6 {
                    buf.put_u8(u8::from(*end_of_list));
                }
            }
            Self::Attrs { id, attrs } => {
                buf.put_u8(SSH_FXP_ATTRS);
                buf.put_u32(*id);
                attrs.encode(version, &mut buf);
            }
            Self::ExtendedReply { id, data } => {
                buf.put_u8(SSH_FXP_EXTENDED_REPLY);
                buf.put_u32(*id);
                buf.put_slice(data);
            }
        }

        buf.freeze()
    }
}

/// Read one length-prefixed packet body from the `reader`, `None` on
/// a clean end-of-stream.
pub async fn read_packet(reader: &mut (impl AsyncRead + Unpin)) -> Result<Option<Bytes>> {
    let mut prefix = [0u8; 4];

    match reader.read_exact(&mut prefix).await {
        Ok(()) => (),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }

    let length = u32::from_be_bytes(prefix) as usize;
    if length == 0 || length > PACKET_CEILING {
        return Err(Error::PacketTooLarge(length));
    }

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;

    Ok(Some(Bytes::from(body)))
}

/// Write one length-prefixed packet `body` to the `writer`.
pub async fn write_packet(
    writer: &mut (impl AsyncWrite + Unpin),
    body: Bytes,
) -> Result<()> {
    let mut packet = BytesMut::with_capacity(4 + body.len());
    packet.put_u32(body.len() as u32);
    packet.put_slice(&body);

    writer.write_all(&packet).await?;
    writer.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[test]
    fn it_decodes_an_init() {
        let mut body = BytesMut::new();
        body.put_u8(SSH_FXP_INIT);
        body.put_u32(6);

        let request = Request::decode(3, body.freeze()).expect("decode failed");
        assert!(matches!(request, Request::Init { version: 6 }));
    }

    #[rstest]
    #[case(3)]
    #[case(6)]
    fn it_decodes_a_read(#[case] version: u32) {
        let mut body = BytesMut::new();
        body.put_u8(SSH_FXP_READ);
        body.put_u32(42);
        body.put_bytes_field(b"hndl");
        body.put_u64(0x1000);
        body.put_u32(0x4000);

        let request = Request::decode(version, body.freeze()).expect("decode failed");
        let Request::Read {
            id,
            handle,
            offset,
            length,
        } = request
        else {
            panic!("Decoded the wrong request: {request:?}")
        };

        assert_eq!(id, 42);
        assert_eq!(&*handle, b"hndl");
        assert_eq!(offset, 0x1000);
        assert_eq!(length, 0x4000);
    }

    #[test]
    fn it_rejects_version_gated_packets() {
        let mut body = BytesMut::new();
        body.put_u8(SSH_FXP_BLOCK);
        body.put_u32(7);
        body.put_bytes_field(b"hndl");
        body.put_u64(0);
        body.put_u64(16);
        body.put_u32(0);

        assert!(matches!(
            Request::decode(5, body.freeze()),
            Err(Error::UnknownPacket(SSH_FXP_BLOCK)),
        ));
    }

    #[test]
    fn it_encodes_a_version_dependent_name() {
        let entry_longname = "-rw-r--r--   1 user user       13 Jan  1 00:00 file.txt";
        let entry = NameEntry {
            filename: "file.txt".into(),
            longname: entry_longname.into(),
            attrs: Attrs::default(),
        };

        let response = Response::Name {
            id: 1,
            entries: vec![entry],
            end_of_list: true,
        };

        let v3 = response.encode(3);
        let v5 = response.encode(5);
        let v6 = response.encode(6);

        // The long name stays on the wire through version 5, the
        // end-of-list marker exists from version 6 on.
        assert!(v3.len() > v6.len());
        assert!(v5.len() > v6.len());
        assert_eq!(v6.last(), Some(&1));

        let needle = entry_longname.as_bytes();
        assert!(v5.windows(needle.len()).any(|window| window == needle));
        assert!(!v6.windows(needle.len()).any(|window| window == needle));
    }

    #[test]
    fn it_truncates_cleanly() {
        let mut body = BytesMut::new();
        body.put_u8(SSH_FXP_CLOSE);
        body.put_u32(1);
        body.put_u32(100); // length prefix far past the payload

        assert!(matches!(
            Request::decode(3, body.freeze()),
            Err(Error::BadMessage),
        ));
    }
}
