//! The versioned file-attribute block (`ATTRS`) and its translation
//! from filesystem metadata.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{BufMut, Bytes, BytesMut};

use super::{PutString, TryBuf};
use crate::Result;

const SSH_FILEXFER_ATTR_SIZE: u32 = 0x1;
const SSH_FILEXFER_ATTR_UIDGID: u32 = 0x2;
const SSH_FILEXFER_ATTR_PERMISSIONS: u32 = 0x4;
const SSH_FILEXFER_ATTR_ACMODTIME: u32 = 0x8;
const SSH_FILEXFER_ATTR_ACCESSTIME: u32 = 0x8;
const SSH_FILEXFER_ATTR_CREATETIME: u32 = 0x10;
const SSH_FILEXFER_ATTR_MODIFYTIME: u32 = 0x20;
const SSH_FILEXFER_ATTR_ACL: u32 = 0x40;
const SSH_FILEXFER_ATTR_OWNERGROUP: u32 = 0x80;
const SSH_FILEXFER_ATTR_SUBSECOND_TIMES: u32 = 0x100;
const SSH_FILEXFER_ATTR_EXTENDED: u32 = 0x8000_0000;

/// The file type byte carried by versions 4 and later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileType {
    /// `SSH_FILEXFER_TYPE_REGULAR`.
    Regular = 1,

    /// `SSH_FILEXFER_TYPE_DIRECTORY`.
    Directory = 2,

    /// `SSH_FILEXFER_TYPE_SYMLINK`.
    Symlink = 3,

    /// `SSH_FILEXFER_TYPE_SPECIAL`.
    Special = 4,

    /// `SSH_FILEXFER_TYPE_UNKNOWN`.
    Unknown = 5,
}

impl FileType {
    fn from_byte(byte: u8) -> Self {
        match byte {
            1 => Self::Regular,
            2 => Self::Directory,
            3 => Self::Symlink,
            4 | 6..=9 => Self::Special,
            _ => Self::Unknown,
        }
    }
}

impl From<&std::fs::FileType> for FileType {
    fn from(kind: &std::fs::FileType) -> Self {
        if kind.is_dir() {
            Self::Directory
        } else if kind.is_symlink() {
            Self::Symlink
        } else if kind.is_file() {
            Self::Regular
        } else {
            Self::Special
        }
    }
}

/// The closed set of file attributes the protocol can carry, each
/// optional; what cannot be expressed in the negotiated version is
/// simply not encoded.
#[derive(Debug, Clone, Default)]
pub struct Attrs {
    /// File type, only on the wire in versions 4 and later.
    pub kind: Option<FileType>,

    /// Size in bytes.
    pub size: Option<u64>,

    /// Numeric owner and group, the version 3 representation.
    pub uid_gid: Option<(u32, u32)>,

    /// Owner and group names, the version 4+ representation.
    pub owner_group: Option<(String, String)>,

    /// POSIX permission bits.
    pub permissions: Option<u32>,

    /// Last access time, in seconds since the epoch.
    pub accessed: Option<u64>,

    /// Creation time, in seconds since the epoch (version 4+).
    pub created: Option<u64>,

    /// Last modification time, in seconds since the epoch.
    pub modified: Option<u64>,

    /// Unrecognized `name => data` extended attributes, routed
    /// through the unsupported-attribute policy.
    pub extended: Vec<(String, Bytes)>,
}

impl Attrs {
    /// Gather the attributes of filesystem `metadata`.
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        let timestamp = |time: std::io::Result<SystemTime>| {
            time.ok()
                .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
                .map(|since| since.as_secs())
        };

        Self {
            kind: Some(FileType::from(&metadata.file_type())),
            size: Some(metadata.len()),
            uid_gid: Some((metadata.uid(), metadata.gid())),
            owner_group: None,
            permissions: Some(metadata.mode()),
            accessed: timestamp(metadata.accessed()),
            created: timestamp(metadata.created()),
            modified: timestamp(metadata.modified()),
            extended: Vec::new(),
        }
    }

    /// The `SystemTime` equivalents of the carried timestamps.
    pub fn times(&self) -> (Option<SystemTime>, Option<SystemTime>) {
        let time = |secs: Option<u64>| secs.map(|secs| UNIX_EPOCH + Duration::from_secs(secs));

        (time(self.accessed), time(self.modified))
    }

    /// Decode an attribute block according to the negotiated `version`.
    pub fn decode(version: u32, buf: &mut Bytes) -> Result<Self> {
        let flags = buf.try_get_u32()?;
        let mut attrs = Self::default();

        if version >= 4 {
            attrs.kind = Some(FileType::from_byte(buf.try_get_u8()?));
        }

        if flags & SSH_FILEXFER_ATTR_SIZE != 0 {
            attrs.size = Some(buf.try_get_u64()?);
        }

        if version <= 3 {
            if flags & SSH_FILEXFER_ATTR_UIDGID != 0 {
                attrs.uid_gid = Some((buf.try_get_u32()?, buf.try_get_u32()?));
            }
        } else if flags & SSH_FILEXFER_ATTR_OWNERGROUP != 0 {
            attrs.owner_group = Some((buf.try_get_string()?, buf.try_get_string()?));
        }

        if flags & SSH_FILEXFER_ATTR_PERMISSIONS != 0 {
            attrs.permissions = Some(buf.try_get_u32()?);
        }

        if version <= 3 {
            if flags & SSH_FILEXFER_ATTR_ACMODTIME != 0 {
                attrs.accessed = Some(buf.try_get_u32()? as u64);
                attrs.modified = Some(buf.try_get_u32()? as u64);
            }
        } else {
            let mut timestamp = |buf: &mut Bytes, flag: u32| -> Result<Option<u64>> {
                if flags & flag == 0 {
                    return Ok(None);
                }

                let seconds = buf.try_get_u64()?;
                if flags & SSH_FILEXFER_ATTR_SUBSECOND_TIMES != 0 {
                    let _nseconds = buf.try_get_u32()?;
                }

                Ok(Some(seconds))
            };

            attrs.accessed = timestamp(buf, SSH_FILEXFER_ATTR_ACCESSTIME)?;
            attrs.created = timestamp(buf, SSH_FILEXFER_ATTR_CREATETIME)?;
            attrs.modified = timestamp(buf, SSH_FILEXFER_ATTR_MODIFYTIME)?;

            if flags & SSH_FILEXFER_ATTR_ACL != 0 {
                let acl = buf.try_get_bytes()?;
                attrs.extended.push(("acl".into(), acl));
            }
        }

        if flags & SSH_FILEXFER_ATTR_EXTENDED != 0 {
            let count = buf.try_get_u32()?;

            for _ in 0..count {
                let name = buf.try_get_string()?;
                let data = buf.try_get_bytes()?;

                attrs.extended.push((name, data));
            }
        }

        Ok(attrs)
    }

    /// Encode the attribute block according to the negotiated `version`.
    pub fn encode(&self, version: u32, buf: &mut BytesMut) {
        let mut flags = 0u32;

        if self.size.is_some() {
            flags |= SSH_FILEXFER_ATTR_SIZE;
        }
        if self.permissions.is_some() {
            flags |= SSH_FILEXFER_ATTR_PERMISSIONS;
        }

        if version <= 3 {
            if self.uid_gid.is_some() {
                flags |= SSH_FILEXFER_ATTR_UIDGID;
            }
            if self.accessed.is_some() && self.modified.is_some() {
                flags |= SSH_FILEXFER_ATTR_ACMODTIME;
            }
        } else {
            if self.owner_group.is_some() {
                flags |= SSH_FILEXFER_ATTR_OWNERGROUP;
            }
            if self.accessed.is_some() {
                flags |= SSH_FILEXFER_ATTR_ACCESSTIME;
            }
            if self.created.is_some() {
                flags |= SSH_FILEXFER_ATTR_CREATETIME;
            }
            if self.modified.is_some() {
                flags |= SSH_FILEXFER_ATTR_MODIFYTIME;
            }
        }

        buf.put_u32(flags);

        if version >= 4 {
            buf.put_u8(self.kind.unwrap_or(FileType::Unknown) as u8);
        }

        if let Some(size) = self.size {
            buf.put_u64(size);
        }

        if version <= 3 {
            if let Some((uid, gid)) = self.uid_gid {
                buf.put_u32(uid);
                buf.put_u32(gid);
            }
        } else if let Some((owner, group)) = &self.owner_group {
            buf.put_str(owner);
            buf.put_str(group);
        }

        if let Some(permissions) = self.permissions {
            buf.put_u32(permissions);
        }

        if version <= 3 {
            if let (Some(accessed), Some(modified)) = (self.accessed, self.modified) {
                buf.put_u32(accessed as u32);
                buf.put_u32(modified as u32);
            }
        } else {
            if let Some(accessed) = self.accessed {
                buf.put_u64(accessed);
            }
            if let Some(created) = self.created {
                buf.put_u64(created);
            }
            if let Some(modified) = self.modified {
                buf.put_u64(modified);
            }
        }
    }

    /// The `ls -l`-style presentation line of version 3 `NAME` entries.
    pub fn longname(&self, filename: &str) -> String {
        let mode = self.permissions.unwrap_or(0);

        let kind = match self.kind {
            Some(FileType::Directory) => 'd',
            Some(FileType::Symlink) => 'l',
            Some(FileType::Special) => 'c',
            _ => '-',
        };

        let triplet = |shift: u32| {
            let bits = (mode >> shift) & 0o7;

            format!(
                "{}{}{}",
                if bits & 0o4 != 0 { 'r' } else { '-' },
                if bits & 0o2 != 0 { 'w' } else { '-' },
                if bits & 0o1 != 0 { 'x' } else { '-' },
            )
        };

        let (uid, gid) = self.uid_gid.unwrap_or((0, 0));

        format!(
            "{kind}{}{}{}   1 {uid:<8} {gid:<8} {:>8} Jan  1 00:00 {filename}",
            triplet(6),
            triplet(3),
            triplet(0),
            self.size.unwrap_or(0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[rstest]
    #[case(3)]
    #[case(4)]
    #[case(6)]
    fn it_round_trips_through_both_layouts(#[case] version: u32) {
        let attrs = Attrs {
            kind: Some(FileType::Regular),
            size: Some(0x1234),
            uid_gid: Some((1000, 1000)),
            permissions: Some(0o644),
            accessed: Some(1_700_000_000),
            modified: Some(1_700_000_100),
            ..Default::default()
        };

        let mut buf = BytesMut::new();
        attrs.encode(version, &mut buf);

        let decoded =
            Attrs::decode(version, &mut buf.freeze()).expect("decoding the attributes failed");

        assert_eq!(decoded.size, attrs.size);
        assert_eq!(decoded.permissions, attrs.permissions);
        assert_eq!(decoded.accessed, attrs.accessed);
        assert_eq!(decoded.modified, attrs.modified);

        if version <= 3 {
            assert_eq!(decoded.uid_gid, attrs.uid_gid);
        } else {
            assert_eq!(decoded.kind, attrs.kind);
        }
    }

    #[test]
    fn it_renders_a_longname() {
        let attrs = Attrs {
            kind: Some(FileType::Regular),
            size: Some(13),
            permissions: Some(0o644),
            ..Default::default()
        };

        let longname = attrs.longname("file.txt");

        assert!(longname.starts_with("-rw-r--r--"));
        assert!(longname.ends_with("file.txt"));
    }
}
