//! Translation of the versioned `SSH_FXP_OPEN` parameters (version 3
//! `pflags`, version 5+ ACE4 access mask and disposition flags) into
//! portable open options.

use bytes::Bytes;

use super::TryBuf;
use crate::Result;

// Version 3 `pflags` bits.
const SSH_FXF_READ: u32 = 0x1;
const SSH_FXF_WRITE: u32 = 0x2;
const SSH_FXF_APPEND: u32 = 0x4;
const SSH_FXF_CREAT: u32 = 0x8;
const SSH_FXF_TRUNC: u32 = 0x10;
const SSH_FXF_EXCL: u32 = 0x20;

// Version 5+ ACE4 access-mask bits.
const ACE4_READ_DATA: u32 = 0x1;
const ACE4_WRITE_DATA: u32 = 0x2;
const ACE4_APPEND_DATA: u32 = 0x4;

// Version 5+ disposition field, the low three bits of `flags`.
const SSH_FXF_ACCESS_DISPOSITION: u32 = 0x7;
const SSH_FXF_CREATE_NEW: u32 = 0x0;
const SSH_FXF_CREATE_TRUNCATE: u32 = 0x1;
const SSH_FXF_OPEN_EXISTING: u32 = 0x2;
const SSH_FXF_OPEN_OR_CREATE: u32 = 0x3;
const SSH_FXF_TRUNCATE_EXISTING: u32 = 0x4;

// Version 5+ modifier bits.
const SSH_FXF_APPEND_DATA: u32 = 0x8;
const SSH_FXF_APPEND_DATA_ATOMIC: u32 = 0x10;

/// The portable summary of an open request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
    /// Open for reading.
    pub read: bool,

    /// Open for writing.
    pub write: bool,

    /// Every write lands at the end of the file.
    pub append: bool,

    /// Create the file when it does not exist.
    pub create: bool,

    /// Create the file, failing when it already exists.
    pub create_new: bool,

    /// Truncate the file on open.
    pub truncate: bool,
}

impl OpenOptions {
    /// Decode the open parameters according to the negotiated `version`.
    pub fn decode(version: u32, buf: &mut Bytes) -> Result<Self> {
        if version <= 4 {
            Ok(Self::from_pflags(buf.try_get_u32()?))
        } else {
            let access = buf.try_get_u32()?;
            let flags = buf.try_get_u32()?;

            Ok(Self::from_access(access, flags))
        }
    }

    /// The version 3/4 `pflags` translation; no flags at all is read
    /// as an open for reading, matching deployed behavior.
    pub fn from_pflags(pflags: u32) -> Self {
        Self {
            read: pflags & SSH_FXF_READ != 0 || pflags & (SSH_FXF_READ | SSH_FXF_WRITE) == 0,
            write: pflags & SSH_FXF_WRITE != 0,
            append: pflags & SSH_FXF_APPEND != 0,
            create: pflags & SSH_FXF_CREAT != 0,
            create_new: pflags & SSH_FXF_CREAT != 0 && pflags & SSH_FXF_EXCL != 0,
            truncate: pflags & SSH_FXF_TRUNC != 0,
        }
    }

    /// The version 5+ ACE4 mask and disposition translation.
    pub fn from_access(access: u32, flags: u32) -> Self {
        let append = access & ACE4_APPEND_DATA != 0
            || flags & (SSH_FXF_APPEND_DATA | SSH_FXF_APPEND_DATA_ATOMIC) != 0;

        let (create, create_new, truncate) = match flags & SSH_FXF_ACCESS_DISPOSITION {
            SSH_FXF_CREATE_NEW => (true, true, false),
            SSH_FXF_CREATE_TRUNCATE => (true, false, true),
            SSH_FXF_OPEN_EXISTING => (false, false, false),
            SSH_FXF_OPEN_OR_CREATE => (true, false, false),
            SSH_FXF_TRUNCATE_EXISTING => (false, false, true),
            _ => (false, false, false),
        };

        Self {
            read: access & ACE4_READ_DATA != 0,
            write: access & ACE4_WRITE_DATA != 0 || append,
            append,
            create,
            create_new,
            truncate,
        }
    }

    /// The matching [`std::fs::OpenOptions`].
    pub fn to_fs(self) -> std::fs::OpenOptions {
        let mut options = std::fs::OpenOptions::new();

        options
            .read(self.read)
            .write(self.write && !self.append)
            .append(self.append)
            .truncate(self.truncate)
            .create(self.create && !self.create_new)
            .create_new(self.create_new);

        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_pflags_read_as_an_open_for_reading() {
        let options = OpenOptions::from_pflags(0);

        assert!(options.read);
        assert!(!options.write);
    }

    #[test]
    fn create_new_requires_both_creat_and_excl() {
        let options = OpenOptions::from_pflags(SSH_FXF_WRITE | SSH_FXF_CREAT | SSH_FXF_EXCL);

        assert!(options.create_new);
        assert!(options.write);
        assert!(!options.read);
    }

    #[test]
    fn ace4_append_implies_write() {
        let options = OpenOptions::from_access(ACE4_APPEND_DATA, SSH_FXF_OPEN_OR_CREATE);

        assert!(options.append);
        assert!(options.write);
        assert!(options.create);
    }
}
