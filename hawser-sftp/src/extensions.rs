//! The `SSH_FXP_EXTENDED` request dispatch: the `secsh-filexfer`
//! hashing and copying extensions, the OpenSSH `fsync` and the
//! `version-select` re-negotiation.

use std::{fs, os::unix::fs::FileExt, path::Path};

use bytes::{BufMut, Bytes, BytesMut};
use digest::Digest;
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::{
    handles::Handle,
    subsystem::Engine,
    wire::{PutString, Response, StatusCode, TryBuf},
    Error, Result, VERSION_MAX, VERSION_MIN,
};

/// Per the extension draft, the quick-check hash covers at most the
/// first 2048 bytes of the requested range.
const QUICK_CHECK_SPAN: u64 = 2048;

impl Engine {
    pub(crate) fn extended(&mut self, id: u32, name: String, data: Bytes) -> Result<Response> {
        if name == "version-select" {
            return self.version_select(id, data);
        }

        let response = match name.as_str() {
            "copy-file" => self.copy_file(id, data),
            "copy-data" => self.copy_data(id, data),
            "md5-hash" => self.md5_hash(id, data, false),
            "md5-hash-handle" => self.md5_hash(id, data, true),
            "check-file-name" => self.check_file(id, data, false),
            "check-file-handle" => self.check_file(id, data, true),
            "space-available" => self.space_available(id, data),
            "fsync@openssh.com" if self.config.openssh_extensions => self.fsync(id, data),

            // Acknowledged, intentionally unimplemented.
            "text-seek" => Err(StatusCode::OpUnsupported),

            _ => {
                tracing::debug!("Unknown extended request `{name}`");

                Err(StatusCode::OpUnsupported)
            }
        };

        Ok(response.unwrap_or_else(|code| Response::status(id, code)))
    }

    /// `version-select` must be the very first request of the session
    /// and name a version we advertised; any violation disconnects.
    fn version_select(&mut self, id: u32, mut data: Bytes) -> Result<Response> {
        let selected = data
            .try_get_string()
            .map_err(|_| Error::VersionSelect("malformed version string"))?;

        let version: u32 = selected
            .parse()
            .map_err(|_| Error::VersionSelect("unparseable version"))?;

        if !(VERSION_MIN..=VERSION_MAX).contains(&version) || version > self.version {
            return Err(Error::VersionSelect("version was not advertised"));
        }

        tracing::debug!("Peer selected protocol version {version}");
        self.version = version;

        Ok(Response::status(id, StatusCode::Ok))
    }

    /// Resolve a file either from a handle identifier or from a path,
    /// the only difference between the `-handle` and `-name` variants.
    fn resolve_file(&mut self, locator: Bytes, by_handle: bool) -> Result<fs::File, StatusCode> {
        if by_handle {
            let Handle::File { file, .. } = self.handles.file_mut(&locator)? else {
                unreachable!("`file_mut` only yields file handles")
            };

            Ok(file.try_clone()?)
        } else {
            let path = String::from_utf8(locator.to_vec())
                .map_err(|_| StatusCode::InvalidParameter)?;

            Ok(fs::File::open(path)?)
        }
    }

    fn copy_file(&mut self, id: u32, mut data: Bytes) -> Result<Response, StatusCode> {
        let source = data.try_get_string().map_err(|_| StatusCode::BadMessage)?;
        let destination = data.try_get_string().map_err(|_| StatusCode::BadMessage)?;
        let overwrite = data.try_get_u8().map_err(|_| StatusCode::BadMessage)? != 0;

        if !overwrite && fs::symlink_metadata(&destination).is_ok() {
            return Err(StatusCode::FileAlreadyExists);
        }

        fs::copy(&source, &destination)?;

        Ok(Response::status(id, StatusCode::Ok))
    }

    fn copy_data(&mut self, id: u32, mut data: Bytes) -> Result<Response, StatusCode> {
        let read_handle = data.try_get_bytes().map_err(|_| StatusCode::BadMessage)?;
        let read_offset = data.try_get_u64().map_err(|_| StatusCode::BadMessage)?;
        let read_length = data.try_get_u64().map_err(|_| StatusCode::BadMessage)?;
        let write_handle = data.try_get_bytes().map_err(|_| StatusCode::BadMessage)?;
        let write_offset = data.try_get_u64().map_err(|_| StatusCode::BadMessage)?;

        let (source, length) = {
            let Handle::File { file, .. } = self.handles.file_mut(&read_handle)? else {
                unreachable!("`file_mut` only yields file handles")
            };

            let length = match read_length {
                0 => file.metadata()?.len().saturating_sub(read_offset),
                length => length,
            };

            (file.try_clone()?, length)
        };

        if read_handle == write_handle {
            // Overlapping ranges on the same handle are refused.
            let read_end = read_offset.saturating_add(length);
            let write_end = write_offset.saturating_add(length);

            if read_offset < write_end && write_offset < read_end {
                return Err(StatusCode::InvalidParameter);
            }
        }

        let Handle::File {
            file: destination, ..
        } = self.handles.file_mut(&write_handle)?
        else {
            unreachable!("`file_mut` only yields file handles")
        };

        let mut copied = 0u64;
        let mut buffer = vec![0u8; 0x8000];

        while copied < length {
            let span = buffer.len().min((length - copied) as usize);
            let count = source.read_at(&mut buffer[..span], read_offset + copied)?;

            if count == 0 {
                break;
            }

            destination.write_all_at(&buffer[..count], write_offset + copied)?;
            copied += count as u64;
        }

        Ok(Response::status(id, StatusCode::Ok))
    }

    /// The `md5-hash[-handle]` extension with its quick-check
    /// optimization: when the caller's quick-check hash does not match
    /// the hash of the range's prefix, an empty hash is returned
    /// instead of reading the whole range.
    fn md5_hash(&mut self, id: u32, mut data: Bytes, by_handle: bool) -> Result<Response, StatusCode> {
        let locator = data.try_get_bytes().map_err(|_| StatusCode::BadMessage)?;
        let offset = data.try_get_u64().map_err(|_| StatusCode::BadMessage)?;
        let length = data.try_get_u64().map_err(|_| StatusCode::BadMessage)?;
        let quick_check = data.try_get_bytes().map_err(|_| StatusCode::BadMessage)?;

        let file = self.resolve_file(locator, by_handle)?;

        let length = match length {
            0 => file.metadata()?.len().saturating_sub(offset),
            length => length,
        };

        let prefix = Self::digest_range::<Md5>(&file, offset, length.min(QUICK_CHECK_SPAN))?;

        let hash: Bytes = if quick_check.as_ref() != prefix.as_slice() {
            Bytes::new()
        } else if length <= QUICK_CHECK_SPAN {
            prefix.into()
        } else {
            Self::digest_range::<Md5>(&file, offset, length)?.into()
        };

        let mut reply = BytesMut::new();
        reply.put_bytes_field(&hash);

        Ok(Response::ExtendedReply {
            id,
            data: reply.freeze(),
        })
    }

    fn digest_range<D: Digest>(
        file: &fs::File,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>, StatusCode> {
        let mut hasher = D::new();
        let mut buffer = vec![0u8; 0x8000];
        let mut hashed = 0u64;

        while hashed < length {
            let span = buffer.len().min((length - hashed) as usize);
            let count = file.read_at(&mut buffer[..span], offset + hashed)?;

            if count == 0 {
                break;
            }

            hasher.update(&buffer[..count]);
            hashed += count as u64;
        }

        Ok(hasher.finalize().to_vec())
    }

    /// The `check-file-{handle,name}` extension: the first supported
    /// algorithm from the caller's list, hashes streamed per block.
    fn check_file(&mut self, id: u32, mut data: Bytes, by_handle: bool) -> Result<Response, StatusCode> {
        let locator = data.try_get_bytes().map_err(|_| StatusCode::BadMessage)?;
        let algorithms = data.try_get_string().map_err(|_| StatusCode::BadMessage)?;
        let offset = data.try_get_u64().map_err(|_| StatusCode::BadMessage)?;
        let length = data.try_get_u64().map_err(|_| StatusCode::BadMessage)?;
        let block_size = data.try_get_u32().map_err(|_| StatusCode::BadMessage)?;

        let algorithm = algorithms
            .split(',')
            .find(|name| matches!(*name, "md5" | "sha1" | "sha256" | "sha512"))
            .ok_or(StatusCode::OpUnsupported)?
            .to_owned();

        let file = self.resolve_file(locator, by_handle)?;

        let length = match length {
            0 => file.metadata()?.len().saturating_sub(offset),
            length => length,
        };

        let mut reply = BytesMut::new();
        reply.put_str(&algorithm);

        let digest = |file: &fs::File, offset, span| -> Result<Vec<u8>, StatusCode> {
            match algorithm.as_str() {
                "md5" => Self::digest_range::<Md5>(file, offset, span),
                "sha1" => Self::digest_range::<Sha1>(file, offset, span),
                "sha256" => Self::digest_range::<Sha256>(file, offset, span),
                "sha512" => Self::digest_range::<Sha512>(file, offset, span),
                _ => Err(StatusCode::OpUnsupported),
            }
        };

        if block_size == 0 {
            reply.put_slice(&digest(&file, offset, length)?);
        } else {
            let mut hashed = 0u64;

            while hashed < length {
                let span = (length - hashed).min(block_size as u64);
                reply.put_slice(&digest(&file, offset + hashed, span)?);

                hashed += span;
            }
        }

        Ok(Response::ExtendedReply {
            id,
            data: reply.freeze(),
        })
    }

    fn space_available(&mut self, id: u32, mut data: Bytes) -> Result<Response, StatusCode> {
        let path = data.try_get_string().map_err(|_| StatusCode::BadMessage)?;

        // Probe the path first so missing directories answer with the
        // proper status instead of a statvfs failure.
        fs::metadata(&path)?;

        let stats = statvfs(Path::new(&path))?;

        let mut reply = BytesMut::new();
        reply.put_u64(stats.blocks.saturating_mul(stats.fragment_size));
        reply.put_u64(stats.blocks_free.saturating_mul(stats.fragment_size));
        reply.put_u64(stats.blocks_available.saturating_mul(stats.fragment_size));
        reply.put_u64(stats.blocks_available.saturating_mul(stats.fragment_size));
        reply.put_u32(stats.fragment_size as u32);

        Ok(Response::ExtendedReply {
            id,
            data: reply.freeze(),
        })
    }

    fn fsync(&mut self, id: u32, mut data: Bytes) -> Result<Response, StatusCode> {
        let handle = data.try_get_bytes().map_err(|_| StatusCode::BadMessage)?;

        let Handle::File { file, .. } = self.handles.file_mut(&handle)? else {
            unreachable!("`file_mut` only yields file handles")
        };

        file.sync_all()?;

        Ok(Response::status(id, StatusCode::Ok))
    }
}

struct FilesystemStats {
    fragment_size: u64,
    blocks: u64,
    blocks_free: u64,
    blocks_available: u64,
}

fn statvfs(path: &Path) -> Result<FilesystemStats, StatusCode> {
    use std::os::unix::ffi::OsStrExt;

    let path = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| StatusCode::InvalidParameter)?;

    let mut stats = std::mem::MaybeUninit::<libc::statvfs>::uninit();

    // SAFETY: `path` is a valid NUL-terminated string and `stats` is
    // sized for the out-parameter `statvfs` writes on success.
    let result = unsafe { libc::statvfs(path.as_ptr(), stats.as_mut_ptr()) };
    if result != 0 {
        return Err(StatusCode::from_io_error(&std::io::Error::last_os_error()));
    }

    // SAFETY: a zero return from `statvfs` guarantees initialization.
    let stats = unsafe { stats.assume_init() };

    Ok(FilesystemStats {
        fragment_size: stats.f_frsize as u64,
        blocks: stats.f_blocks as u64,
        blocks_free: stats.f_bfree as u64,
        blocks_available: stats.f_bavail as u64,
    })
}
