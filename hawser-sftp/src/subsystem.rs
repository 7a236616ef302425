//! The request/response engine behind the `sftp` subsystem.

use std::{
    fs,
    os::unix::fs::{FileExt, OpenOptionsExt, PermissionsExt},
    path::{Component, Path, PathBuf},
};

use bytes::{BufMut, Bytes, BytesMut};
use futures::{AsyncRead, AsyncWrite};

use crate::{
    handles::{ByteRangeLock, Handle, HandleTable},
    wire::{
        self, open::OpenOptions, Attrs, NameEntry, PutString, Request, Response, StatusCode,
    },
    Error, Result, SftpConfig, UnsupportedAttributePolicy, VERSION_MAX, VERSION_MIN,
};

/// The `sftp` subsystem: a versioned request engine over a pair of
/// byte streams, one instance per session channel.
pub struct Subsystem {
    config: SftpConfig,
}

impl Subsystem {
    /// Create a subsystem instance with the provided configuration.
    pub fn new(config: SftpConfig) -> Self {
        Self { config }
    }

    /// Run the request loop until the peer closes its stream, or
    /// until a protocol violation tears the subsystem down.
    pub async fn run(
        self,
        mut reader: impl AsyncRead + Unpin,
        mut writer: impl AsyncWrite + Unpin,
    ) -> Result<()> {
        let mut engine = Engine::negotiate(self.config, &mut reader, &mut writer).await?;

        while let Some(body) = wire::read_packet(&mut reader).await? {
            let request = match Request::decode(engine.version, body.clone()) {
                Ok(request) => request,
                Err(Error::UnknownPacket(kind)) => {
                    tracing::warn!("Unknown packet type `{kind}` from the peer");

                    // Unknown requests still carry `id` right after the
                    // type byte, answer them politely when possible.
                    engine
                        .answer(&mut writer, Self::unsupported(&body))
                        .await?;
                    continue;
                }
                Err(err) => return Err(err),
            };

            tracing::trace!("<~- {request:?}");

            let response = engine.dispatch(request)?;
            engine.answer(&mut writer, response).await?;
        }

        tracing::debug!("Peer closed its stream, subsystem done");

        Ok(())
    }

    fn unsupported(body: &Bytes) -> Response {
        let id = match body.len() {
            len if len >= 5 => u32::from_be_bytes([body[1], body[2], body[3], body[4]]),
            _ => 0,
        };

        Response::status(id, StatusCode::OpUnsupported)
    }
}

/// The engine state: negotiated version, handle table and the
/// `version-select` one-shot window.
pub(crate) struct Engine {
    pub(crate) config: SftpConfig,
    pub(crate) version: u32,
    pub(crate) handles: HandleTable,

    /// `version-select` is honored on the first request only.
    may_select_version: bool,
}

impl Engine {
    async fn negotiate(
        config: SftpConfig,
        reader: &mut (impl AsyncRead + Unpin),
        writer: &mut (impl AsyncWrite + Unpin),
    ) -> Result<Self> {
        let Some(body) = wire::read_packet(reader).await? else {
            return Err(Error::NoInit);
        };

        let Request::Init { version: client } = Request::decode(VERSION_MIN, body)? else {
            return Err(Error::NoInit);
        };

        let ceiling = config.version.clamp(VERSION_MIN, VERSION_MAX);
        if client < VERSION_MIN {
            return Err(Error::VersionNegotiation);
        }

        let version = client.min(ceiling);

        tracing::debug!("Negotiated protocol version {version} (client offered {client})");

        let mut engine = Self {
            handles: HandleTable::new(&config),
            config,
            version,
            may_select_version: true,
        };

        let response = Response::Version {
            version,
            extensions: engine.extensions(),
        };
        engine.answer(writer, response).await?;

        Ok(engine)
    }

    fn extensions(&self) -> Vec<(String, Bytes)> {
        let mut extensions = vec![
            ("versions".into(), Bytes::from_static(b"3,4,5,6")),
            ("newline".into(), Bytes::from_static(b"\n")),
            ("vendor-id".into(), {
                let mut buf = BytesMut::new();
                buf.put_str("hawser");
                buf.put_str(env!("CARGO_PKG_NAME"));
                buf.put_str(env!("CARGO_PKG_VERSION"));
                buf.put_u64(0);

                buf.freeze()
            }),
        ];

        if self.version >= 5 {
            // supported-attribute-mask, supported-attribute-bits,
            // supported-open-flags, supported-access-mask,
            // max-read-size.
            let mut buf = BytesMut::new();
            buf.put_u32(0x3d); // size, permissions, times
            buf.put_u32(0);
            buf.put_u32(0x3f);
            buf.put_u32(0x7);
            buf.put_u32(self.config.max_packet_length);

            extensions.push(("supported".into(), buf.freeze()));
        }

        if self.version >= 6 {
            let mut buf = BytesMut::new();
            buf.put_u32(0x3d);
            buf.put_u32(0);
            buf.put_u32(0x3f);
            buf.put_u32(0x7);
            buf.put_u32(self.config.max_packet_length);
            buf.put_u16(0);
            buf.put_u16(0);
            buf.put_u32(0); // attrib-extension-count
            buf.put_u32(1); // extension-count
            buf.put_str("version-select");

            extensions.push(("supported2".into(), buf.freeze()));
        }

        if self.config.openssh_extensions {
            extensions.push(("fsync@openssh.com".into(), Bytes::from_static(b"1")));
        }

        for (name, data) in &self.config.client_extensions {
            extensions.push((name.clone(), Bytes::from(data.clone().into_bytes())));
        }

        extensions
    }

    async fn answer(
        &mut self,
        writer: &mut (impl AsyncWrite + Unpin),
        response: Response,
    ) -> Result<()> {
        tracing::trace!("-~> {response:?}");

        wire::write_packet(writer, response.encode(self.version)).await
    }

    /// Dispatch one request; the returned [`enum@Error`]s (and only
    /// those) terminate the subsystem.
    pub(crate) fn dispatch(&mut self, request: Request) -> Result<Response> {
        let selecting = matches!(
            &request,
            Request::Extended { name, .. } if name == "version-select"
        );

        if selecting && !self.may_select_version {
            return Err(Error::VersionSelect("not the first request"));
        }
        self.may_select_version = false;

        let Some(id) = request.id() else {
            // A second `INIT` after the negotiation.
            return Ok(Response::status(0, StatusCode::BadMessage));
        };

        let response = match request {
            Request::Init { .. } => unreachable!("handled above"),

            Request::Open {
                id,
                path,
                options,
                attrs,
            } => self.open(id, path, options, attrs),
            Request::Close { id, handle } => self.close(id, handle),
            Request::Read {
                id,
                handle,
                offset,
                length,
            } => self.read(id, handle, offset, length),
            Request::Write {
                id,
                handle,
                offset,
                data,
            } => self.write(id, handle, offset, data),
            Request::Lstat { id, path } => self.stat(id, path, false),
            Request::Stat { id, path } => self.stat(id, path, true),
            Request::Fstat { id, handle } => self.fstat(id, handle),
            Request::Setstat { id, path, attrs } => self.setstat(id, path, attrs),
            Request::Fsetstat { id, handle, attrs } => self.fsetstat(id, handle, attrs),
            Request::Opendir { id, path } => self.opendir(id, path),
            Request::Readdir { id, handle } => self.readdir(id, handle),
            Request::Remove { id, path } => self.remove(id, path),
            Request::Mkdir { id, path, attrs } => self.mkdir(id, path, attrs),
            Request::Rmdir { id, path } => self.rmdir(id, path),
            Request::Realpath {
                id,
                path,
                control,
                compose,
            } => self.realpath(id, path, control, compose),
            Request::Rename {
                id,
                oldpath,
                newpath,
                overwrite,
                atomic,
            } => self.rename(id, oldpath, newpath, overwrite, atomic),
            Request::Readlink { id, path } => self.readlink(id, path),
            Request::Symlink {
                id,
                target,
                linkpath,
            } => self.symlink(id, target, linkpath),
            Request::Link {
                id,
                newpath,
                existingpath,
                symlink,
            } => self.link(id, newpath, existingpath, symlink),
            Request::Block {
                id,
                handle,
                offset,
                length,
                mask,
            } => self.block(id, handle, offset, length, mask),
            Request::Unblock {
                id,
                handle,
                offset,
                length,
            } => self.unblock(id, handle, offset, length),
            Request::Extended { id, name, data } => return self.extended(id, name, data),
        };

        Ok(response.unwrap_or_else(|code| Response::status(id, code)))
    }

    fn open(
        &mut self,
        id: u32,
        path: String,
        options: OpenOptions,
        attrs: Attrs,
    ) -> Result<Response, StatusCode> {
        let mut fs_options = options.to_fs();

        if let Some(permissions) = attrs.permissions {
            fs_options.mode(permissions & 0o7777);
        }

        let file = fs_options.open(&path)?;

        let handle = self.handles.insert(Handle::File {
            file,
            path: PathBuf::from(path),
            options,
            locks: Vec::new(),
        })?;

        Ok(Response::Handle { id, handle })
    }

    fn close(&mut self, id: u32, handle: Bytes) -> Result<Response, StatusCode> {
        match self.handles.remove(&handle) {
            Some(_) => Ok(Response::status(id, StatusCode::Ok)),
            None => Err(StatusCode::InvalidHandle),
        }
    }

    fn read(
        &mut self,
        id: u32,
        handle: Bytes,
        offset: u64,
        length: u32,
    ) -> Result<Response, StatusCode> {
        let bound = length.min(self.config.max_packet_length) as usize;

        let Handle::File { file, .. } = self.handles.file_mut(&handle)? else {
            unreachable!("`file_mut` only yields file handles")
        };

        let mut data = vec![0u8; bound];
        let count = file.read_at(&mut data, offset)?;

        if count == 0 {
            return Err(StatusCode::Eof);
        }

        data.truncate(count);

        Ok(Response::Data {
            id,
            data: data.into(),
        })
    }

    fn write(
        &mut self,
        id: u32,
        handle: Bytes,
        offset: u64,
        data: Bytes,
    ) -> Result<Response, StatusCode> {
        let Handle::File { file, options, .. } = self.handles.file_mut(&handle)? else {
            unreachable!("`file_mut` only yields file handles")
        };

        if options.append {
            // The handle was opened with `O_APPEND`, offsets are
            // meaningless and every write lands at the end.
            use std::io::Write;

            file.write_all(&data)?;
        } else {
            file.write_all_at(&data, offset)?;
        }

        Ok(Response::status(id, StatusCode::Ok))
    }

    /// Route the attribute views the platform could not supply
    /// through the configured policy. The creation time is optional
    /// in the attribute block and commonly unavailable, so it is
    /// simply left out instead of being treated as a gap.
    fn police_gaps(&self, attrs: &Attrs) -> Result<(), StatusCode> {
        let mut gaps: Vec<&str> = Vec::new();

        if attrs.size.is_none() {
            gaps.push("size");
        }
        if attrs.uid_gid.is_none() {
            gaps.push("uid/gid");
        }
        if attrs.permissions.is_none() {
            gaps.push("permissions");
        }
        if attrs.accessed.is_none() {
            gaps.push("access time");
        }
        if attrs.modified.is_none() {
            gaps.push("modification time");
        }

        if gaps.is_empty() {
            return Ok(());
        }

        match self.config.unsupported_attribute_policy {
            UnsupportedAttributePolicy::Ignore => Ok(()),
            UnsupportedAttributePolicy::Warn => {
                tracing::warn!(
                    "The filesystem could not supply every attribute view: {}",
                    gaps.join(", "),
                );

                Ok(())
            }
            UnsupportedAttributePolicy::ThrowException => Err(StatusCode::OpUnsupported),
        }
    }

    fn stat(&mut self, id: u32, path: String, follow: bool) -> Result<Response, StatusCode> {
        let metadata = if follow {
            fs::metadata(&path)?
        } else {
            fs::symlink_metadata(&path)?
        };

        let attrs = Attrs::from_metadata(&metadata);
        self.police_gaps(&attrs)?;

        Ok(Response::Attrs { id, attrs })
    }

    fn fstat(&mut self, id: u32, handle: Bytes) -> Result<Response, StatusCode> {
        let Handle::File { file, .. } = self.handles.file_mut(&handle)? else {
            unreachable!("`file_mut` only yields file handles")
        };

        let attrs = Attrs::from_metadata(&file.metadata()?);
        self.police_gaps(&attrs)?;

        Ok(Response::Attrs { id, attrs })
    }

    /// Apply the attribute whitelist onto `path`, routing what cannot
    /// be honored through the configured policy.
    fn apply_attrs(&self, path: &Path, attrs: &Attrs) -> Result<(), StatusCode> {
        let mut unsupported: Vec<&str> = Vec::new();

        if let Some(size) = attrs.size {
            let file = fs::OpenOptions::new().write(true).open(path)?;
            file.set_len(size)?;
        }

        if let Some(permissions) = attrs.permissions {
            fs::set_permissions(path, fs::Permissions::from_mode(permissions & 0o7777))?;
        }

        if let Some((uid, gid)) = attrs.uid_gid {
            std::os::unix::fs::chown(path, Some(uid), Some(gid))?;
        }

        if attrs.owner_group.is_some() {
            // Name-based ownership would need a principal lookup.
            unsupported.push("owner/group names");
        }

        let (accessed, modified) = attrs.times();
        if accessed.is_some() || modified.is_some() {
            let mut times = fs::FileTimes::new();

            if let Some(accessed) = accessed {
                times = times.set_accessed(accessed);
            }
            if let Some(modified) = modified {
                times = times.set_modified(modified);
            }

            let file = fs::File::open(path)?;
            file.set_times(times)?;
        }

        if attrs.created.is_some() {
            unsupported.push("creation time");
        }

        for (name, _) in &attrs.extended {
            let _ = name;
            unsupported.push("extended attributes");
            break;
        }

        if unsupported.is_empty() {
            return Ok(());
        }

        match self.config.unsupported_attribute_policy {
            UnsupportedAttributePolicy::Ignore => Ok(()),
            UnsupportedAttributePolicy::Warn => {
                tracing::warn!("Skipped unsupported attributes: {}", unsupported.join(", "));

                Ok(())
            }
            UnsupportedAttributePolicy::ThrowException => Err(StatusCode::OpUnsupported),
        }
    }

    fn setstat(&mut self, id: u32, path: String, attrs: Attrs) -> Result<Response, StatusCode> {
        self.apply_attrs(Path::new(&path), &attrs)?;

        Ok(Response::status(id, StatusCode::Ok))
    }

    fn fsetstat(&mut self, id: u32, handle: Bytes, attrs: Attrs) -> Result<Response, StatusCode> {
        let path = self.handles.file_mut(&handle)?.path().clone();

        self.apply_attrs(&path, &attrs)?;

        Ok(Response::status(id, StatusCode::Ok))
    }

    fn opendir(&mut self, id: u32, path: String) -> Result<Response, StatusCode> {
        let metadata = fs::metadata(&path)?;
        if !metadata.is_dir() {
            return Err(StatusCode::NotADirectory);
        }

        let entries = fs::read_dir(&path)?;

        let handle = self.handles.insert(Handle::Dir {
            path: PathBuf::from(path),
            entries: Some(entries),
            sent_dot: false,
            sent_dotdot: false,
            done: false,
        })?;

        Ok(Response::Handle { id, handle })
    }

    fn readdir(&mut self, id: u32, handle: Bytes) -> Result<Response, StatusCode> {
        let budget = self.config.max_packet_length as usize;

        let Handle::Dir {
            path,
            entries,
            sent_dot,
            sent_dotdot,
            done,
        } = self.handles.dir_mut(&handle)?
        else {
            unreachable!("`dir_mut` only yields directory handles")
        };

        if *done {
            return Err(StatusCode::Eof);
        }

        let mut batch: Vec<NameEntry> = Vec::new();
        let mut spent = 0usize;

        let mut push = |batch: &mut Vec<NameEntry>,
                        spent: &mut usize,
                        filename: String,
                        attrs: Attrs| {
            *spent += filename.len() * 2 + 64;

            let longname = attrs.longname(&filename);
            batch.push(NameEntry {
                filename,
                longname,
                attrs,
            });
        };

        if !*sent_dot {
            let attrs = fs::metadata(&path)
                .map(|metadata| Attrs::from_metadata(&metadata))
                .unwrap_or_default();

            push(&mut batch, &mut spent, ".".into(), attrs);
            *sent_dot = true;
        }

        if !*sent_dotdot {
            let parent = path.parent().unwrap_or(path.as_path());
            let attrs = fs::metadata(parent)
                .map(|metadata| Attrs::from_metadata(&metadata))
                .unwrap_or_default();

            push(&mut batch, &mut spent, "..".into(), attrs);
            *sent_dotdot = true;
        }

        while spent < budget {
            let Some(iterator) = entries else {
                *done = true;
                break;
            };

            match iterator.next() {
                Some(Ok(entry)) => {
                    let filename = entry.file_name().to_string_lossy().into_owned();
                    let attrs = entry
                        .metadata()
                        .map(|metadata| Attrs::from_metadata(&metadata))
                        .unwrap_or_default();

                    push(&mut batch, &mut spent, filename, attrs);
                }
                Some(Err(err)) => {
                    tracing::warn!("Skipped an unreadable directory entry: {err}");
                }
                None => {
                    *entries = None;
                    *done = true;
                }
            }
        }

        if batch.is_empty() {
            *done = true;

            return Err(StatusCode::Eof);
        }

        let end_of_list = *done;

        Ok(Response::Name {
            id,
            entries: batch,
            end_of_list,
        })
    }

    fn remove(&mut self, id: u32, path: String) -> Result<Response, StatusCode> {
        fs::remove_file(&path)?;

        Ok(Response::status(id, StatusCode::Ok))
    }

    fn mkdir(&mut self, id: u32, path: String, attrs: Attrs) -> Result<Response, StatusCode> {
        fs::create_dir(&path)?;

        if let Some(permissions) = attrs.permissions {
            fs::set_permissions(&path, fs::Permissions::from_mode(permissions & 0o7777))?;
        }

        Ok(Response::status(id, StatusCode::Ok))
    }

    fn rmdir(&mut self, id: u32, path: String) -> Result<Response, StatusCode> {
        fs::remove_dir(&path)?;

        Ok(Response::status(id, StatusCode::Ok))
    }

    fn rename(
        &mut self,
        id: u32,
        oldpath: String,
        newpath: String,
        overwrite: bool,
        atomic: bool,
    ) -> Result<Response, StatusCode> {
        // Version 3 renames never overwrite; version 5+ clients opt in
        // with the OVERWRITE bit. ATOMIC maps onto the native rename,
        // which is atomic already.
        let _ = atomic;

        if !overwrite && self.version >= 5 && fs::symlink_metadata(&newpath).is_ok() {
            return Err(StatusCode::FileAlreadyExists);
        }

        if self.version <= 4 && fs::symlink_metadata(&newpath).is_ok() {
            return Err(StatusCode::FileAlreadyExists);
        }

        fs::rename(&oldpath, &newpath)?;

        Ok(Response::status(id, StatusCode::Ok))
    }

    fn readlink(&mut self, id: u32, path: String) -> Result<Response, StatusCode> {
        let target = fs::read_link(&path)?;
        let filename = target.to_string_lossy().into_owned();

        Ok(Response::Name {
            id,
            entries: vec![NameEntry {
                longname: filename.clone(),
                filename,
                attrs: Attrs::default(),
            }],
            end_of_list: true,
        })
    }

    fn symlink(&mut self, id: u32, target: String, linkpath: String) -> Result<Response, StatusCode> {
        std::os::unix::fs::symlink(&target, &linkpath)?;

        Ok(Response::status(id, StatusCode::Ok))
    }

    fn link(
        &mut self,
        id: u32,
        newpath: String,
        existingpath: String,
        symlink: bool,
    ) -> Result<Response, StatusCode> {
        if symlink {
            std::os::unix::fs::symlink(&existingpath, &newpath)?;
        } else {
            fs::hard_link(&existingpath, &newpath)?;
        }

        Ok(Response::status(id, StatusCode::Ok))
    }

    /// Lexically canonicalize `path`: absolute, `.` and `..` resolved,
    /// without touching the filesystem.
    fn canonicalize(path: &str) -> PathBuf {
        let mut resolved = if path.starts_with('/') {
            PathBuf::from("/")
        } else {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"))
        };

        for component in Path::new(path).components() {
            match component {
                Component::RootDir => resolved = PathBuf::from("/"),
                Component::CurDir => (),
                Component::ParentDir => {
                    resolved.pop();
                }
                Component::Normal(part) => resolved.push(part),
                Component::Prefix(_) => (),
            }
        }

        resolved
    }

    fn realpath(
        &mut self,
        id: u32,
        path: String,
        control: Option<u8>,
        compose: Vec<String>,
    ) -> Result<Response, StatusCode> {
        let mut composed = path;
        for part in &compose {
            if !composed.ends_with('/') {
                composed.push('/');
            }
            composed.push_str(part);
        }

        let resolved = Self::canonicalize(&composed);
        let filename = resolved.to_string_lossy().into_owned();

        let attrs = match control {
            Some(wire::SSH_FXP_REALPATH_STAT_IF) => fs::symlink_metadata(&resolved)
                .map(|metadata| Attrs::from_metadata(&metadata))
                .unwrap_or_default(),
            Some(wire::SSH_FXP_REALPATH_STAT_ALWAYS) => {
                Attrs::from_metadata(&fs::symlink_metadata(&resolved)?)
            }
            Some(wire::SSH_FXP_REALPATH_NO_CHECK) => Attrs::default(),
            _ => Attrs::default(),
        };

        Ok(Response::Name {
            id,
            entries: vec![NameEntry {
                longname: filename.clone(),
                filename,
                attrs,
            }],
            end_of_list: true,
        })
    }

    fn block(
        &mut self,
        id: u32,
        handle: Bytes,
        offset: u64,
        length: u64,
        mask: u32,
    ) -> Result<Response, StatusCode> {
        let candidate = ByteRangeLock {
            offset,
            length,
            mask,
        };

        if self.handles.lock_conflicts(&handle, &candidate) {
            return Err(StatusCode::ByteRangeLockConflict);
        }

        let Handle::File { locks, .. } = self.handles.file_mut(&handle)? else {
            unreachable!("`file_mut` only yields file handles")
        };

        locks.push(candidate);

        Ok(Response::status(id, StatusCode::Ok))
    }

    fn unblock(
        &mut self,
        id: u32,
        handle: Bytes,
        offset: u64,
        length: u64,
    ) -> Result<Response, StatusCode> {
        let Handle::File { locks, .. } = self.handles.file_mut(&handle)? else {
            unreachable!("`file_mut` only yields file handles")
        };

        let before = locks.len();
        locks.retain(|lock| lock.offset != offset || lock.length != length);

        if locks.len() == before {
            return Err(StatusCode::NoMatchingByteRangeLock);
        }

        Ok(Response::status(id, StatusCode::Ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_canonicalizes_lexically() {
        assert_eq!(
            Engine::canonicalize("/tmp/foo/../bar/./baz"),
            PathBuf::from("/tmp/bar/baz"),
        );
        assert_eq!(Engine::canonicalize("/.."), PathBuf::from("/"));
    }
}
