//! The table of live file and directory handles, keyed by the random
//! opaque byte strings handed to the peer.

use std::{collections::HashMap, fs, path::PathBuf};

use bytes::Bytes;
use rand::RngCore;

use crate::{
    wire::{open::OpenOptions, StatusCode},
    SftpConfig,
};

/// An advisory byte-range lock taken through `SSH_FXP_BLOCK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRangeLock {
    pub offset: u64,
    pub length: u64,
    pub mask: u32,
}

impl ByteRangeLock {
    fn overlaps(&self, other: &Self) -> bool {
        let end = |lock: &Self| match lock.length {
            0 => u64::MAX,
            length => lock.offset.saturating_add(length),
        };

        self.offset < end(other) && other.offset < end(self)
    }
}

/// A live handle, either an open file or a directory being listed.
pub enum Handle {
    File {
        file: fs::File,
        path: PathBuf,
        options: OpenOptions,
        locks: Vec<ByteRangeLock>,
    },
    Dir {
        path: PathBuf,
        entries: Option<fs::ReadDir>,
        sent_dot: bool,
        sent_dotdot: bool,
        done: bool,
    },
}

impl Handle {
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::File { path, .. } | Self::Dir { path, .. } => path,
        }
    }
}

/// The handle table, owned and accessed by the subsystem worker only.
pub struct HandleTable {
    handles: HashMap<Bytes, Handle>,

    handle_size: usize,
    rand_max_rounds: usize,
    capacity: Option<usize>,
}

impl HandleTable {
    pub fn new(config: &SftpConfig) -> Self {
        Self {
            handles: HashMap::new(),

            handle_size: config.handle_size.clamp(4, 64),
            rand_max_rounds: config.handle_rand_max_rounds,
            capacity: config.max_open_handles,
        }
    }

    /// Insert a handle under a freshly generated identifier,
    /// re-drawing on the (unlikely) collisions up to the configured
    /// round count.
    pub fn insert(&mut self, handle: Handle) -> Result<Bytes, StatusCode> {
        if let Some(capacity) = self.capacity {
            if self.handles.len() >= capacity {
                tracing::warn!("Handle capacity ({capacity}) reached, refusing the open");

                return Err(StatusCode::Failure);
            }
        }

        let mut rng = rand::thread_rng();

        for _ in 0..self.rand_max_rounds.max(1) {
            let mut id = vec![0u8; self.handle_size];
            rng.fill_bytes(&mut id);
            let id = Bytes::from(id);

            if !self.handles.contains_key(&id) {
                self.handles.insert(id.clone(), handle);

                return Ok(id);
            }
        }

        tracing::warn!(
            "Could not draw a free handle in {} rounds",
            self.rand_max_rounds,
        );

        Err(StatusCode::Failure)
    }

    pub fn file_mut(&mut self, id: &Bytes) -> Result<&mut Handle, StatusCode> {
        match self.handles.get_mut(id) {
            Some(handle @ Handle::File { .. }) => Ok(handle),
            Some(Handle::Dir { .. }) => Err(StatusCode::InvalidHandle),
            None => Err(StatusCode::InvalidHandle),
        }
    }

    pub fn dir_mut(&mut self, id: &Bytes) -> Result<&mut Handle, StatusCode> {
        match self.handles.get_mut(id) {
            Some(handle @ Handle::Dir { .. }) => Ok(handle),
            Some(Handle::File { .. }) => Err(StatusCode::InvalidHandle),
            None => Err(StatusCode::InvalidHandle),
        }
    }

    pub fn remove(&mut self, id: &Bytes) -> Option<Handle> {
        self.handles.remove(id)
    }

    /// Whether a proposed lock conflicts with a lock held on any
    /// other handle to the same file.
    pub fn lock_conflicts(&self, id: &Bytes, candidate: &ByteRangeLock) -> bool {
        let Some(path) = self.handles.get(id).map(Handle::path) else {
            return false;
        };

        self.handles
            .iter()
            .filter(|(other, _)| *other != id)
            .filter_map(|(_, handle)| match handle {
                Handle::File {
                    path: other, locks, ..
                } if other == path => Some(locks),
                _ => None,
            })
            .flatten()
            .any(|lock| lock.overlaps(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(config: SftpConfig) -> (HandleTable, tempfile::NamedTempFile) {
        let file = tempfile::NamedTempFile::new().expect("Cannot create a temporary file");

        (HandleTable::new(&config), file)
    }

    fn file_handle(file: &tempfile::NamedTempFile) -> Handle {
        Handle::File {
            file: file.reopen().expect("Cannot reopen the temporary file"),
            path: file.path().into(),
            options: OpenOptions::default(),
            locks: Vec::new(),
        }
    }

    #[test]
    fn it_draws_unique_handles_of_the_configured_size() {
        let (mut table, file) = table(SftpConfig {
            handle_size: 8,
            ..Default::default()
        });

        let mut seen = std::collections::HashSet::new();

        for _ in 0..128 {
            let id = table
                .insert(file_handle(&file))
                .expect("Could not insert the handle");

            assert_eq!(id.len(), 8);
            assert!(seen.insert(id), "A handle identifier collided");
        }
    }

    #[test]
    fn it_enforces_the_handle_capacity() {
        let (mut table, file) = table(SftpConfig {
            max_open_handles: Some(2),
            ..Default::default()
        });

        table
            .insert(file_handle(&file))
            .expect("Could not insert the first handle");
        table
            .insert(file_handle(&file))
            .expect("Could not insert the second handle");

        assert_eq!(
            table.insert(file_handle(&file)),
            Err(StatusCode::Failure),
        );
    }

    #[test]
    fn it_validates_handle_kinds() {
        let (mut table, file) = table(Default::default());

        let id = table
            .insert(file_handle(&file))
            .expect("Could not insert the handle");

        assert!(table.file_mut(&id).is_ok());
        assert_eq!(
            table.dir_mut(&id).err(),
            Some(StatusCode::InvalidHandle),
        );
    }

    #[test]
    fn it_detects_cross_handle_lock_overlaps() {
        let (mut table, file) = table(Default::default());

        let first = table
            .insert(file_handle(&file))
            .expect("Could not insert the first handle");
        let second = table
            .insert(file_handle(&file))
            .expect("Could not insert the second handle");

        let lock = ByteRangeLock {
            offset: 0,
            length: 64,
            mask: 0,
        };

        if let Ok(Handle::File { locks, .. }) = table.file_mut(&first) {
            locks.push(lock);
        }

        assert!(table.lock_conflicts(
            &second,
            &ByteRangeLock {
                offset: 32,
                length: 64,
                mask: 0,
            },
        ));
        assert!(!table.lock_conflicts(
            &second,
            &ByteRangeLock {
                offset: 64,
                length: 0,
                mask: 0,
            },
        ));
    }
}
