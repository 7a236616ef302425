//! A `publickey` method handler backed by an `authorized_keys` file.

use std::{
    io,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::SystemTime,
};

use ssh_key::public::PublicKey;

use crate::handler::publickey::{Publickey, Response};

/// A watched `authorized_keys` file in the OpenSSH format, one public
/// key per line.
///
/// The file's modification time is checked exactly once per
/// authentication attempt and the keys are re-parsed whenever it
/// moved, so edits are picked up without restarting the server.
pub struct AuthorizedKeys {
    path: PathBuf,
    mtime: Option<SystemTime>,
    keys: Vec<PublicKey>,

    reloads: Arc<AtomicUsize>,
}

impl AuthorizedKeys {
    /// Watch the authorized-keys file at `path`.
    ///
    /// The file does not have to exist yet; a missing file simply
    /// authorizes no keys.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mtime: None,
            keys: Vec::new(),

            reloads: Default::default(),
        }
    }

    /// The count of reload checks performed so far, exactly one per
    /// authentication attempt.
    pub fn reload_counter(&self) -> Arc<AtomicUsize> {
        self.reloads.clone()
    }

    /// Check the file's modification time, re-parsing its keys when it
    /// changed since the last check.
    fn refresh(&mut self) -> io::Result<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);

        let mtime = std::fs::metadata(&self.path)?.modified()?;

        if self.mtime != Some(mtime) {
            let contents = std::fs::read_to_string(&self.path)?;

            self.keys = contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .filter_map(|line| match PublicKey::from_openssh(line) {
                    Ok(key) => Some(key),
                    Err(err) => {
                        tracing::warn!(
                            "Skipped an unparseable authorized key in `{}`: {err}",
                            self.path.display(),
                        );

                        None
                    }
                })
                .collect();
            self.mtime = Some(mtime);

            tracing::debug!(
                "Reloaded {} authorized keys from `{}`",
                self.keys.len(),
                self.path.display(),
            );
        }

        Ok(())
    }
}

impl Publickey for AuthorizedKeys {
    fn process(&mut self, user: String, key: PublicKey) -> Response {
        if let Err(err) = self.refresh() {
            tracing::warn!(
                "Unable to read the authorized keys in `{}`: {err}",
                self.path.display(),
            );

            self.keys.clear();
            self.mtime = None;
        }

        if self
            .keys
            .iter()
            .any(|authorized| authorized.key_data() == key.key_data())
        {
            tracing::debug!("Accepted a published key for user `{user}`");

            Response::Accept
        } else {
            Response::Reject
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use ssh_key::{private::PrivateKey, Algorithm};

    fn keypair() -> (PrivateKey, PublicKey) {
        let key = PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519)
            .expect("Cannot generate private keys");
        let public = key.public_key().clone();

        (key, public)
    }

    #[test]
    fn it_reloads_once_per_attempt() {
        let (_, public) = keypair();

        let mut file = tempfile::NamedTempFile::new().expect("Cannot create a temporary file");
        writeln!(
            file,
            "{}",
            public.to_openssh().expect("Cannot encode the public key")
        )
        .expect("Cannot write the authorized keys");

        let mut store = AuthorizedKeys::new(file.path());
        let reloads = store.reload_counter();

        assert_eq!(store.process("user".into(), public.clone()), Response::Accept);
        assert_eq!(reloads.load(Ordering::SeqCst), 1);

        assert_eq!(store.process("user".into(), public), Response::Accept);
        assert_eq!(reloads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn it_picks_up_rewrites() {
        let (_, first) = keypair();
        let (_, second) = keypair();

        let mut file = tempfile::NamedTempFile::new().expect("Cannot create a temporary file");
        writeln!(
            file,
            "{}",
            first.to_openssh().expect("Cannot encode the public key")
        )
        .expect("Cannot write the authorized keys");

        let mut store = AuthorizedKeys::new(file.path());

        assert_eq!(store.process("user".into(), first.clone()), Response::Accept);
        assert_eq!(store.process("user".into(), second.clone()), Response::Reject);

        // Rewrite the file with only the second key, nudging the mtime
        // for filesystems with coarse timestamps.
        let encoded = second.to_openssh().expect("Cannot encode the public key");
        std::fs::write(file.path(), format!("{encoded}\n"))
            .expect("Cannot rewrite the authorized keys");
        let bumped = SystemTime::now() + std::time::Duration::from_secs(1);
        file.as_file()
            .set_modified(bumped)
            .expect("Cannot bump the file's mtime");

        assert_eq!(store.process("user".into(), first), Response::Reject);
        assert_eq!(store.process("user".into(), second), Response::Accept);
    }
}
