//! Durable home of the raw session token.
//!
//! The session lives in a single key of a small key/value store. Absence of
//! the key means "logged out". Only [`SessionManager`](crate::SessionManager)
//! reads or writes it.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::Error;

/// Key under which the token is stored.
pub const TOKEN_KEY: &str = "auth_token";

/// Key/value slot holding the persisted token.
///
/// Calls are synchronous: the session manager must be able to answer
/// "is there a token" without suspending.
pub trait TokenStore: Send + Sync + 'static {
    /// Returns the stored token, if any.
    fn load(&self) -> Result<Option<String>, Error>;

    /// Stores `token`, replacing any previous value.
    fn save(&self, token: &str) -> Result<(), Error>;

    /// Removes the stored token. Removing an absent token is not an error.
    fn clear(&self) -> Result<(), Error>;
}

/// In-process store, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a token, as if left over from a previous run.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<String>, Error> {
        Ok(self.token.lock().clone())
    }

    fn save(&self, token: &str) -> Result<(), Error> {
        *self.token.lock() = Some(token.to_owned());
        Ok(())
    }

    fn clear(&self) -> Result<(), Error> {
        *self.token.lock() = None;
        Ok(())
    }
}

/// JSON file of string keys to string values.
///
/// The whole file is rewritten on every change through a temporary sibling
/// and a rename, so a crash leaves either the old or the new contents. Other
/// keys in the file are preserved.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    key: String,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileTokenStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            key: TOKEN_KEY.to_owned(),
            lock: Mutex::new(()),
        }
    }

    /// Use a key other than [`TOKEN_KEY`].
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling the new contents are written to before the rename.
    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>, Error> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(storage_error(&self.path, "read", &e)),
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(BTreeMap::new());
        }
        serde_json::from_slice(&raw).map_err(|e| {
            Error::Storage(format!("{}: malformed store: {e}", self.path.display()))
        })
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), Error> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| storage_error(parent, "create", &e))?;
        }

        let tmp = self.tmp_path();
        let body = serde_json::to_vec_pretty(entries)
            .map_err(|e| Error::Storage(format!("serialize store: {e}")))?;

        let mut file = open_private(&tmp).map_err(|e| storage_error(&tmp, "create", &e))?;
        file.write_all(&body)
            .and_then(|()| file.sync_all())
            .map_err(|e| storage_error(&tmp, "write", &e))?;
        fs::rename(&tmp, &self.path).map_err(|e| storage_error(&self.path, "replace", &e))
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<String>, Error> {
        let _guard = self.lock.lock();
        Ok(self.read_entries()?.remove(&self.key))
    }

    fn save(&self, token: &str) -> Result<(), Error> {
        let _guard = self.lock.lock();
        let mut entries = self.read_entries()?;
        entries.insert(self.key.clone(), token.to_owned());
        self.write_entries(&entries)
    }

    fn clear(&self) -> Result<(), Error> {
        let _guard = self.lock.lock();
        let mut entries = self.read_entries()?;
        if entries.remove(&self.key).is_none() {
            return Ok(());
        }
        self.write_entries(&entries)
    }
}

// The file holds a bearer credential: owner read/write only.
#[cfg(unix)]
fn open_private(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies on creation; a leftover temp file keeps its own.
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> io::Result<fs::File> {
    fs::File::create(path)
}

fn storage_error(path: &Path, action: &str, e: &io::Error) -> Error {
    Error::Storage(format!("{action} {}: {e}", path.display()))
}
