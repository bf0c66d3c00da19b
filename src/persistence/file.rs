//! Credential persistence for host (development) builds.
//!
//! Stores the credentials as JSON so they persist across runs.
//! Uses `~/.garden-link/credentials.json` by default.
//!
//! # Usage
//!
//! ```ignore
//! use garden_link::persistence::{CredentialStore, FileStore};
//!
//! let store = FileStore::at_default_path()?;
//! if let Some(creds) = store.load() {
//!     log::info!("Stored network: {}", creds.ssid());
//! }
//! ```

use super::{CredentialStore, StoreError};
use crate::config::{Bssid, Credentials};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// On-disk record.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct StoredCredentials {
    ssid: String,
    password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bssid: Option<String>,
}

impl StoredCredentials {
    fn from_credentials(credentials: &Credentials) -> Self {
        Self {
            ssid: credentials.ssid().to_string(),
            password: credentials.password().to_string(),
            bssid: credentials.bssid().map(|b| b.to_string()),
        }
    }

    fn to_credentials(&self) -> Result<Credentials, StoreError> {
        let creds = Credentials::new(self.ssid.as_str(), self.password.as_str())?;
        match &self.bssid {
            Some(text) => Ok(creds.with_bssid(text.parse::<Bssid>()?)),
            None => Ok(creds),
        }
    }
}

/// Get the default credential file path.
///
/// Returns `~/.garden-link/credentials.json`
pub fn default_store_path() -> io::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home)
        .join(".garden-link")
        .join("credentials.json"))
}

/// JSON-file backed [`CredentialStore`].
pub struct FileStore {
    path: PathBuf,
    /// Serializes readers and writers of the file.
    lock: Mutex<()>,
}

impl FileStore {
    /// Store credentials at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store credentials at [`default_store_path`].
    pub fn at_default_path() -> io::Result<Self> {
        Ok(Self::new(default_store_path()?))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Option<Credentials> {
        let text = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No credentials file found at {:?}", self.path);
                return None;
            }
            Err(e) => {
                warn!("Failed to read credentials file: {}", e);
                return None;
            }
        };

        let parsed = serde_json::from_str::<StoredCredentials>(&text)
            .map_err(|e| StoreError::Format(e.to_string()))
            .and_then(|record| record.to_credentials());
        match parsed {
            Ok(creds) => Some(creds),
            Err(e) => {
                error!("Failed to parse stored credentials: {}", e);
                None
            }
        }
    }

    fn write(&self, credentials: &Credentials) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let record = StoredCredentials::from_credentials(credentials);
        let json =
            serde_json::to_string_pretty(&record).map_err(|e| StoreError::Format(e.to_string()))?;

        // Write beside the target and rename, so a crash never leaves half a file.
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, &json)?;
        fs::rename(&staging, &self.path)?;

        if fs::read_to_string(&self.path)? != json {
            return Err(StoreError::VerificationFailed);
        }

        info!("Credentials for {} saved to {:?}", credentials.ssid(), self.path);
        Ok(())
    }
}

impl CredentialStore for FileStore {
    fn load(&self) -> Option<Credentials> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        self.read()
    }

    fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        self.write(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::greenhouse;
    use std::env;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    // Counter to ensure unique test files even in parallel execution
    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn unique_store_path() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let pid = std::process::id();
        env::temp_dir()
            .join(format!("garden-link-test-{}-{}", pid, id))
            .join("credentials.json")
    }

    fn cleanup(store: &FileStore) {
        if let Some(dir) = store.path().parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_missing_file_loads_none() {
        let store = FileStore::new(unique_store_path());
        assert!(store.load().is_none());
    }

    #[test]
    fn test_credentials_roundtrip_with_bssid() {
        let store = FileStore::new(unique_store_path());
        let creds = greenhouse().with_bssid("a4:cf:12:00:be:ef".parse().unwrap());

        store.save(&creds).expect("Failed to save");
        assert_eq!(store.load(), Some(creds));

        cleanup(&store);
    }

    #[test]
    fn test_save_overwrites_previous() {
        let store = FileStore::new(unique_store_path());
        store.save(&greenhouse()).unwrap();
        let other = Credentials::new("Allotment", "").unwrap();
        store.save(&other).unwrap();
        assert_eq!(store.load(), Some(other));

        cleanup(&store);
    }

    #[test]
    fn test_corrupted_file_loads_none() {
        let store = FileStore::new(unique_store_path());
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();

        fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().is_none());

        fs::write(store.path(), r#"{"ssid":"","password":"x"}"#).unwrap();
        assert!(store.load().is_none());

        cleanup(&store);
    }

    #[test]
    fn test_open_network_file_has_no_bssid_key() {
        let store = FileStore::new(unique_store_path());
        store.save(&Credentials::new("Allotment", "").unwrap()).unwrap();
        let text = fs::read_to_string(store.path()).unwrap();
        assert!(!text.contains("bssid"));

        cleanup(&store);
    }

    #[test]
    fn test_concurrent_saves_leave_a_valid_file() {
        let store = Arc::new(FileStore::new(unique_store_path()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let creds = Credentials::new(format!("Net{}", i), "").unwrap();
                    store.save(&creds).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let loaded = store.load().expect("store should hold one of the writes");
        assert!(loaded.ssid().starts_with("Net"));

        cleanup(&store);
    }
}
