use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use htb_core::{HtbError, Result};

use crate::credentials::CachedTokenRecord;
use crate::store::TokenStore;

/// JSON file token cache
///
/// The file holds `{"access_token": .., "refresh_token": .., "app_token": ..}`.
/// Writes go to a temporary sibling and are renamed into place while an
/// advisory lock on `<file>.lock` is held.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
    lock_file: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let lock_file = sibling(&path, "lock");
        Self { path, lock_file }
    }

    /// Get default cache file for the current platform
    pub fn default_path() -> Result<PathBuf> {
        let project_dirs = directories::ProjectDirs::from("", "", "htb-client")
            .ok_or_else(|| HtbError::Cache("Could not determine config directory".to_string()))?;

        Ok(project_dirs.config_dir().join("tokens.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire an exclusive lock on the cache
    fn acquire_lock(&self) -> Result<fs::File> {
        let lock_file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_file)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| HtbError::LockTimeout)?;

        Ok(lock_file)
    }

    fn read_record(&self) -> Result<Option<CachedTokenRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)?;
        let record: CachedTokenRecord = serde_json::from_str(&content)
            .map_err(|e| HtbError::Cache(format!("Invalid token cache: {}", e)))?;

        Ok(Some(record))
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<CachedTokenRecord> {
        match self.read_record() {
            Ok(Some(record)) if record.credentials().is_some() => Some(record),
            Ok(Some(_)) => {
                debug!("Token cache {} holds no usable credentials", self.path.display());
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Ignoring token cache {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn persist(&self, record: &CachedTokenRecord) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let lock = self.acquire_lock()?;

        let json = serde_json::to_string(record)?;

        // Atomic write: write to temp file, then rename
        let temp_path = sibling(&self.path, "tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }

        // Set secure permissions (Unix only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&temp_path, &self.path)?;
        FileExt::unlock(&lock)?;

        debug!("Persisted token cache to {}", self.path.display());
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// `tokens.json` -> `tokens.json.<suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}
