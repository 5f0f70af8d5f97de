//! Filesystem implementation of [`CommandStore`].

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use linkbridge_app::ports::CommandStore;
use linkbridge_domain::command::{CommandKey, Signal};
use linkbridge_domain::error::BridgeError;

use crate::error::StoreError;

const COMMANDS_DIR: &str = "commands";
const MACROS_DIR: &str = "macros";

/// Directory-backed command store.
///
/// Signals are stored as hex text, one file per command. Reads of a
/// namespaced key fall back to the shared root; writes always go to the
/// key's own namespace.
#[derive(Debug, Clone)]
pub struct FsCommandStore {
    root: PathBuf,
}

impl FsCommandStore {
    /// Create a store rooted at `root`. Directories are created on first
    /// write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, dir: &str, key: &CommandKey) -> PathBuf {
        let mut path = self.root.join(dir);
        if let Some(namespace) = &key.namespace {
            path.extend(namespace.segments());
        }
        path.extend(key.name.segments());
        path
    }

    fn lookup_paths(&self, dir: &str, key: &CommandKey) -> Vec<PathBuf> {
        let mut paths = vec![self.path(dir, key)];
        if key.namespace.is_some() {
            paths.push(self.path(dir, &key.shared()));
        }
        paths
    }

    async fn read_text(
        &self,
        dir: &str,
        key: &CommandKey,
    ) -> Result<Option<(PathBuf, String)>, StoreError> {
        for path in self.lookup_paths(dir, key) {
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => return Ok(Some((path, text))),
                Err(err) if is_missing(&err) => {}
                Err(source) => return Err(StoreError::Io { path, source }),
            }
        }
        Ok(None)
    }
}

impl CommandStore for FsCommandStore {
    async fn contains(&self, key: &CommandKey) -> bool {
        for path in self.lookup_paths(COMMANDS_DIR, key) {
            if tokio::fs::metadata(&path)
                .await
                .is_ok_and(|meta| meta.is_file())
            {
                return true;
            }
        }
        false
    }

    async fn load(&self, key: &CommandKey) -> Result<Option<Signal>, BridgeError> {
        let Some((path, text)) = self.read_text(COMMANDS_DIR, key).await? else {
            return Ok(None);
        };
        let signal =
            Signal::from_hex(&text).map_err(|source| StoreError::Corrupt { path, source })?;
        Ok(Some(signal))
    }

    async fn save(&self, key: &CommandKey, signal: &Signal) -> Result<(), BridgeError> {
        let path = self.path(COMMANDS_DIR, key);
        let contents = signal.to_hex();
        tracing::debug!(path = %path.display(), bytes = signal.len(), "writing signal");
        tokio::task::spawn_blocking(move || write_atomic(&path, contents.as_bytes()))
            .await
            .map_err(StoreError::from)??;
        Ok(())
    }

    async fn load_macro(&self, key: &CommandKey) -> Result<Option<String>, BridgeError> {
        Ok(self
            .read_text(MACROS_DIR, key)
            .await?
            .map(|(_, text)| text))
    }
}

fn is_missing(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::NotFound | ErrorKind::NotADirectory | ErrorKind::IsADirectory
    )
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let io_error = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(io_error)?;

    let mut file = NamedTempFile::new_in(parent).map_err(io_error)?;
    file.write_all(contents).map_err(io_error)?;
    file.as_file().sync_all().map_err(io_error)?;
    file.persist(path).map_err(|err| io_error(err.error))?;
    Ok(())
}
