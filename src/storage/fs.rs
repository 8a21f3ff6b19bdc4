//! Filesystem storage - local object store with sidecar metadata

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Generation, Storage, StorageError, StorageResult, UrlMethod};

/// Sidecar metadata stored next to each object.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Metadata {
    mime_type: String,
    generation: String,
}

/// Local-filesystem object store.
///
/// Objects live under a root directory; the mime type and generation of
/// each object sit in a `<key>.meta.json` sidecar. Compare-and-swap is
/// serialized through a process-wide lock, so the guarantee only covers
/// writers inside one process.
pub struct FsStorage {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Mutex::new(()),
        }
    }

    fn object_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(StorageError::Unsupported(format!("invalid key: {key:?}")));
        }
        Ok(self.root.join(key))
    }

    fn meta_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".meta.json");
        path.with_file_name(name)
    }

    fn read_metadata(path: &Path) -> StorageResult<Option<Metadata>> {
        let meta_path = Self::meta_path(path);
        if !meta_path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&meta_path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn read(&self, key: &str) -> StorageResult<(Vec<u8>, Generation)> {
        let path = self.object_path(key)?;
        let _guard = self.lock.lock().unwrap();

        let metadata = Self::read_metadata(&path)?
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        let data = std::fs::read(&path)?;
        Ok((data, Generation::from(metadata.generation)))
    }

    async fn write(
        &self,
        key: &str,
        mime_type: &str,
        data: &[u8],
        expected: Option<&Generation>,
    ) -> StorageResult<Generation> {
        let path = self.object_path(key)?;
        let _guard = self.lock.lock().unwrap();

        let current = Self::read_metadata(&path)?;
        match (&current, expected) {
            (Some(_), None) => return Err(StorageError::PreconditionFailed(key.to_string())),
            (Some(metadata), Some(generation)) if metadata.generation != generation.as_str() => {
                return Err(StorageError::PreconditionFailed(key.to_string()));
            }
            (None, Some(_)) => return Err(StorageError::NotFound(key.to_string())),
            _ => {}
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let generation = Generation::new();
        let metadata = Metadata {
            mime_type: mime_type.to_string(),
            generation: generation.as_str().to_string(),
        };
        std::fs::write(&path, data)?;
        std::fs::write(
            Self::meta_path(&path),
            serde_json::to_string_pretty(&metadata)?,
        )?;
        Ok(generation)
    }

    async fn signed_url(
        &self,
        key: &str,
        method: UrlMethod,
        _ttl: Duration,
    ) -> StorageResult<String> {
        if method == UrlMethod::Put {
            return Err(StorageError::Unsupported(
                "filesystem storage cannot sign upload URLs".to_string(),
            ));
        }

        let path = self.object_path(key)?;
        if !path.exists() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(format!("file://{}", path.display()))
    }
}
