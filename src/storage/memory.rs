//! In-memory storage - for tests and single-process deployments

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{Generation, Storage, StorageError, StorageResult, UrlMethod};

struct Entry {
    data: Vec<u8>,
    #[allow(dead_code)]
    mime_type: String,
    generation: Generation,
}

/// In-memory object store with compare-and-swap semantics.
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Entry>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read(&self, key: &str) -> StorageResult<(Vec<u8>, Generation)> {
        let objects = self.objects.lock().unwrap();
        let entry = objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok((entry.data.clone(), entry.generation.clone()))
    }

    async fn write(
        &self,
        key: &str,
        mime_type: &str,
        data: &[u8],
        expected: Option<&Generation>,
    ) -> StorageResult<Generation> {
        let mut objects = self.objects.lock().unwrap();

        match (objects.get(key), expected) {
            (Some(_), None) => return Err(StorageError::PreconditionFailed(key.to_string())),
            (Some(entry), Some(generation)) if entry.generation != *generation => {
                return Err(StorageError::PreconditionFailed(key.to_string()));
            }
            (None, Some(_)) => return Err(StorageError::NotFound(key.to_string())),
            _ => {}
        }

        let generation = Generation::new();
        objects.insert(
            key.to_string(),
            Entry {
                data: data.to_vec(),
                mime_type: mime_type.to_string(),
                generation: generation.clone(),
            },
        );
        Ok(generation)
    }

    async fn signed_url(
        &self,
        _key: &str,
        _method: UrlMethod,
        _ttl: Duration,
    ) -> StorageResult<String> {
        Err(StorageError::Unsupported(
            "memory storage cannot sign URLs".to_string(),
        ))
    }
}
