//! Exact in-process vector store.
//!
//! Documents live in an ordered map guarded by a `RwLock`; k-NN is a full
//! cosine scan with the filter applied before ranking. An optional snapshot
//! file makes the store survive restarts; it is written off the runtime after
//! the map lock is released, one writer at a time.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::sync::Mutex;

use flixdb_core::deadline::blocking;
use flixdb_core::math::cosine_distance;
use flixdb_core::traits::VectorStore;
use flixdb_core::types::{DocId, Document, Filter, VectorHit};
use flixdb_core::{Error, Result};

pub struct FlatIndex {
    dim: usize,
    docs: RwLock<BTreeMap<DocId, Document>>,
    snapshot: Option<PathBuf>,
    persist_lock: Mutex<()>,
}

impl FlatIndex {
    pub fn new(dim: usize) -> Self {
        Self { dim, docs: RwLock::new(BTreeMap::new()), snapshot: None, persist_lock: Mutex::new(()) }
    }

    /// Store persisted to `path` as JSON after every mutation. An existing
    /// snapshot is loaded.
    pub fn open(path: &Path, dim: usize) -> Result<Self> {
        let mut docs = BTreeMap::new();
        if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(Error::index)?;
            let loaded: Vec<Document> = serde_json::from_str(&raw).map_err(Error::index)?;
            for d in loaded {
                docs.insert(d.id.clone(), d);
            }
            tracing::debug!(path = %path.display(), docs = docs.len(), "loaded vector snapshot");
        }
        Ok(Self { dim, docs: RwLock::new(docs), snapshot: Some(path.to_path_buf()), persist_lock: Mutex::new(()) })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<DocId, Document>>> {
        self.docs.read().map_err(|_| Error::index("vector store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<DocId, Document>>> {
        self.docs.write().map_err(|_| Error::index("vector store lock poisoned"))
    }

    // Serializing under `persist_lock` keeps snapshots in mutation order.
    async fn persist(&self) -> Result<()> {
        let Some(path) = self.snapshot.clone() else { return Ok(()) };
        let _writer = self.persist_lock.lock().await;
        let bytes = {
            let map = self.read()?;
            let all: Vec<&Document> = map.values().collect();
            serde_json::to_vec(&all).map_err(Error::index)?
        };
        blocking(move || write_snapshot(&path, &bytes)).await
    }
}

fn write_snapshot(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(Error::index)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes).map_err(Error::index)?;
    std::fs::rename(&tmp, path).map_err(Error::index)
}

pub(crate) fn by_distance_then_id(a: &VectorHit, b: &VectorHit) -> Ordering {
    a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal).then_with(|| a.document.id.cmp(&b.document.id))
}

#[async_trait]
impl VectorStore for FlatIndex {
    async fn upsert(&self, docs: &[Document]) -> Result<()> {
        for d in docs {
            if let Some(v) = &d.embedding {
                if v.len() != self.dim {
                    return Err(Error::EmbeddingFailure(format!(
                        "document {} has {}-dim embedding, index expects {}",
                        d.id,
                        v.len(),
                        self.dim
                    )));
                }
            }
        }
        {
            let mut map = self.write()?;
            for d in docs {
                map.insert(d.id.clone(), d.clone());
            }
        }
        self.persist().await
    }

    async fn knn(&self, query: &[f32], k: usize, filter: &Filter) -> Result<Vec<VectorHit>> {
        if query.len() != self.dim {
            return Err(Error::EmbeddingFailure(format!("query has {} dims, index expects {}", query.len(), self.dim)));
        }
        let map = self.read()?;
        let mut hits: Vec<VectorHit> = map
            .values()
            .filter(|d| filter.matches(d))
            .filter_map(|d| {
                d.embedding.as_ref().map(|v| VectorHit { distance: cosine_distance(query, v), document: d.clone() })
            })
            .collect();
        hits.sort_by(by_distance_then_id);
        hits.truncate(k);
        Ok(hits)
    }

    async fn distances(&self, query: &[f32], ids: &[DocId]) -> Result<HashMap<DocId, f32>> {
        let map = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| {
                let v = map.get(id)?.embedding.as_ref()?;
                Some((id.clone(), cosine_distance(query, v)))
            })
            .collect())
    }

    async fn fetch(&self, ids: &[DocId]) -> Result<Vec<Document>> {
        let map = self.read()?;
        Ok(ids.iter().filter_map(|id| map.get(id).cloned()).collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    async fn clear(&self) -> Result<()> {
        self.write()?.clear();
        self.persist().await
    }
}
