// ── Bridge registry ──
//
// Owns the set of known bridges and their durable store, a JSON array of
// `{id, ip, port, token, hashToken}`. Every mutation rewrites the whole
// file through a temp file in the same directory followed by a rename.
// File I/O runs on the blocking pool; `write_lock` is held across it so
// rewrites never interleave.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use nukly_api::{
    BridgeClient, BridgeRecord, DiscoveredBridge, DiscoveryClient, SigningMode, TransportConfig,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::CoreError;

/// Outcome of re-checking a stored credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Authenticated,
    /// The bridge answered 401; the token is no longer valid.
    Revoked,
}

pub struct BridgeRegistry {
    store_path: PathBuf,
    transport: TransportConfig,
    discovery: DiscoveryClient,
    signing: SigningMode,
    bridges: DashMap<u64, Arc<BridgeClient>>,
    write_lock: Mutex<()>,
}

impl BridgeRegistry {
    /// Create a registry backed by `store_path`. Nothing is read until
    /// [`load`](Self::load).
    pub fn new(
        store_path: impl Into<PathBuf>,
        transport: TransportConfig,
        discovery_url: &str,
        signing: SigningMode,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            store_path: store_path.into(),
            discovery: DiscoveryClient::new(discovery_url, &transport)?,
            transport,
            signing,
            bridges: DashMap::new(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    // ── Lookup ───────────────────────────────────────────────────────

    pub fn get(&self, id: u64) -> Option<Arc<BridgeClient>> {
        self.bridges.get(&id).map(|r| Arc::clone(r.value()))
    }

    /// All bridges, ordered by id.
    pub fn bridges(&self) -> Vec<Arc<BridgeClient>> {
        let mut all: Vec<_> = self.bridges.iter().map(|r| Arc::clone(r.value())).collect();
        all.sort_by_key(|b| b.id());
        all
    }

    pub fn len(&self) -> usize {
        self.bridges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }

    // ── Store ────────────────────────────────────────────────────────

    /// Populate the in-memory set from the store, creating an empty store
    /// if none exists. A malformed file fails as a whole and is left as
    /// it is.
    pub async fn load(&self) -> Result<usize, CoreError> {
        let _guard = self.write_lock.lock().await;

        let path = self.store_path.clone();
        let records = blocking(&self.store_path, move || read_store(&path)).await?;

        self.bridges.clear();
        for record in &records {
            let client = BridgeClient::new(record, &self.transport)?;
            self.bridges.insert(record.id, Arc::new(client));
        }
        info!(count = records.len(), "bridges loaded");
        Ok(records.len())
    }

    /// Insert or replace the bridge with `record.id` and rewrite the store.
    pub async fn persist(&self, record: &BridgeRecord) -> Result<Arc<BridgeClient>, CoreError> {
        let client = Arc::new(BridgeClient::new(record, &self.transport)?);
        let _guard = self.write_lock.lock().await;
        self.bridges.insert(record.id, Arc::clone(&client));
        self.flush().await?;
        info!(bridge = %client, "bridge stored");
        Ok(client)
    }

    /// Remove one bridge. Returns `false` if it was not known.
    pub async fn delete(&self, id: u64) -> Result<bool, CoreError> {
        let _guard = self.write_lock.lock().await;
        let removed = self.bridges.remove(&id).is_some();
        if removed {
            self.flush().await?;
            info!(bridge_id = id, "bridge removed");
        }
        Ok(removed)
    }

    pub async fn delete_all(&self) -> Result<(), CoreError> {
        let _guard = self.write_lock.lock().await;
        self.bridges.clear();
        self.flush().await
    }

    /// Replace the whole set with caller-supplied bridges (static mode).
    pub async fn replace_all(&self, records: &[BridgeRecord]) -> Result<(), CoreError> {
        let clients = records
            .iter()
            .map(|r| BridgeClient::new(r, &self.transport).map(|c| (r.id, Arc::new(c))))
            .collect::<Result<Vec<_>, _>>()?;

        let _guard = self.write_lock.lock().await;
        self.bridges.clear();
        for (id, client) in clients {
            self.bridges.insert(id, client);
        }
        self.flush().await
    }

    // ── Network ──────────────────────────────────────────────────────

    pub async fn discover(&self) -> Result<Vec<DiscoveredBridge>, CoreError> {
        Ok(self.discovery.discover().await?)
    }

    /// Pair with a candidate. The caller persists the result.
    pub async fn auth(&self, candidate: &DiscoveredBridge) -> Result<BridgeRecord, CoreError> {
        Ok(self.discovery.auth(candidate, self.signing).await?)
    }

    /// Re-check a stored bridge with `/info`.
    ///
    /// A bridge that reports a different id than it was stored under is
    /// re-keyed and the store rewritten.
    pub async fn verify(&self, bridge: &Arc<BridgeClient>) -> Result<Verification, CoreError> {
        let stored_id = bridge.id();
        match bridge.info().await {
            Ok(_) => {
                let current = bridge.id();
                if current != stored_id {
                    let _guard = self.write_lock.lock().await;
                    self.bridges.remove(&stored_id);
                    self.bridges.insert(current, Arc::clone(bridge));
                    self.flush().await?;
                    info!(previous = stored_id, bridge = %bridge, "bridge re-keyed");
                }
                Ok(Verification::Authenticated)
            }
            Err(e) if e.is_auth_failure() => {
                warn!(bridge = %bridge, "bridge rejected stored token");
                Ok(Verification::Revoked)
            }
            Err(e) => Err(e.into()),
        }
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Caller must hold `write_lock`.
    async fn flush(&self) -> Result<(), CoreError> {
        let records: Vec<BridgeRecord> = self.bridges().iter().map(|b| b.record()).collect();
        let path = self.store_path.clone();
        blocking(&self.store_path, move || write_store(&path, &records)).await
    }
}

/// Run store I/O on the blocking pool.
async fn blocking<T, F>(path: &Path, f: F) -> Result<T, CoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CoreError::storage(path, std::io::Error::other(e)))?
}

fn read_store(path: &Path) -> Result<Vec<BridgeRecord>, CoreError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => parse_store(path, &contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "creating empty bridge store");
            write_store(path, &[])?;
            Ok(Vec::new())
        }
        Err(e) => Err(CoreError::storage(path, e)),
    }
}

fn parse_store(path: &Path, contents: &str) -> Result<Vec<BridgeRecord>, CoreError> {
    serde_json::from_str(contents).map_err(|e| CoreError::Configuration {
        message: format!("malformed bridge store {}: {e}", path.display()),
    })
}

fn write_store(path: &Path, records: &[BridgeRecord]) -> Result<(), CoreError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| CoreError::storage(dir, e))?;

    let json = serde_json::to_vec_pretty(records).map_err(|e| CoreError::Configuration {
        message: format!("cannot serialize bridge store: {e}"),
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| CoreError::storage(dir, e))?;
    tmp.write_all(&json)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| CoreError::storage(path, e))?;
    tmp.persist(path)
        .map_err(|e| CoreError::storage(path, e.error))?;
    Ok(())
}
