//! File-backed accessory host used by `nukly run`.
//!
//! Keeps the registered accessories in `<storage>/accessories.json` so a
//! restart can route callbacks before the first device listing, and logs
//! every published projection.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use nukly_api::DeviceId;
use nukly_core::{AccessoryHost, AccessoryRecord, CoreError, DeviceProjection};
use tracing::{debug, info, warn};

pub const JOURNAL_FILE: &str = "accessories.json";

pub struct JournalHost {
    path: PathBuf,
    records: Mutex<BTreeMap<DeviceId, AccessoryRecord>>,
}

impl JournalHost {
    /// Read the journal under `storage`. Unreadable entries are skipped.
    pub fn open(storage: &Path) -> Self {
        let path = storage.join(JOURNAL_FILE);
        let records = read_journal(&path);
        debug!(path = %path.display(), count = records.len(), "accessory journal loaded");
        Self {
            path,
            records: Mutex::new(records),
        }
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut BTreeMap<DeviceId, AccessoryRecord>),
    ) -> Result<(), CoreError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut records);
        let all: Vec<&AccessoryRecord> = records.values().collect();
        write_journal(&self.path, &all)
    }
}

impl AccessoryHost for JournalHost {
    fn cached_accessories(&self) -> Vec<AccessoryRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn register(&self, accessories: &[AccessoryRecord]) -> Result<(), CoreError> {
        for a in accessories {
            info!(
                device_id = %a.id,
                name = %a.name,
                device_type = %a.device_type,
                "accessory registered"
            );
        }
        self.update(|records| {
            for a in accessories {
                records.insert(a.id.clone(), a.clone());
            }
        })
    }

    fn unregister(&self, accessories: &[AccessoryRecord]) -> Result<(), CoreError> {
        for a in accessories {
            info!(device_id = %a.id, name = %a.name, "accessory unregistered");
        }
        self.update(|records| {
            for a in accessories {
                records.remove(&a.id);
            }
        })
    }

    fn publish(&self, device: &DeviceId, projection: &DeviceProjection) {
        let state = serde_json::to_string(projection).unwrap_or_default();
        info!(device_id = %device, %state, "state published");
    }
}

fn read_journal(path: &Path) -> BTreeMap<DeviceId, AccessoryRecord> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read accessory journal");
            return BTreeMap::new();
        }
    };

    let entries: Vec<serde_json::Value> = match serde_json::from_str(&contents) {
        Ok(v) => v,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "accessory journal is not a JSON array");
            return BTreeMap::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<AccessoryRecord>(entry) {
            Ok(record) => Some((record.id.clone(), record)),
            Err(e) => {
                warn!(error = %e, "skipping unreadable accessory record");
                None
            }
        })
        .collect()
}

fn write_journal(path: &Path, records: &[&AccessoryRecord]) -> Result<(), CoreError> {
    let storage_err = |source: std::io::Error| CoreError::Storage {
        path: path.display().to_string(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(storage_err)?;

    let json = serde_json::to_vec_pretty(records).map_err(|e| CoreError::Configuration {
        message: format!("cannot serialize accessory journal: {e}"),
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(storage_err)?;
    tmp.write_all(&json).map_err(storage_err)?;
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use nukly_api::DeviceType;

    use super::*;

    fn record(id: &str) -> AccessoryRecord {
        AccessoryRecord {
            id: DeviceId::from(id),
            name: format!("lock {id}"),
            device_type: DeviceType::SmartLock,
            bridge_id: 9,
        }
    }

    #[test]
    fn register_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let host = JournalHost::open(dir.path());
        host.register(&[record("1"), record("2")]).unwrap();
        host.unregister(&[record("1")]).unwrap();

        let reopened = JournalHost::open(dir.path());
        assert_eq!(reopened.cached_accessories(), vec![record("2")]);
    }

    #[test]
    fn unreadable_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(JOURNAL_FILE),
            r#"[
                {"id": "1", "name": "front", "deviceType": 0, "bridgeId": 9},
                {"id": "2", "name": "odd", "deviceType": 7, "bridgeId": 9},
                {"name": "no id"}
            ]"#,
        )
        .unwrap();

        let cached = JournalHost::open(dir.path()).cached_accessories();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].id, DeviceId::from("1"));
    }

    #[test]
    fn missing_or_garbled_journal_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(JournalHost::open(dir.path()).cached_accessories().is_empty());

        std::fs::write(dir.path().join(JOURNAL_FILE), "{").unwrap();
        assert!(JournalHost::open(dir.path()).cached_accessories().is_empty());
    }
}
