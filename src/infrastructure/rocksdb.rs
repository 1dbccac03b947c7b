use super::{row_id, select_page};
use crate::domain::ports::{CustomerDirectory, FetchQuery, RecordUpdate, SourceAdapter};
use crate::domain::raw::{RawFields, RawRecord};
use crate::domain::record::SourceKind;
use crate::error::{Result, SourceError};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Column family holding the customer directory (id → name).
pub const CF_CUSTOMERS: &str = "customers";

/// Persistent backing collections using RocksDB.
///
/// Each source collection lives in its own column family named after the
/// collection, keyed by the row's primary id, with the raw row stored as JSON.
/// `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
}

fn storage_error(e: impl std::fmt::Display) -> SourceError {
    SourceError::Storage(e.to_string())
}

impl RocksDbStore {
    /// Opens or creates the database, ensuring one column family per source
    /// collection plus the customer directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = SourceKind::PRIORITY
            .iter()
            .map(|kind| kind.collection())
            .chain([CF_CUSTOMERS])
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, families).map_err(storage_error)?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn source(&self, kind: SourceKind) -> RocksDbSource {
        RocksDbSource {
            kind,
            store: self.clone(),
        }
    }

    fn cf(&self, name: &str) -> std::result::Result<&ColumnFamily, SourceError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| storage_error(format!("column family {name} not found")))
    }

    /// Upserts rows by primary id. Rows without an id are skipped. Returns the
    /// number stored.
    pub fn import_rows(&self, kind: SourceKind, rows: &[RawFields]) -> Result<usize> {
        let cf = self.cf(kind.collection())?;
        let mut stored = 0;
        for row in rows {
            let Some(id) = row_id(kind, row) else {
                continue;
            };
            let value = serde_json::to_vec(row)?;
            self.db.put_cf(&cf, id.as_bytes(), value).map_err(storage_error)?;
            stored += 1;
        }
        debug!(source = %kind, stored, "rows imported");
        Ok(stored)
    }

    pub fn import_customers(&self, customers: &HashMap<String, String>) -> Result<()> {
        let cf = self.cf(CF_CUSTOMERS)?;
        for (id, name) in customers {
            self.db
                .put_cf(&cf, id.as_bytes(), name.as_bytes())
                .map_err(storage_error)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> std::result::Result<bool, SourceError> {
        for kind in SourceKind::PRIORITY {
            let cf = self.cf(kind.collection())?;
            if self.db.iterator_cf(cf, IteratorMode::Start).next().is_some() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn rows(&self, kind: SourceKind) -> std::result::Result<Vec<RawFields>, SourceError> {
        let cf = self.cf(kind.collection())?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item.map_err(storage_error)?;
            rows.push(serde_json::from_slice(&value).map_err(storage_error)?);
        }
        Ok(rows)
    }
}

/// One collection of a [`RocksDbStore`] seen as a source adapter.
#[derive(Clone)]
pub struct RocksDbSource {
    kind: SourceKind,
    store: RocksDbStore,
}

#[async_trait]
impl SourceAdapter for RocksDbSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self, query: &FetchQuery) -> std::result::Result<Vec<RawRecord>, SourceError> {
        let rows = self.store.rows(self.kind)?;
        Ok(select_page(self.kind, rows, query))
    }

    async fn write(&self, update: RecordUpdate) -> std::result::Result<(), SourceError> {
        let cf = self.store.cf(self.kind.collection())?;
        let key = update.id.as_bytes();
        let bytes = self
            .store
            .db
            .get_cf(&cf, key)
            .map_err(storage_error)?
            .ok_or_else(|| SourceError::NotFound {
                source_kind: self.kind,
                id: update.id.clone(),
            })?;

        let mut row: RawFields = serde_json::from_slice(&bytes).map_err(storage_error)?;
        row.extend(update.fields.clone());
        let value = serde_json::to_vec(&row).map_err(storage_error)?;
        self.store.db.put_cf(&cf, key, value).map_err(storage_error)?;
        Ok(())
    }
}

#[async_trait]
impl CustomerDirectory for RocksDbStore {
    async fn bulk_load(&self) -> std::result::Result<HashMap<String, String>, SourceError> {
        let cf = self.cf(CF_CUSTOMERS)?;
        let mut names = HashMap::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item.map_err(storage_error)?;
            names.insert(
                String::from_utf8_lossy(&key).into_owned(),
                String::from_utf8_lossy(&value).into_owned(),
            );
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn row(value: serde_json::Value) -> RawFields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).expect("Failed to open RocksDB");

        for kind in SourceKind::PRIORITY {
            assert!(store.db.cf_handle(kind.collection()).is_some());
        }
        assert!(store.db.cf_handle(CF_CUSTOMERS).is_some());
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_rocksdb_source_roundtrip_and_update() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        let stored = store
            .import_rows(
                SourceKind::RepairPayment,
                &[
                    row(json!({ "id": "r1", "payment_status": "pending", "created_at": "2025-09-17" })),
                    row(json!({ "amount": 5 })),
                ],
            )
            .unwrap();
        assert_eq!(stored, 1);

        let source = store.source(SourceKind::RepairPayment);
        let mut fields = RawFields::new();
        fields.insert("payment_status".into(), json!("completed"));
        source
            .write(RecordUpdate {
                id: "r1".into(),
                fields,
            })
            .await
            .unwrap();

        let fetched = source.fetch(&FetchQuery::default()).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].fields()["payment_status"], "completed");
        assert_eq!(fetched[0].fields()["created_at"], "2025-09-17");

        let missing = source
            .write(RecordUpdate {
                id: "r2".into(),
                fields: RawFields::new(),
            })
            .await;
        assert!(matches!(missing, Err(SourceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_rocksdb_customer_directory() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        store
            .import_customers(&HashMap::from([("c-1".to_string(), "Zawadi".to_string())]))
            .unwrap();

        let names = store.bulk_load().await.unwrap();
        assert_eq!(names["c-1"], "Zawadi");
    }
}
