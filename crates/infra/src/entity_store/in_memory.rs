use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use botforge_auth::ResourceType;

use super::r#trait::{DanglingResource, EntityRecord, EntityStore, StoreError, StoreTransaction};

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<(ResourceType, Uuid), EntityRecord>,
    index: HashMap<Uuid, ResourceType>,
}

impl Tables {
    fn contains(&self, resource_type: ResourceType, id: Uuid) -> bool {
        self.rows.contains_key(&(resource_type, id))
    }
}

#[derive(Debug, Clone)]
enum StagedWrite {
    Insert(EntityRecord),
    Delete(ResourceType, Uuid),
}

/// In-memory transactional entity store.
///
/// Intended for tests/dev. Writes are staged per transaction and only become
/// visible on commit, so a rolled-back (or dropped) transaction leaves no trace.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    tables: Arc<RwLock<Tables>>,
    dangling: RwLock<HashMap<String, DanglingResource>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make the next commit fail with a backend error (test hook).
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Insert a committed row without an index entry, as rows created before
    /// the resource index existed look.
    pub fn insert_unindexed(&self, record: EntityRecord) -> Result<(), StoreError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        tables.rows.insert((record.resource_type, record.id), record);
        Ok(())
    }

    /// Number of committed rows across all entity tables.
    pub fn len(&self) -> usize {
        self.tables.read().map(|t| t.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(InMemoryTransaction {
            tables: self.tables.clone(),
            fail_next_commit: self.fail_next_commit.clone(),
            staged: Vec::new(),
            finished: false,
        }))
    }

    async fn find(&self, resource_type: ResourceType, id: Uuid) -> Result<Option<EntityRecord>, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(tables.rows.get(&(resource_type, id)).cloned())
    }

    async fn indexed_type(&self, id: Uuid) -> Result<Option<ResourceType>, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(tables.index.get(&id).copied())
    }

    async fn record_dangling(&self, entry: DanglingResource) -> Result<(), StoreError> {
        let mut dangling = self
            .dangling
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        dangling
            .entry(entry.resource_id.clone())
            .and_modify(|existing| {
                existing.attempts += 1;
                existing.reason = entry.reason.clone();
            })
            .or_insert(entry);
        Ok(())
    }

    async fn dangling_resources(&self, limit: usize) -> Result<Vec<DanglingResource>, StoreError> {
        let dangling = self
            .dangling
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        let mut entries: Vec<_> = dangling.values().cloned().collect();
        entries.sort_by(|a, b| {
            a.recorded_at
                .cmp(&b.recorded_at)
                .then_with(|| a.resource_id.cmp(&b.resource_id))
        });
        entries.truncate(limit);
        Ok(entries)
    }

    async fn clear_dangling(&self, resource_id: &str) -> Result<(), StoreError> {
        let mut dangling = self
            .dangling
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        dangling.remove(resource_id);
        Ok(())
    }
}

struct InMemoryTransaction {
    tables: Arc<RwLock<Tables>>,
    fail_next_commit: Arc<AtomicBool>,
    staged: Vec<StagedWrite>,
    finished: bool,
}

impl InMemoryTransaction {
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.finished {
            Err(StoreError::TransactionFinished)
        } else {
            Ok(())
        }
    }

    /// Whether the row would exist if the transaction committed now.
    fn visible(&self, tables: &Tables, resource_type: ResourceType, id: Uuid) -> bool {
        let mut exists = tables.contains(resource_type, id);
        for write in &self.staged {
            match write {
                StagedWrite::Insert(r) if r.resource_type == resource_type && r.id == id => exists = true,
                StagedWrite::Delete(t, i) if *t == resource_type && *i == id => exists = false,
                _ => {}
            }
        }
        exists
    }
}

#[async_trait::async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn insert(&mut self, record: &EntityRecord) -> Result<(), StoreError> {
        self.ensure_open()?;
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        if self.visible(&tables, record.resource_type, record.id) || tables.index.contains_key(&record.id) {
            return Err(StoreError::Conflict(format!(
                "{} {} already exists",
                record.resource_type, record.id
            )));
        }
        drop(tables);

        self.staged.push(StagedWrite::Insert(record.clone()));
        Ok(())
    }

    async fn delete(&mut self, resource_type: ResourceType, id: Uuid) -> Result<bool, StoreError> {
        self.ensure_open()?;
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        let existed = self.visible(&tables, resource_type, id);
        drop(tables);

        if existed {
            self.staged.push(StagedWrite::Delete(resource_type, id));
        }
        Ok(existed)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.finished = true;

        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            self.staged.clear();
            return Err(StoreError::Backend("injected commit failure".to_string()));
        }

        let mut tables = self
            .tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        // Re-validate inserts against rows committed since they were staged.
        for write in &self.staged {
            if let StagedWrite::Insert(r) = write {
                if tables.index.contains_key(&r.id) {
                    return Err(StoreError::Conflict(format!(
                        "{} {} was created concurrently",
                        r.resource_type, r.id
                    )));
                }
            }
        }

        for write in self.staged.drain(..) {
            match write {
                StagedWrite::Insert(r) => {
                    tables.index.insert(r.id, r.resource_type);
                    tables.rows.insert((r.resource_type, r.id), r);
                }
                StagedWrite::Delete(t, id) => {
                    tables.rows.remove(&(t, id));
                    if tables.index.get(&id) == Some(&t) {
                        tables.index.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.finished = true;
        self.staged.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use botforge_core::OwnerId;

    use super::*;

    fn record(resource_type: ResourceType) -> EntityRecord {
        EntityRecord {
            id: Uuid::now_v7(),
            resource_type,
            name: "alpha".to_string(),
            owner_id: OwnerId::new("user-1").unwrap(),
            public: false,
            payload: json!({}),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn staged_insert_is_invisible_until_commit() {
        let store = InMemoryEntityStore::new();
        let r = record(ResourceType::Bot);

        let mut tx = store.begin().await.unwrap();
        tx.insert(&r).await.unwrap();
        assert!(store.find(ResourceType::Bot, r.id).await.unwrap().is_none());

        tx.commit().await.unwrap();
        assert_eq!(store.find(ResourceType::Bot, r.id).await.unwrap(), Some(r.clone()));
        assert_eq!(store.indexed_type(r.id).await.unwrap(), Some(ResourceType::Bot));
    }

    #[tokio::test]
    async fn rollback_and_drop_discard_writes() {
        let store = InMemoryEntityStore::new();
        let r = record(ResourceType::Strategy);

        let mut tx = store.begin().await.unwrap();
        tx.insert(&r).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(tx.commit().await.is_err());

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert(&r).await.unwrap();
        }

        assert!(store.is_empty());
        assert!(store.indexed_type(r.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_conflicts() {
        let store = InMemoryEntityStore::new();
        let r = record(ResourceType::Runner);

        let mut tx = store.begin().await.unwrap();
        tx.insert(&r).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(tx.insert(&r).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn delete_removes_row_and_index() {
        let store = InMemoryEntityStore::new();
        let r = record(ResourceType::Exchange);
        let mut tx = store.begin().await.unwrap();
        tx.insert(&r).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.delete(ResourceType::Exchange, r.id).await.unwrap());
        assert!(!tx.delete(ResourceType::Exchange, r.id).await.unwrap());
        tx.commit().await.unwrap();

        assert!(store.find(ResourceType::Exchange, r.id).await.unwrap().is_none());
        assert!(store.indexed_type(r.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn injected_commit_failure_discards_writes_once() {
        let store = InMemoryEntityStore::new();
        store.fail_next_commit();

        let mut tx = store.begin().await.unwrap();
        tx.insert(&record(ResourceType::Bot)).await.unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::Backend(_))));
        assert!(store.is_empty());

        let mut tx = store.begin().await.unwrap();
        tx.insert(&record(ResourceType::Bot)).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn dangling_ledger_counts_attempts() {
        let store = InMemoryEntityStore::new();
        store
            .record_dangling(DanglingResource::new("r-1", ResourceType::Bot, "timeout"))
            .await
            .unwrap();
        store
            .record_dangling(DanglingResource::new("r-1", ResourceType::Bot, "503"))
            .await
            .unwrap();

        let entries = store.dangling_resources(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].attempts, 2);
        assert_eq!(entries[0].reason, "503");

        store.clear_dangling("r-1").await.unwrap();
        assert!(store.dangling_resources(10).await.unwrap().is_empty());
    }
}
