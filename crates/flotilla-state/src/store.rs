//! RedbStore — redb-backed job and tag persistence.
//!
//! The control plane consumes the `JobStore` and `TagStore` traits; the
//! backing engine only has to provide atomic CRUD, so SQL or managed NoSQL
//! implementations can stand in behind the same traits. `RedbStore` is the
//! embedded implementation used by the daemons and by tests.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use flotilla_core::{Job, JobStatus, JobType, Tag};

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// CRUD over persisted job records.
pub trait JobStore: Send + Sync {
    fn insert(&self, job: &Job) -> StateResult<()>;
    /// Delete a job by id. Returns true if it existed.
    fn delete(&self, job_id: &str) -> StateResult<bool>;
    fn select_by_id(&self, job_id: &str) -> StateResult<Option<Job>>;
    fn select_all(&self) -> StateResult<Vec<Job>>;
    fn select_by_type(&self, job_type: JobType) -> StateResult<Vec<Job>>;
    /// Update a job's status, stamping `last_updated`.
    fn update_status(&self, job_id: &str, status: JobStatus) -> StateResult<()>;
    /// Set one meta key on a job, stamping `last_updated`.
    fn set_meta(&self, job_id: &str, key: &str, value: &str) -> StateResult<()>;
}

/// CRUD over tag records.
pub trait TagStore: Send + Sync {
    fn insert(&self, tag: &Tag) -> StateResult<()>;
    /// Delete a tag by its composite identity. Returns true if it existed.
    fn delete(&self, entity_type: &str, entity_id: &str, key: &str) -> StateResult<bool>;
    fn select_all(&self) -> StateResult<Vec<Tag>>;
    fn select_by_type(&self, entity_type: &str) -> StateResult<Vec<Tag>>;
}

/// Thread-safe store backed by redb.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(JOBS).map_err(map_err!(Table))?;
        txn.open_table(TAGS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Read-modify-write a job record inside one write transaction.
    fn update_job<F>(&self, job_id: &str, mutate: F) -> StateResult<()>
    where
        F: FnOnce(&mut Job),
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(JOBS).map_err(map_err!(Table))?;
            let bytes = table
                .get(job_id)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value().to_vec())
                .ok_or_else(|| StateError::NotFound(job_id.to_string()))?;
            let mut job: Job =
                serde_json::from_slice(&bytes).map_err(map_err!(Deserialize))?;
            mutate(&mut job);
            job.last_updated = epoch_secs();
            let value = serde_json::to_vec(&job).map_err(map_err!(Serialize))?;
            table
                .insert(job_id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

impl JobStore for RedbStore {
    fn insert(&self, job: &Job) -> StateResult<()> {
        let value = serde_json::to_vec(job).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(JOBS).map_err(map_err!(Table))?;
            table
                .insert(job.job_id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(job_id = %job.job_id, "job stored");
        Ok(())
    }

    fn delete(&self, job_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(JOBS).map_err(map_err!(Table))?;
            existed = table.remove(job_id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%job_id, existed, "job deleted");
        Ok(existed)
    }

    fn select_by_id(&self, job_id: &str) -> StateResult<Option<Job>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(JOBS).map_err(map_err!(Table))?;
        match table.get(job_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let job: Job =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    fn select_all(&self) -> StateResult<Vec<Job>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(JOBS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let job: Job =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(job);
        }
        Ok(results)
    }

    fn select_by_type(&self, job_type: JobType) -> StateResult<Vec<Job>> {
        let all = JobStore::select_all(self)?;
        Ok(all.into_iter().filter(|j| j.job_type == job_type).collect())
    }

    fn update_status(&self, job_id: &str, status: JobStatus) -> StateResult<()> {
        self.update_job(job_id, |job| job.job_status = status)?;
        debug!(%job_id, ?status, "job status updated");
        Ok(())
    }

    fn set_meta(&self, job_id: &str, key: &str, value: &str) -> StateResult<()> {
        self.update_job(job_id, |job| {
            job.meta.insert(key.to_string(), value.to_string());
        })
    }
}

impl TagStore for RedbStore {
    fn insert(&self, tag: &Tag) -> StateResult<()> {
        let key = tag_key(&tag.entity_type, &tag.entity_id, &tag.key);
        let value = serde_json::to_vec(tag).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(TAGS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn delete(&self, entity_type: &str, entity_id: &str, key: &str) -> StateResult<bool> {
        let composite = tag_key(entity_type, entity_id, key);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(TAGS).map_err(map_err!(Table))?;
            existed = table
                .remove(composite.as_str())
                .map_err(map_err!(Write))?
                .is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    fn select_all(&self) -> StateResult<Vec<Tag>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TAGS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let tag: Tag =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(tag);
        }
        Ok(results)
    }

    fn select_by_type(&self, entity_type: &str) -> StateResult<Vec<Tag>> {
        let prefix = format!("{entity_type}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TAGS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let tag: Tag =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(tag);
            }
        }
        Ok(results)
    }
}

fn tag_key(entity_type: &str, entity_id: &str, key: &str) -> String {
    format!("{entity_type}:{entity_id}:{key}")
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_job(job_id: &str, job_type: JobType) -> Job {
        Job {
            job_id: job_id.to_string(),
            task_id: String::new(),
            job_status: JobStatus::Pending,
            job_type,
            request: "env-1".to_string(),
            time_created: 1000,
            last_updated: 1000,
            meta: HashMap::new(),
        }
    }

    fn test_tag(entity_type: &str, entity_id: &str, key: &str) -> Tag {
        Tag {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            key: key.to_string(),
            value: "v".to_string(),
        }
    }

    // ── Job CRUD ───────────────────────────────────────────────────

    #[test]
    fn job_insert_and_select() {
        let store = RedbStore::open_in_memory().unwrap();
        let job = test_job("j-1", JobType::DeleteEnvironment);

        JobStore::insert(&store, &job).unwrap();
        let retrieved = store.select_by_id("j-1").unwrap();

        assert_eq!(retrieved, Some(job));
    }

    #[test]
    fn job_select_nonexistent_returns_none() {
        let store = RedbStore::open_in_memory().unwrap();
        assert!(store.select_by_id("nope").unwrap().is_none());
    }

    #[test]
    fn job_select_all() {
        let store = RedbStore::open_in_memory().unwrap();
        JobStore::insert(&store, &test_job("j-1", JobType::CreateTask)).unwrap();
        JobStore::insert(&store, &test_job("j-2", JobType::DeleteService)).unwrap();

        assert_eq!(JobStore::select_all(&store).unwrap().len(), 2);
    }

    #[test]
    fn job_select_by_type_filters() {
        let store = RedbStore::open_in_memory().unwrap();
        JobStore::insert(&store, &test_job("j-1", JobType::CreateTask)).unwrap();
        JobStore::insert(&store, &test_job("j-2", JobType::CreateTask)).unwrap();
        JobStore::insert(&store, &test_job("j-3", JobType::DeleteTask)).unwrap();

        let create = JobStore::select_by_type(&store, JobType::CreateTask).unwrap();
        assert_eq!(create.len(), 2);
        assert!(create.iter().all(|j| j.job_type == JobType::CreateTask));
    }

    #[test]
    fn job_delete() {
        let store = RedbStore::open_in_memory().unwrap();
        JobStore::insert(&store, &test_job("j-1", JobType::DeleteTask)).unwrap();

        assert!(JobStore::delete(&store, "j-1").unwrap());
        assert!(!JobStore::delete(&store, "j-1").unwrap());
        assert!(store.select_by_id("j-1").unwrap().is_none());
    }

    #[test]
    fn job_update_status_stamps_last_updated() {
        let store = RedbStore::open_in_memory().unwrap();
        JobStore::insert(&store, &test_job("j-1", JobType::CreateTask)).unwrap();

        store.update_status("j-1", JobStatus::InProgress).unwrap();

        let job = store.select_by_id("j-1").unwrap().unwrap();
        assert_eq!(job.job_status, JobStatus::InProgress);
        assert!(job.last_updated > 1000);
    }

    #[test]
    fn job_update_status_missing_is_not_found() {
        let store = RedbStore::open_in_memory().unwrap();
        let result = store.update_status("nope", JobStatus::Completed);
        assert!(matches!(result, Err(StateError::NotFound(_))));
    }

    #[test]
    fn job_set_meta_accumulates() {
        let store = RedbStore::open_in_memory().unwrap();
        JobStore::insert(&store, &test_job("j-1", JobType::CreateTask)).unwrap();

        store.set_meta("j-1", "task_id", "t-1").unwrap();
        store.set_meta("j-1", "attempt", "2").unwrap();

        let job = store.select_by_id("j-1").unwrap().unwrap();
        assert_eq!(job.meta.get("task_id").map(String::as_str), Some("t-1"));
        assert_eq!(job.meta.get("attempt").map(String::as_str), Some("2"));
    }

    // ── Tag CRUD ───────────────────────────────────────────────────

    #[test]
    fn tag_insert_and_select_by_type() {
        let store = RedbStore::open_in_memory().unwrap();
        TagStore::insert(&store, &test_tag("task", "t-1", "name")).unwrap();
        TagStore::insert(&store, &test_tag("task", "t-2", "name")).unwrap();
        TagStore::insert(&store, &test_tag("service", "s-1", "name")).unwrap();

        let tasks = TagStore::select_by_type(&store, "task").unwrap();
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.entity_type == "task"));
    }

    #[test]
    fn tag_delete_is_scoped_to_composite_key() {
        let store = RedbStore::open_in_memory().unwrap();
        TagStore::insert(&store, &test_tag("task", "t-1", "name")).unwrap();
        TagStore::insert(&store, &test_tag("task", "t-1", "deploy_id")).unwrap();

        assert!(TagStore::delete(&store, "task", "t-1", "name").unwrap());
        assert!(!TagStore::delete(&store, "task", "t-1", "name").unwrap());

        let remaining = TagStore::select_by_type(&store, "task").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].key, "deploy_id");
    }

    #[test]
    fn tag_select_all_spans_types() {
        let store = RedbStore::open_in_memory().unwrap();
        TagStore::insert(&store, &test_tag("task", "t-1", "name")).unwrap();
        TagStore::insert(&store, &test_tag("job", "j-1", "task_id")).unwrap();

        assert_eq!(TagStore::select_all(&store).unwrap().len(), 2);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = RedbStore::open(&db_path).unwrap();
            JobStore::insert(&store, &test_job("j-1", JobType::DeleteEnvironment)).unwrap();
        }

        let store = RedbStore::open(&db_path).unwrap();
        let job = store.select_by_id("j-1").unwrap();
        assert!(job.is_some());
        assert_eq!(job.unwrap().job_type, JobType::DeleteEnvironment);
    }

    // ── Edge cases ─────────────────────────────────────────────────

    #[test]
    fn empty_store_operations() {
        let store = RedbStore::open_in_memory().unwrap();

        assert!(JobStore::select_all(&store).unwrap().is_empty());
        assert!(TagStore::select_all(&store).unwrap().is_empty());
        assert!(TagStore::select_by_type(&store, "task").unwrap().is_empty());
        assert!(!JobStore::delete(&store, "nope").unwrap());
        assert!(!TagStore::delete(&store, "task", "nope", "k").unwrap());
    }
}
