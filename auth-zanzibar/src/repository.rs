use crate::{
    error::{Result, ZanzibarError},
    models::*,
};
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;

pub mod postgres;

pub use postgres::PostgresTupleStore;

/// Durable storage of relationship tuples
#[async_trait]
pub trait TupleStore: Send + Sync {
    /// Insert unless the key already exists; returns the canonical row either way
    async fn put(&self, request: WriteTupleRequest) -> Result<StoredTuple>;

    /// All tuples for `namespace:object_id#relation`
    async fn find(&self, namespace: &str, object_id: &str, relation: &str) -> Result<Vec<StoredTuple>>;

    /// Reverse lookup by subject, optionally narrowed to one relation
    async fn find_by_subject(
        &self,
        subject_namespace: &str,
        subject_id: &str,
        relation: Option<&str>,
    ) -> Result<Vec<StoredTuple>>;

    /// Remove a tuple; returns whether a row existed
    async fn delete(&self, key: &TupleKey) -> Result<bool>;

    /// Delete `old` and insert `new` atomically
    async fn replace(&self, old: &TupleKey, new: WriteTupleRequest) -> Result<StoredTuple>;

    /// Cheap liveness probe
    async fn ping(&self) -> Result<()>;
}

/// In-memory tuple store for testing and development
pub struct InMemoryTupleStore {
    tuples: Arc<DashMap<TupleKey, StoredTuple>>,
}

impl InMemoryTupleStore {
    pub fn new() -> Self {
        Self {
            tuples: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }
}

impl Default for InMemoryTupleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TupleStore for InMemoryTupleStore {
    async fn put(&self, request: WriteTupleRequest) -> Result<StoredTuple> {
        let key = request.key.clone().normalized();
        // The entry API holds the shard lock, so concurrent duplicate puts
        // observe a single row
        let stored = match self.tuples.entry(key.clone()) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => {
                let stored = StoredTuple::from_request(WriteTupleRequest {
                    key,
                    created_by: request.created_by,
                });
                slot.insert(stored.clone());
                stored
            }
        };
        Ok(stored)
    }

    async fn find(&self, namespace: &str, object_id: &str, relation: &str) -> Result<Vec<StoredTuple>> {
        let mut tuples: Vec<StoredTuple> = self
            .tuples
            .iter()
            .filter(|entry| {
                let key = entry.key();
                key.namespace == namespace && key.object_id == object_id && key.relation == relation
            })
            .map(|entry| entry.value().clone())
            .collect();

        tuples.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(tuples)
    }

    async fn find_by_subject(
        &self,
        subject_namespace: &str,
        subject_id: &str,
        relation: Option<&str>,
    ) -> Result<Vec<StoredTuple>> {
        let mut tuples: Vec<StoredTuple> = self
            .tuples
            .iter()
            .filter(|entry| {
                let key = entry.key();
                key.subject_namespace == subject_namespace
                    && key.subject_id == subject_id
                    && relation.map_or(true, |r| key.relation == r)
            })
            .map(|entry| entry.value().clone())
            .collect();

        tuples.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(tuples)
    }

    async fn delete(&self, key: &TupleKey) -> Result<bool> {
        let key = key.clone().normalized();
        Ok(self.tuples.remove(&key).is_some())
    }

    async fn replace(&self, old: &TupleKey, new: WriteTupleRequest) -> Result<StoredTuple> {
        let old = old.clone().normalized();
        if !self.tuples.contains_key(&old) {
            return Err(ZanzibarError::Validation(format!(
                "Tuple to replace does not exist: {}",
                old
            )));
        }
        // Insert first so there is no window in which neither tuple exists
        let stored = self.put(new).await?;
        if stored.key != old {
            self.tuples.remove(&old);
        }
        Ok(stored)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
