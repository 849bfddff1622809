use crate::{
    error::{Result, ZanzibarError},
    expand::ExpansionEngine,
    models::*,
};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Cached results kept before expired entries are swept
const MAX_CACHE_ENTRIES: usize = 10_000;

/// Answers "does subject S hold relation R on object O".
///
/// A negative answer is a normal result, never an error:
/// - no derivation at all: `no_relationship`
/// - only cyclic paths were explored: `cycle_detected`
/// - the traversal budget ran out: `expansion_limit_exceeded`
///
/// Errors are reserved for malformed requests, schema misconfiguration and
/// storage failures.
pub struct PermissionChecker {
    engine: Arc<ExpansionEngine>,
    cache: Option<CheckCache>,
}

struct CheckCache {
    ttl: Duration,
    max_entries: usize,
    /// Bumped on every clear; results computed under an older value are dropped
    generation: AtomicU64,
    entries: DashMap<CheckRequest, (CheckResponse, Instant)>,
}

impl CheckCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            max_entries: MAX_CACHE_ENTRIES,
            generation: AtomicU64::new(0),
            entries: DashMap::new(),
        }
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn get(&self, request: &CheckRequest) -> Option<CheckResponse> {
        if let Some(entry) = self.entries.get(request) {
            let (response, cached_at) = entry.value();
            if cached_at.elapsed() < self.ttl {
                return Some(response.clone());
            }
        }
        let ttl = self.ttl;
        self.entries
            .remove_if(request, |_, (_, cached_at)| cached_at.elapsed() >= ttl);
        None
    }

    /// Store a result computed while `generation` was current
    fn store(&self, request: &CheckRequest, response: &CheckResponse, generation: u64) {
        if self.generation() != generation {
            debug!(check = %request, "Discarding result computed before a tuple change");
            return;
        }

        if self.entries.len() >= self.max_entries {
            let ttl = self.ttl;
            self.entries.retain(|_, (_, cached_at)| cached_at.elapsed() < ttl);
            if self.entries.len() >= self.max_entries {
                warn!(entries = self.entries.len(), "Permission cache full, clearing");
                self.entries.clear();
            }
        }

        self.entries
            .insert(request.clone(), (response.clone(), Instant::now()));

        // A clear may have landed between the generation check and the insert
        if self.generation() != generation {
            self.entries.remove(request);
        }
    }

    fn clear(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.entries.clear();
    }
}

impl PermissionChecker {
    pub fn new(engine: Arc<ExpansionEngine>) -> Self {
        Self { engine, cache: None }
    }

    /// Cache results for `ttl`; a zero duration disables caching
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = if ttl.is_zero() {
            None
        } else {
            Some(CheckCache::new(ttl))
        };
        self
    }

    pub async fn check(&self, request: &CheckRequest) -> Result<CheckResponse> {
        validate_request(request)?;

        if let Some(ref cache) = self.cache {
            if let Some(response) = cache.get(request) {
                debug!("Cache hit for permission check: {}", request);
                return Ok(response);
            }
        }

        let generation = self.cache.as_ref().map(CheckCache::generation);
        let subject = request.subject();
        let outcome = self
            .engine
            .contains(&request.namespace, &request.object_id, &request.relation, &subject)
            .await;

        let response = match outcome {
            Ok(membership) if membership.found => CheckResponse::allowed(),
            Ok(membership) if membership.saw_cycle() => {
                warn!(
                    check = %request,
                    nodes_visited = membership.nodes_visited,
                    "Permission check only reached cyclic paths"
                );
                CheckResponse::denied(DenialReason::CycleDetected)
            }
            Ok(_) => CheckResponse::denied(DenialReason::NoRelationship),
            Err(ZanzibarError::ExpansionLimitExceeded { kind, limit }) => {
                warn!(check = %request, %kind, limit, "Permission check exceeded expansion limit");
                // Budget outcomes depend on load, so they are never cached
                return Ok(CheckResponse::denied(DenialReason::ExpansionLimitExceeded));
            }
            Err(e) => return Err(e),
        };

        if let (Some(cache), Some(generation)) = (self.cache.as_ref(), generation) {
            cache.store(request, &response, generation);
        }

        debug!(check = %request, allowed = response.allowed, "Permission check complete");
        Ok(response)
    }

    /// Independent checks, answered in request order
    pub async fn batch_check(&self, requests: &[CheckRequest]) -> Result<Vec<CheckResponse>> {
        let mut responses = Vec::with_capacity(requests.len());
        for request in requests {
            responses.push(self.check(request).await?);
        }
        Ok(responses)
    }

    /// Drop every cached result
    pub fn clear_cache(&self) {
        if let Some(ref cache) = self.cache {
            cache.clear();
        }
    }
}

fn validate_request(request: &CheckRequest) -> Result<()> {
    let fields = [
        ("namespace", &request.namespace),
        ("object_id", &request.object_id),
        ("relation", &request.relation),
        ("subject_namespace", &request.subject_namespace),
        ("subject_id", &request.subject_id),
    ];
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ZanzibarError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::ExpansionLimits;
    use crate::repository::{InMemoryTupleStore, TupleStore};
    use crate::schema::{NamespaceDefinition, NamespaceRegistry, RewriteRule};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::Notify;

    /// Store whose first lookup pauses after reading until resumed
    #[derive(Default)]
    struct PausingStore {
        inner: InMemoryTupleStore,
        armed: AtomicBool,
        reading: Notify,
        resume: Notify,
    }

    #[async_trait]
    impl TupleStore for PausingStore {
        async fn put(&self, request: WriteTupleRequest) -> Result<StoredTuple> {
            self.inner.put(request).await
        }

        async fn find(&self, namespace: &str, object_id: &str, relation: &str) -> Result<Vec<StoredTuple>> {
            let tuples = self.inner.find(namespace, object_id, relation).await?;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.reading.notify_one();
                self.resume.notified().await;
            }
            Ok(tuples)
        }

        async fn find_by_subject(
            &self,
            subject_namespace: &str,
            subject_id: &str,
            relation: Option<&str>,
        ) -> Result<Vec<StoredTuple>> {
            self.inner
                .find_by_subject(subject_namespace, subject_id, relation)
                .await
        }

        async fn delete(&self, key: &TupleKey) -> Result<bool> {
            self.inner.delete(key).await
        }

        async fn replace(&self, old: &TupleKey, new: WriteTupleRequest) -> Result<StoredTuple> {
            self.inner.replace(old, new).await
        }

        async fn ping(&self) -> Result<()> {
            self.inner.ping().await
        }
    }

    fn cached_entries(checker: &PermissionChecker) -> usize {
        checker.cache.as_ref().map_or(0, |cache| cache.entries.len())
    }

    fn checker(store: Arc<InMemoryTupleStore>, registry: NamespaceRegistry) -> PermissionChecker {
        let engine = ExpansionEngine::new(store, Arc::new(registry), ExpansionLimits::default());
        PermissionChecker::new(Arc::new(engine))
    }

    #[tokio::test]
    async fn test_direct_permission() {
        let store = Arc::new(InMemoryTupleStore::new());
        let checker = checker(store.clone(), NamespaceRegistry::freeflow_default());
        let request = CheckRequest::new("document", "doc1", "viewer", &Subject::user("alice"));

        let response = checker.check(&request).await.unwrap();
        assert_eq!(response, CheckResponse::denied(DenialReason::NoRelationship));

        let key = TupleKey::new("document", "doc1", "viewer", &Subject::user("alice"));
        store.put(WriteTupleRequest::new(key, "owner")).await.unwrap();

        assert!(checker.check(&request).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_inherited_permission() {
        let store = Arc::new(InMemoryTupleStore::new());
        let checker = checker(store.clone(), NamespaceRegistry::freeflow_default());

        let key = TupleKey::new("document", "doc1", "editor", &Subject::user("alice"));
        store.put(WriteTupleRequest::new(key, "owner")).await.unwrap();

        let viewer = CheckRequest::new("document", "doc1", "viewer", &Subject::user("alice"));
        let owner = CheckRequest::new("document", "doc1", "owner", &Subject::user("alice"));
        assert!(checker.check(&viewer).await.unwrap().allowed);
        assert!(!checker.check(&owner).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_cycle_reported_as_denial() {
        let registry = NamespaceRegistry::new().with_namespace(
            "doc",
            NamespaceDefinition::new().relation("loop", RewriteRule::union_of(&["loop"]), ""),
        );
        let checker = checker(Arc::new(InMemoryTupleStore::new()), registry);

        let request = CheckRequest::new("doc", "d1", "loop", &Subject::user("alice"));
        let response = checker.check(&request).await.unwrap();
        assert_eq!(response, CheckResponse::denied(DenialReason::CycleDetected));
    }

    #[tokio::test]
    async fn test_limit_reported_as_denial() {
        let store = Arc::new(InMemoryTupleStore::new());
        for i in 0..5 {
            let inner = ObjectRef::new("team", &format!("t{}", i + 1));
            let key = TupleKey::userset("team", &format!("t{}", i), "admin", &inner, "admin");
            store.put(WriteTupleRequest::new(key, "setup")).await.unwrap();
        }
        let limits = ExpansionLimits {
            max_depth: 2,
            ..ExpansionLimits::default()
        };
        let engine = ExpansionEngine::new(store, Arc::new(NamespaceRegistry::freeflow_default()), limits);
        let checker = PermissionChecker::new(Arc::new(engine));

        let request = CheckRequest::new("team", "t0", "admin", &Subject::user("alice"));
        let response = checker.check(&request).await.unwrap();
        assert_eq!(response, CheckResponse::denied(DenialReason::ExpansionLimitExceeded));
    }

    #[tokio::test]
    async fn test_missing_fields_rejected() {
        let checker = checker(Arc::new(InMemoryTupleStore::new()), NamespaceRegistry::freeflow_default());
        let request = CheckRequest::new("document", "", "viewer", &Subject::user(""));

        match checker.check(&request).await {
            Err(ZanzibarError::Validation(message)) => {
                assert_eq!(message, "Missing required fields: object_id, subject_id");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cache_serves_until_cleared() {
        let store = Arc::new(InMemoryTupleStore::new());
        let checker = checker(store.clone(), NamespaceRegistry::freeflow_default())
            .with_cache_ttl(Duration::from_secs(60));
        let request = CheckRequest::new("project", "p1", "viewer", &Subject::user("bob"));

        assert!(!checker.check(&request).await.unwrap().allowed);

        // Written behind the checker's back: the cached denial still wins
        let key = TupleKey::new("project", "p1", "viewer", &Subject::user("bob"));
        store.put(WriteTupleRequest::new(key, "owner")).await.unwrap();
        assert!(!checker.check(&request).await.unwrap().allowed);

        checker.clear_cache();
        assert!(checker.check(&request).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_result_read_before_write_is_not_cached() {
        let store = Arc::new(PausingStore::default());
        store.armed.store(true, Ordering::SeqCst);
        let engine = ExpansionEngine::new(
            store.clone(),
            Arc::new(NamespaceRegistry::freeflow_default()),
            ExpansionLimits::default(),
        );
        let checker = Arc::new(PermissionChecker::new(Arc::new(engine)).with_cache_ttl(Duration::from_secs(60)));
        let request = CheckRequest::new("project", "p1", "viewer", &Subject::user("bob"));

        let in_flight = tokio::spawn({
            let checker = checker.clone();
            let request = request.clone();
            async move { checker.check(&request).await }
        });

        // Grant lands while the check holds its pre-write read
        store.reading.notified().await;
        let key = TupleKey::new("project", "p1", "viewer", &Subject::user("bob"));
        store.put(WriteTupleRequest::new(key, "alice")).await.unwrap();
        checker.clear_cache();
        store.resume.notify_one();

        assert!(!in_flight.await.unwrap().unwrap().allowed);
        assert_eq!(cached_entries(&checker), 0);
        assert!(checker.check(&request).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_expired_entry_is_evicted() {
        let store = Arc::new(InMemoryTupleStore::new());
        let checker = checker(store.clone(), NamespaceRegistry::freeflow_default())
            .with_cache_ttl(Duration::from_millis(20));
        let request = CheckRequest::new("project", "p1", "viewer", &Subject::user("bob"));

        assert!(!checker.check(&request).await.unwrap().allowed);
        assert_eq!(cached_entries(&checker), 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        let cache = checker.cache.as_ref().unwrap();
        assert!(cache.get(&request).is_none());
        assert_eq!(cached_entries(&checker), 0);

        let key = TupleKey::new("project", "p1", "viewer", &Subject::user("bob"));
        store.put(WriteTupleRequest::new(key, "owner")).await.unwrap();
        assert!(checker.check(&request).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_full_cache_sweeps_expired_entries() {
        let mut checker = checker(Arc::new(InMemoryTupleStore::new()), NamespaceRegistry::freeflow_default())
            .with_cache_ttl(Duration::from_millis(20));
        if let Some(cache) = checker.cache.as_mut() {
            cache.max_entries = 2;
        }

        for user in ["u1", "u2"] {
            let request = CheckRequest::new("project", "p1", "viewer", &Subject::user(user));
            checker.check(&request).await.unwrap();
        }
        assert_eq!(cached_entries(&checker), 2);

        tokio::time::sleep(Duration::from_millis(40)).await;
        let request = CheckRequest::new("project", "p1", "viewer", &Subject::user("u3"));
        checker.check(&request).await.unwrap();
        assert_eq!(cached_entries(&checker), 1);
    }

    #[tokio::test]
    async fn test_batch_check_preserves_order() {
        let store = Arc::new(InMemoryTupleStore::new());
        let key = TupleKey::new("project", "p1", "owner", &Subject::user("alice"));
        store.put(WriteTupleRequest::new(key, "setup")).await.unwrap();
        let checker = checker(store, NamespaceRegistry::freeflow_default());

        let requests = vec![
            CheckRequest::new("project", "p1", "viewer", &Subject::user("alice")),
            CheckRequest::new("project", "p1", "viewer", &Subject::user("bob")),
            CheckRequest::new("project", "p1", "can_delete", &Subject::user("alice")),
        ];
        let allowed: Vec<bool> = checker
            .batch_check(&requests)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.allowed)
            .collect();
        assert_eq!(allowed, vec![true, false, true]);
    }
}
