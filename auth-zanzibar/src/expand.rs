use crate::{
    error::{LimitKind, Result, ZanzibarError},
    models::*,
    repository::TupleStore,
    schema::{NamespaceRegistry, RewriteRule},
};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Per-call traversal budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionLimits {
    /// Longest chain of nested relation evaluations
    pub max_depth: usize,
    /// Total relation nodes evaluated per top-level call
    pub max_nodes: usize,
    /// Wall-clock budget per top-level call
    pub timeout: Duration,
}

impl Default for ExpansionLimits {
    fn default() -> Self {
        Self {
            max_depth: 25,
            max_nodes: 10_000,
            timeout: Duration::from_secs(2),
        }
    }
}

/// Non-fatal findings recorded while traversing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A relation node repeated on the current path; that branch was treated as empty
    CycleDetected { node: String },
}

/// Fully materialized subject set for a relation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expansion {
    pub subjects: BTreeSet<Subject>,
    pub diagnostics: Vec<Diagnostic>,
    pub nodes_visited: usize,
}

/// Result of a short-circuiting membership test
#[derive(Debug, Clone)]
pub struct Membership {
    pub found: bool,
    pub diagnostics: Vec<Diagnostic>,
    pub nodes_visited: usize,
}

impl Membership {
    pub fn saw_cycle(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::CycleDetected { .. }))
    }
}

type NodeKey = (String, String, String);

/// Mutable state of one top-level traversal
struct Traversal {
    limits: ExpansionLimits,
    started: Instant,
    nodes: usize,
    path: HashSet<NodeKey>,
    diagnostics: Vec<Diagnostic>,
}

impl Traversal {
    fn new(limits: ExpansionLimits) -> Self {
        Self {
            limits,
            started: Instant::now(),
            nodes: 0,
            path: HashSet::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Push a node onto the current path; `None` means it is already on it
    fn enter(&mut self, namespace: &str, object_id: &str, relation: &str) -> Result<Option<NodeKey>> {
        if self.started.elapsed() > self.limits.timeout {
            return Err(limit_exceeded(LimitKind::Timeout, millis(self.limits.timeout)));
        }

        self.nodes += 1;
        if self.nodes > self.limits.max_nodes {
            return Err(limit_exceeded(LimitKind::Nodes, saturating_u64(self.limits.max_nodes)));
        }
        if self.path.len() >= self.limits.max_depth {
            return Err(limit_exceeded(LimitKind::Depth, saturating_u64(self.limits.max_depth)));
        }

        let key = (namespace.to_string(), object_id.to_string(), relation.to_string());
        if !self.path.insert(key.clone()) {
            self.diagnostics.push(Diagnostic::CycleDetected {
                node: format!("{}:{}#{}", namespace, object_id, relation),
            });
            return Ok(None);
        }
        Ok(Some(key))
    }

    fn leave(&mut self, key: &NodeKey) {
        self.path.remove(key);
    }
}

fn limit_exceeded(kind: LimitKind, limit: u64) -> ZanzibarError {
    ZanzibarError::ExpansionLimitExceeded { kind, limit }
}

fn saturating_u64<T: TryInto<u64>>(value: T) -> u64 {
    value.try_into().unwrap_or(u64::MAX)
}

fn millis(duration: Duration) -> u64 {
    saturating_u64(duration.as_millis())
}

/// Resolves relations into subjects by applying namespace rewrite rules.
///
/// The registry is consulted for every node; the store is only read for
/// `direct` and `tuple_to_userset` leaves.
pub struct ExpansionEngine {
    store: Arc<dyn TupleStore>,
    registry: Arc<NamespaceRegistry>,
    limits: ExpansionLimits,
}

impl ExpansionEngine {
    pub fn new(store: Arc<dyn TupleStore>, registry: Arc<NamespaceRegistry>, limits: ExpansionLimits) -> Self {
        Self {
            store,
            registry,
            limits,
        }
    }

    pub fn limits(&self) -> ExpansionLimits {
        self.limits
    }

    /// Whether a tupleset tuple leads to an object defining `computed_relation`.
    ///
    /// Objects of other namespaces contribute nothing to the userset.
    fn follows(&self, tuple: &StoredTuple, computed_relation: &str) -> bool {
        if self
            .registry
            .has_relation(&tuple.key.subject_namespace, computed_relation)
        {
            return true;
        }
        debug!(
            tuple = %tuple.key,
            relation = %computed_relation,
            "Skipping related object without the computed relation"
        );
        false
    }

    /// Materialize every concrete subject holding `relation` on the object
    pub async fn expand(&self, namespace: &str, object_id: &str, relation: &str) -> Result<Expansion> {
        let mut traversal = Traversal::new(self.limits);
        let subjects = tokio::time::timeout(
            self.limits.timeout,
            self.expand_relation(namespace, object_id, relation, &mut traversal),
        )
        .await
        .map_err(|_| limit_exceeded(LimitKind::Timeout, millis(self.limits.timeout)))??;

        Ok(Expansion {
            subjects,
            diagnostics: traversal.diagnostics,
            nodes_visited: traversal.nodes,
        })
    }

    /// Decide whether `subject` holds `relation` on the object, stopping at
    /// the first proof
    pub async fn contains(
        &self,
        namespace: &str,
        object_id: &str,
        relation: &str,
        subject: &Subject,
    ) -> Result<Membership> {
        let mut traversal = Traversal::new(self.limits);
        let found = tokio::time::timeout(
            self.limits.timeout,
            self.contains_relation(namespace, object_id, relation, subject, &mut traversal),
        )
        .await
        .map_err(|_| limit_exceeded(LimitKind::Timeout, millis(self.limits.timeout)))??;

        Ok(Membership {
            found,
            diagnostics: traversal.diagnostics,
            nodes_visited: traversal.nodes,
        })
    }

    // =========================================================================
    // Full expansion
    // =========================================================================

    fn expand_relation<'a>(
        &'a self,
        namespace: &'a str,
        object_id: &'a str,
        relation: &'a str,
        traversal: &'a mut Traversal,
    ) -> BoxFuture<'a, Result<BTreeSet<Subject>>> {
        Box::pin(async move {
            let rule = self.registry.get_relation_rule(namespace, relation)?;
            let Some(node) = traversal.enter(namespace, object_id, relation)? else {
                return Ok(BTreeSet::new());
            };

            debug!("Expanding: {}:{}#{}", namespace, object_id, relation);
            let result = self
                .expand_rule(rule, namespace, object_id, relation, traversal)
                .await;
            traversal.leave(&node);
            result
        })
    }

    fn expand_rule<'a>(
        &'a self,
        rule: &'a RewriteRule,
        namespace: &'a str,
        object_id: &'a str,
        relation: &'a str,
        traversal: &'a mut Traversal,
    ) -> BoxFuture<'a, Result<BTreeSet<Subject>>> {
        Box::pin(async move {
            match rule {
                RewriteRule::Direct => {
                    let tuples = self.store.find(namespace, object_id, relation).await?;
                    let mut subjects = BTreeSet::new();
                    for tuple in &tuples {
                        match tuple.key.subject_relation {
                            None => {
                                subjects.insert(Subject::new(
                                    &tuple.key.subject_namespace,
                                    &tuple.key.subject_id,
                                ));
                            }
                            Some(ref userset_relation) => {
                                let members = self
                                    .expand_relation(
                                        &tuple.key.subject_namespace,
                                        &tuple.key.subject_id,
                                        userset_relation,
                                        traversal,
                                    )
                                    .await?;
                                subjects.extend(members);
                            }
                        }
                    }
                    Ok(subjects)
                }
                RewriteRule::Computed(computed) => {
                    self.expand_relation(namespace, object_id, computed, traversal)
                        .await
                }
                RewriteRule::Union(members) => {
                    let mut subjects = BTreeSet::new();
                    for member in members {
                        let expanded = self
                            .expand_rule(member, namespace, object_id, relation, traversal)
                            .await?;
                        subjects.extend(expanded);
                    }
                    Ok(subjects)
                }
                RewriteRule::Intersection(members) => {
                    let mut acc: Option<BTreeSet<Subject>> = None;
                    for member in members {
                        let expanded = self
                            .expand_rule(member, namespace, object_id, relation, traversal)
                            .await?;
                        let next = match acc {
                            None => expanded,
                            Some(current) => current.intersection(&expanded).cloned().collect(),
                        };
                        if next.is_empty() {
                            return Ok(BTreeSet::new());
                        }
                        acc = Some(next);
                    }
                    Ok(acc.unwrap_or_default())
                }
                RewriteRule::TupleToUserset {
                    tupleset_relation,
                    computed_relation,
                } => {
                    let related = self
                        .store
                        .find(namespace, object_id, tupleset_relation)
                        .await?;
                    let mut subjects = BTreeSet::new();
                    for tuple in related.iter().filter(|t| self.follows(t, computed_relation)) {
                        let expanded = self
                            .expand_relation(
                                &tuple.key.subject_namespace,
                                &tuple.key.subject_id,
                                computed_relation,
                                traversal,
                            )
                            .await?;
                        subjects.extend(expanded);
                    }
                    Ok(subjects)
                }
            }
        })
    }

    // =========================================================================
    // Membership (short-circuit)
    // =========================================================================

    fn contains_relation<'a>(
        &'a self,
        namespace: &'a str,
        object_id: &'a str,
        relation: &'a str,
        subject: &'a Subject,
        traversal: &'a mut Traversal,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let rule = self.registry.get_relation_rule(namespace, relation)?;
            let Some(node) = traversal.enter(namespace, object_id, relation)? else {
                return Ok(false);
            };

            debug!("Checking: {} on {}:{}#{}", subject, namespace, object_id, relation);
            let result = self
                .contains_rule(rule, namespace, object_id, relation, subject, traversal)
                .await;
            traversal.leave(&node);
            result
        })
    }

    fn contains_rule<'a>(
        &'a self,
        rule: &'a RewriteRule,
        namespace: &'a str,
        object_id: &'a str,
        relation: &'a str,
        subject: &'a Subject,
        traversal: &'a mut Traversal,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            match rule {
                RewriteRule::Direct => {
                    let tuples = self.store.find(namespace, object_id, relation).await?;

                    // Concrete matches first: no further I/O needed
                    let direct_hit = tuples.iter().any(|t| {
                        t.key.subject_relation.is_none()
                            && t.key.subject_namespace == subject.namespace
                            && t.key.subject_id == subject.id
                    });
                    if direct_hit {
                        debug!("Direct permission found");
                        return Ok(true);
                    }

                    for tuple in &tuples {
                        if let Some(ref userset_relation) = tuple.key.subject_relation {
                            if self
                                .contains_relation(
                                    &tuple.key.subject_namespace,
                                    &tuple.key.subject_id,
                                    userset_relation,
                                    subject,
                                    traversal,
                                )
                                .await?
                            {
                                return Ok(true);
                            }
                        }
                    }
                    Ok(false)
                }
                RewriteRule::Computed(computed) => {
                    self.contains_relation(namespace, object_id, computed, subject, traversal)
                        .await
                }
                RewriteRule::Union(members) => {
                    for member in members {
                        if self
                            .contains_rule(member, namespace, object_id, relation, subject, traversal)
                            .await?
                        {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                RewriteRule::Intersection(members) => {
                    if members.is_empty() {
                        return Ok(false);
                    }
                    for member in members {
                        if !self
                            .contains_rule(member, namespace, object_id, relation, subject, traversal)
                            .await?
                        {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                RewriteRule::TupleToUserset {
                    tupleset_relation,
                    computed_relation,
                } => {
                    let related = self
                        .store
                        .find(namespace, object_id, tupleset_relation)
                        .await?;
                    for tuple in related.iter().filter(|t| self.follows(t, computed_relation)) {
                        if self
                            .contains_relation(
                                &tuple.key.subject_namespace,
                                &tuple.key.subject_id,
                                computed_relation,
                                subject,
                                traversal,
                            )
                            .await?
                        {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryTupleStore;
    use crate::schema::NamespaceDefinition;

    async fn write(store: &InMemoryTupleStore, key: TupleKey) {
        store.put(WriteTupleRequest::new(key, "setup")).await.unwrap();
    }

    fn engine(store: Arc<InMemoryTupleStore>, registry: NamespaceRegistry) -> ExpansionEngine {
        ExpansionEngine::new(store, Arc::new(registry), ExpansionLimits::default())
    }

    #[tokio::test]
    async fn test_expand_subjects() {
        let store = Arc::new(InMemoryTupleStore::new());
        write(&store, TupleKey::new("project", "p1", "viewer", &Subject::user("alice"))).await;
        write(&store, TupleKey::new("project", "p1", "owner", &Subject::user("bob"))).await;

        let engine = engine(store, NamespaceRegistry::freeflow_default());
        let expansion = engine.expand("project", "p1", "viewer").await.unwrap();

        // bob is an owner, hence editor, hence viewer
        assert_eq!(
            expansion.subjects,
            BTreeSet::from([Subject::user("alice"), Subject::user("bob")])
        );
        assert!(expansion.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_expand_follows_usersets() {
        let store = Arc::new(InMemoryTupleStore::new());
        let team = ObjectRef::new("team", "design");
        write(&store, TupleKey::new("team", "design", "member", &Subject::user("carol"))).await;
        write(&store, TupleKey::new("team", "design", "admin", &Subject::user("dave"))).await;
        write(&store, TupleKey::userset("project", "p1", "editor", &team, "member")).await;

        let engine = engine(store, NamespaceRegistry::freeflow_default());
        let expansion = engine.expand("project", "p1", "editor").await.unwrap();

        assert!(expansion.subjects.contains(&Subject::user("carol")));
        assert!(expansion.subjects.contains(&Subject::user("dave")));
    }

    #[tokio::test]
    async fn test_tuple_to_userset_membership() {
        let store = Arc::new(InMemoryTupleStore::new());
        write(&store, TupleKey::new("project", "p1", "viewer", &Subject::user("erin"))).await;
        write(&store, TupleKey::new("document", "d1", "parent", &Subject::new("project", "p1"))).await;

        let engine = engine(store, NamespaceRegistry::freeflow_default());
        let membership = engine
            .contains("document", "d1", "viewer", &Subject::user("erin"))
            .await
            .unwrap();
        assert!(membership.found);

        let membership = engine
            .contains("document", "d1", "editor", &Subject::user("erin"))
            .await
            .unwrap();
        assert!(!membership.found);
    }

    #[tokio::test]
    async fn test_parent_outside_hierarchy_is_ignored() {
        let store = Arc::new(InMemoryTupleStore::new());
        write(&store, TupleKey::new("document", "d1", "owner", &Subject::user("alice"))).await;
        write(&store, TupleKey::new("document", "d1", "parent", &Subject::user("mallory"))).await;

        let engine = engine(store, NamespaceRegistry::freeflow_default());
        let membership = engine
            .contains("document", "d1", "viewer", &Subject::user("bob"))
            .await
            .unwrap();
        assert!(!membership.found);

        let membership = engine
            .contains("document", "d1", "can_delete", &Subject::user("alice"))
            .await
            .unwrap();
        assert!(membership.found);

        let expansion = engine.expand("document", "d1", "viewer").await.unwrap();
        assert_eq!(expansion.subjects, BTreeSet::from([Subject::user("alice")]));
    }

    #[tokio::test]
    async fn test_intersection_requires_every_member() {
        let registry = NamespaceRegistry::new().with_namespace(
            "doc",
            NamespaceDefinition::new()
                .relation("approved", RewriteRule::Direct, "")
                .relation("reviewer", RewriteRule::Direct, "")
                .relation(
                    "publisher",
                    RewriteRule::Intersection(vec![
                        RewriteRule::computed("approved"),
                        RewriteRule::computed("reviewer"),
                    ]),
                    "",
                ),
        );
        let store = Arc::new(InMemoryTupleStore::new());
        write(&store, TupleKey::new("doc", "d1", "approved", &Subject::user("alice"))).await;
        write(&store, TupleKey::new("doc", "d1", "reviewer", &Subject::user("alice"))).await;
        write(&store, TupleKey::new("doc", "d1", "reviewer", &Subject::user("bob"))).await;

        let engine = engine(store, registry);
        let alice = engine.contains("doc", "d1", "publisher", &Subject::user("alice")).await.unwrap();
        let bob = engine.contains("doc", "d1", "publisher", &Subject::user("bob")).await.unwrap();
        assert!(alice.found);
        assert!(!bob.found);

        let expansion = engine.expand("doc", "d1", "publisher").await.unwrap();
        assert_eq!(expansion.subjects, BTreeSet::from([Subject::user("alice")]));
    }

    #[tokio::test]
    async fn test_self_referential_rule_terminates() {
        let registry = NamespaceRegistry::new().with_namespace(
            "doc",
            NamespaceDefinition::new().relation("loop", RewriteRule::union_of(&["loop"]), ""),
        );
        let engine = engine(Arc::new(InMemoryTupleStore::new()), registry);

        let membership = engine
            .contains("doc", "d1", "loop", &Subject::user("alice"))
            .await
            .unwrap();
        assert!(!membership.found);
        assert!(membership.saw_cycle());
    }

    #[tokio::test]
    async fn test_userset_cycle_is_fail_closed() {
        let store = Arc::new(InMemoryTupleStore::new());
        let a = ObjectRef::new("team", "a");
        let b = ObjectRef::new("team", "b");
        write(&store, TupleKey::userset("team", "a", "member", &b, "member")).await;
        write(&store, TupleKey::userset("team", "b", "member", &a, "member")).await;

        let engine = engine(store, NamespaceRegistry::freeflow_default());
        let expansion = engine.expand("team", "a", "member").await.unwrap();
        assert!(expansion.subjects.is_empty());
        assert!(!expansion.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_depth_limit_aborts() {
        let store = Arc::new(InMemoryTupleStore::new());
        // team:t0 <- t1 <- ... <- t9, each nesting the next as a userset
        for i in 0..9 {
            let inner = ObjectRef::new("team", &format!("t{}", i + 1));
            write(&store, TupleKey::userset("team", &format!("t{}", i), "admin", &inner, "admin")).await;
        }

        let limits = ExpansionLimits {
            max_depth: 4,
            ..ExpansionLimits::default()
        };
        let engine = ExpansionEngine::new(store, Arc::new(NamespaceRegistry::freeflow_default()), limits);

        let result = engine.contains("team", "t0", "admin", &Subject::user("zed")).await;
        assert!(matches!(
            result,
            Err(ZanzibarError::ExpansionLimitExceeded { kind: LimitKind::Depth, limit: 4 })
        ));
    }

    #[tokio::test]
    async fn test_node_limit_aborts() {
        let store = Arc::new(InMemoryTupleStore::new());
        for i in 0..20 {
            let team = ObjectRef::new("team", &format!("t{}", i));
            write(&store, TupleKey::userset("project", "p1", "viewer", &team, "member")).await;
        }

        let limits = ExpansionLimits {
            max_nodes: 10,
            ..ExpansionLimits::default()
        };
        let engine = ExpansionEngine::new(store, Arc::new(NamespaceRegistry::freeflow_default()), limits);

        let result = engine.expand("project", "p1", "viewer").await;
        assert!(matches!(
            result,
            Err(ZanzibarError::ExpansionLimitExceeded { kind: LimitKind::Nodes, limit: 10 })
        ));
    }

    #[tokio::test]
    async fn test_unknown_namespace_is_an_error() {
        let engine = engine(Arc::new(InMemoryTupleStore::new()), NamespaceRegistry::freeflow_default());
        let result = engine.contains("spaceship", "s1", "pilot", &Subject::user("alice")).await;
        assert!(matches!(result, Err(ZanzibarError::UnknownNamespace(_))));
    }
}
