//! Storage failure injection
//!
//! Backend failures must surface as `Storage` errors, never as a denial or
//! a silent success, and a denied precondition must never reach the store.

use async_trait::async_trait;
use auth_zanzibar::repository::TupleStore;
use auth_zanzibar::*;
use mockall::mock;
use std::sync::Arc;

mock! {
    pub Store {}

    #[async_trait]
    impl TupleStore for Store {
        async fn put(&self, request: WriteTupleRequest) -> Result<StoredTuple>;
        async fn find(&self, namespace: &str, object_id: &str, relation: &str) -> Result<Vec<StoredTuple>>;
        async fn find_by_subject<'s, 'n, 'i, 'a>(
            &'s self,
            subject_namespace: &'n str,
            subject_id: &'i str,
            relation: Option<&'a str>,
        ) -> Result<Vec<StoredTuple>>;
        async fn delete(&self, key: &TupleKey) -> Result<bool>;
        async fn replace(&self, old: &TupleKey, new: WriteTupleRequest) -> Result<StoredTuple>;
        async fn ping(&self) -> Result<()>;
    }
}

fn service(store: MockStore) -> AuthorizationService {
    AuthorizationService::new(
        Arc::new(store),
        Arc::new(NamespaceRegistry::freeflow_default()),
        AuthorizationConfig::default(),
    )
}

fn alice_owns_p1() -> StoredTuple {
    StoredTuple::from_request(WriteTupleRequest::new(
        TupleKey::new("project", "p1", "owner", &Subject::user("alice")),
        "system",
    ))
}

#[tokio::test]
async fn test_check_surfaces_storage_error() {
    let mut store = MockStore::new();
    store
        .expect_find()
        .returning(|_, _, _| Err(ZanzibarError::Storage("connection refused".to_string())));

    let service = service(store);
    let request = CheckRequest::new("project", "p1", "viewer", &Subject::user("alice"));

    let result = service.check(&request).await;
    assert!(matches!(result, Err(ZanzibarError::Storage(_))));
}

#[tokio::test]
async fn test_write_surfaces_storage_error() {
    let mut store = MockStore::new();
    store.expect_find().returning(|_, _, relation| {
        if relation == "owner" {
            Ok(vec![alice_owns_p1()])
        } else {
            Ok(Vec::new())
        }
    });
    store
        .expect_put()
        .times(1)
        .returning(|_| Err(ZanzibarError::Storage("disk full".to_string())));

    let service = service(store);
    let request = WriteTupleRequest::new(
        TupleKey::new("project", "p1", "viewer", &Subject::user("bob")),
        "alice",
    );

    match service.write_tuple(request).await {
        Err(ZanzibarError::Storage(message)) => assert_eq!(message, "disk full"),
        other => panic!("expected storage error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_denied_write_never_reaches_store() {
    let mut store = MockStore::new();
    store.expect_find().returning(|_, _, _| Ok(Vec::new()));
    store.expect_put().times(0);

    let service = service(store);
    let request = WriteTupleRequest::new(
        TupleKey::new("project", "p1", "owner", &Subject::user("mallory")),
        "mallory",
    );

    let result = service.write_tuple(request).await;
    assert!(matches!(result, Err(ZanzibarError::PermissionDenied { .. })));
}

#[tokio::test]
async fn test_health_check_reports_ping_failure() {
    let mut store = MockStore::new();
    store
        .expect_ping()
        .returning(|| Err(ZanzibarError::Storage("timeout".to_string())));

    let service = service(store);
    assert!(service.health_check().await.is_err());
}
