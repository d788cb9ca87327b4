use std::sync::Arc;

use ephem_controller::routing::{
    desired_ingress, IngressManager, IngressSettings, RouteTable, SyncOutcome,
    DEFAULT_BACKEND_IMAGE, DEFAULT_BACKEND_NAME, INGRESS_NAME,
};
use ephem_controller::ControllerError;
use ephem_objects::{
    HttpIngressRuleValue, Ingress, Instance, Kind, ObjectKey, PathType, Pod, Service,
};
use ephem_store::{typed, StoreError};
use ephem_testing::{fixtures, RecordingStore, StoreOp};

fn settings() -> IngressSettings {
    IngressSettings {
        host: Some("apps.example.com".to_string()),
        tls_secret: Some("ephem-tls".to_string()),
        class_name: Some("nginx".to_string()),
    }
}

async fn ingress(store: &RecordingStore, namespace: &str) -> Ingress {
    typed::get::<Ingress>(store.inner().as_ref(), &ObjectKey::new(namespace, INGRESS_NAME))
        .await
        .unwrap()
        .expect("ingress should exist")
}

fn paths(ingress: &Ingress) -> Vec<(String, String)> {
    ingress.spec.rules[0]
        .http
        .iter()
        .flat_map(|http| http.paths.iter())
        .map(|p| (p.path.clone(), p.backend.service_name.clone()))
        .collect()
}

#[tokio::test]
async fn routes_are_sorted_by_path() {
    let store = Arc::new(RecordingStore::new());
    fixtures::instance("demo", "alpha")
        .route_prefix("/apps/")
        .create(store.inner().as_ref())
        .await;
    fixtures::instance("demo", "beta")
        .route_prefix("api/v1")
        .create(store.inner().as_ref())
        .await;
    let manager = IngressManager::new(store.clone(), settings());

    assert_eq!(manager.sync_namespace("demo").await.unwrap(), SyncOutcome::Created);

    let ingress = ingress(&store, "demo").await;
    assert_eq!(
        paths(&ingress),
        [
            ("/api/v1/beta".to_string(), "beta-svc".to_string()),
            ("/apps/alpha".to_string(), "alpha-svc".to_string()),
        ]
    );
    let http = ingress.spec.rules[0].http.as_ref().unwrap();
    assert!(http.paths.iter().all(|p| p.path_type == PathType::Prefix));
    assert!(http.paths.iter().all(|p| p.backend.service_port == 80));

    assert_eq!(ingress.spec.rules[0].host, "apps.example.com");
    assert_eq!(ingress.spec.ingress_class_name.as_deref(), Some("nginx"));
    assert_eq!(ingress.spec.tls[0].secret_name, "ephem-tls");
    assert_eq!(ingress.spec.tls[0].hosts, ["apps.example.com"]);
    let default_backend = ingress.spec.default_backend.as_ref().unwrap();
    assert_eq!(default_backend.service_name, DEFAULT_BACKEND_NAME);
    assert_eq!(default_backend.service_port, 80);
}

#[tokio::test]
async fn second_sync_writes_nothing() {
    let store = Arc::new(RecordingStore::new());
    fixtures::instance("demo", "alpha")
        .create(store.inner().as_ref())
        .await;
    let manager = IngressManager::new(store.clone(), settings());
    manager.sync_namespace("demo").await.unwrap();

    store.clear_calls();
    assert_eq!(manager.sync_namespace("demo").await.unwrap(), SyncOutcome::Unchanged);
    assert!(store.writes().is_empty(), "unexpected writes: {:?}", store.writes());
}

#[tokio::test]
async fn new_instance_updates_ingress() {
    let store = Arc::new(RecordingStore::new());
    fixtures::instance("demo", "alpha")
        .create(store.inner().as_ref())
        .await;
    let manager = IngressManager::new(store.clone(), settings());
    manager.sync_namespace("demo").await.unwrap();
    let before = ingress(&store, "demo").await;

    fixtures::instance("demo", "beta")
        .create(store.inner().as_ref())
        .await;
    assert_eq!(manager.sync_namespace("demo").await.unwrap(), SyncOutcome::Updated);

    let after = ingress(&store, "demo").await;
    assert_eq!(after.metadata.uid, before.metadata.uid);
    assert_eq!(paths(&after).len(), 2);
}

#[tokio::test]
async fn empty_namespace_keeps_bare_host_rule() {
    let store = Arc::new(RecordingStore::new());
    let manager = IngressManager::new(store.clone(), settings());

    assert_eq!(manager.sync_namespace("empty").await.unwrap(), SyncOutcome::Created);

    let ingress = ingress(&store, "empty").await;
    assert_eq!(ingress.spec.rules.len(), 1);
    assert_eq!(ingress.spec.rules[0].host, "apps.example.com");
    assert!(ingress.spec.rules[0].http.is_none());
    assert!(ingress.spec.default_backend.is_some());
}

#[tokio::test]
async fn empty_http_block_converges_to_bare_host_rule() {
    let store = Arc::new(RecordingStore::new());
    let mut stale =
        desired_ingress("demo", "apps.example.com", &RouteTable::default(), &settings());
    stale.spec.rules[0].http = Some(HttpIngressRuleValue { paths: vec![] });
    typed::create(store.inner().as_ref(), stale).await.unwrap();
    let manager = IngressManager::new(store.clone(), settings());

    assert_eq!(manager.sync_namespace("demo").await.unwrap(), SyncOutcome::Updated);
    assert_eq!(store.count(StoreOp::Update, Kind::Ingress), 1);
    assert!(ingress(&store, "demo").await.spec.rules[0].http.is_none());

    assert_eq!(manager.sync_namespace("demo").await.unwrap(), SyncOutcome::Unchanged);
    assert_eq!(store.count(StoreOp::Update, Kind::Ingress), 1);
}

#[tokio::test]
async fn removed_instance_drops_its_route() {
    let store = Arc::new(RecordingStore::new());
    let alpha = fixtures::instance("demo", "alpha")
        .create(store.inner().as_ref())
        .await;
    let manager = IngressManager::new(store.clone(), settings());
    manager.sync_namespace("demo").await.unwrap();

    typed::delete_ignore_missing::<Instance>(store.inner().as_ref(), &alpha.metadata.key())
        .await
        .unwrap();
    assert_eq!(manager.sync_namespace("demo").await.unwrap(), SyncOutcome::Updated);
    assert!(ingress(&store, "demo").await.spec.rules[0].http.is_none());
}

#[tokio::test]
async fn namespaces_are_isolated() {
    let store = Arc::new(RecordingStore::new());
    fixtures::instance("team-a", "alpha")
        .create(store.inner().as_ref())
        .await;
    fixtures::instance("team-b", "beta")
        .create(store.inner().as_ref())
        .await;
    let manager = IngressManager::new(store.clone(), settings());

    manager.sync_namespace("team-a").await.unwrap();
    assert_eq!(
        paths(&ingress(&store, "team-a").await),
        [("/alpha".to_string(), "alpha-svc".to_string())]
    );
    assert!(typed::get::<Ingress>(
        store.inner().as_ref(),
        &ObjectKey::new("team-b", INGRESS_NAME)
    )
    .await
    .unwrap()
    .is_none());
}

#[tokio::test]
async fn missing_host_is_a_validation_error() {
    let store = Arc::new(RecordingStore::new());
    fixtures::instance("demo", "alpha")
        .create(store.inner().as_ref())
        .await;

    for host in [None, Some(String::new())] {
        let manager = IngressManager::new(
            store.clone(),
            IngressSettings {
                host,
                ..settings()
            },
        );
        let err = manager.sync_namespace("demo").await.unwrap_err();
        assert!(matches!(err, ControllerError::Validation(_)));
        assert!(!err.is_retryable());
    }
    assert!(store.calls().is_empty(), "no store call before validation");
}

#[tokio::test]
async fn no_tls_secret_omits_tls() {
    let store = Arc::new(RecordingStore::new());
    let manager = IngressManager::new(
        store.clone(),
        IngressSettings {
            tls_secret: None,
            class_name: None,
            ..settings()
        },
    );
    manager.sync_namespace("demo").await.unwrap();

    let ingress = ingress(&store, "demo").await;
    assert!(ingress.spec.tls.is_empty());
    assert!(ingress.spec.ingress_class_name.is_none());
}

#[tokio::test]
async fn default_backend_created_once_and_never_updated() {
    let store = Arc::new(RecordingStore::new());
    let manager = IngressManager::new(store.clone(), settings());
    manager.sync_namespace("demo").await.unwrap();

    let key = ObjectKey::new("demo", DEFAULT_BACKEND_NAME);
    let mut pod = typed::get::<Pod>(store.inner().as_ref(), &key)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pod.spec.containers[0].image, DEFAULT_BACKEND_IMAGE);
    assert_eq!(pod.spec.containers[0].name, "backend");
    assert_eq!(pod.spec.containers[0].ports[0].container_port, 80);

    let service = typed::get::<Service>(store.inner().as_ref(), &key)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        service.spec.selector.get("app").map(String::as_str),
        Some(DEFAULT_BACKEND_NAME)
    );

    // Hand edits to the default backend are left alone.
    pod.spec.containers[0].image = "custom/backend:1".to_string();
    typed::update(store.inner().as_ref(), pod).await.unwrap();

    store.clear_calls();
    manager.sync_namespace("demo").await.unwrap();
    assert_eq!(store.count(StoreOp::Create, Kind::Pod), 0);
    assert_eq!(store.count(StoreOp::Update, Kind::Pod), 0);
    assert_eq!(store.count(StoreOp::Create, Kind::Service), 0);

    let pod = typed::get::<Pod>(store.inner().as_ref(), &key)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pod.spec.containers[0].image, "custom/backend:1");
}

#[tokio::test]
async fn list_failure_propagates() {
    let store = Arc::new(RecordingStore::new());
    let manager = IngressManager::new(store.clone(), settings());
    store.fail(
        StoreOp::List,
        Kind::Instance,
        None,
        StoreError::Unavailable("timeout".to_string()),
    );

    let err = manager.sync_namespace("demo").await.unwrap_err();
    assert!(matches!(err, ControllerError::Store(StoreError::Unavailable(_))));
    assert_eq!(store.count(StoreOp::Create, Kind::Ingress), 0);
}

#[tokio::test]
async fn lost_update_race_surfaces_as_conflict() {
    let store = Arc::new(RecordingStore::new());
    fixtures::instance("demo", "alpha")
        .create(store.inner().as_ref())
        .await;
    let manager = IngressManager::new(store.clone(), settings());
    manager.sync_namespace("demo").await.unwrap();

    fixtures::instance("demo", "beta")
        .create(store.inner().as_ref())
        .await;
    store.fail_once(
        StoreOp::Update,
        Kind::Ingress,
        Some(INGRESS_NAME),
        StoreError::Conflict {
            kind: Kind::Ingress,
            key: ObjectKey::new("demo", INGRESS_NAME),
            expected: Some("1".to_string()),
            actual: "2".to_string(),
        },
    );

    let err = manager.sync_namespace("demo").await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(manager.sync_namespace("demo").await.unwrap(), SyncOutcome::Updated);
}
