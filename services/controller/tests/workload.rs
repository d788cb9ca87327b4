use std::sync::Arc;

use ephem_controller::workload::{
    EnsureOutcome, ServiceChange, WorkloadManager, WorkloadSettings, VERSION_ENV, VERSION_LABEL,
};
use ephem_controller::ControllerError;
use ephem_objects::{Instance, Kind, ObjectKey, Pod, Service};
use ephem_store::{typed, ObjectStore, StoreError};
use ephem_testing::{fixtures, RecordingStore, StoreOp};

fn manager(store: &Arc<RecordingStore>, settings: WorkloadSettings) -> WorkloadManager {
    WorkloadManager::new(store.clone(), settings)
}

async fn pod(store: &RecordingStore, name: &str) -> Option<Pod> {
    typed::get::<Pod>(store.inner().as_ref(), &ObjectKey::new("demo", name))
        .await
        .unwrap()
}

async fn service(store: &RecordingStore, name: &str) -> Option<Service> {
    typed::get::<Service>(store.inner().as_ref(), &ObjectKey::new("demo", name))
        .await
        .unwrap()
}

/// Run `ensure` until the pod and service both exist and match.
async fn converge(manager: &WorkloadManager, instance: &Instance) {
    for _ in 0..4 {
        if let EnsureOutcome::Converged(_) = manager.ensure(instance).await.unwrap() {
            return;
        }
    }
    panic!("instance did not converge");
}

#[tokio::test]
async fn ensure_is_idempotent() {
    let store = Arc::new(RecordingStore::new());
    let instance = fixtures::instance("demo", "alpha")
        .create(store.inner().as_ref())
        .await;
    let manager = manager(&store, WorkloadSettings::default());

    assert_eq!(manager.ensure(&instance).await.unwrap(), EnsureOutcome::PodCreated);
    assert_eq!(
        manager.ensure(&instance).await.unwrap(),
        EnsureOutcome::Converged(ServiceChange::Created)
    );

    store.clear_calls();
    assert_eq!(
        manager.ensure(&instance).await.unwrap(),
        EnsureOutcome::Converged(ServiceChange::Unchanged)
    );
    assert!(store.writes().is_empty(), "unexpected writes: {:?}", store.writes());

    let service = service(&store, "alpha-svc").await.unwrap();
    assert_eq!(
        service.metadata.controller_owner().map(|o| o.name.as_str()),
        Some("alpha")
    );
}

#[tokio::test]
async fn image_change_recreates_pod() {
    let store = Arc::new(RecordingStore::new());
    let instance = fixtures::instance("demo", "alpha")
        .create(store.inner().as_ref())
        .await;
    let manager = manager(&store, WorkloadSettings::default());
    converge(&manager, &instance).await;
    let old_uid = pod(&store, "alpha-pod").await.unwrap().metadata.uid;

    let mut changed = instance.clone();
    changed.spec.image = "nginx:1.27".to_string();
    changed.spec.version = "2.0.0".to_string();
    let changed = typed::update(store.inner().as_ref(), changed).await.unwrap();

    store.clear_calls();
    assert_eq!(manager.ensure(&changed).await.unwrap(), EnsureOutcome::PodRecreating);
    assert!(pod(&store, "alpha-pod").await.is_none());
    assert_eq!(store.count(StoreOp::Update, Kind::Pod), 0, "pods are never patched");

    assert_eq!(manager.ensure(&changed).await.unwrap(), EnsureOutcome::PodCreated);
    let recreated = pod(&store, "alpha-pod").await.unwrap();
    assert_ne!(recreated.metadata.uid, old_uid);
    assert_eq!(recreated.spec.containers[0].image, "nginx:1.27");
    assert_eq!(recreated.spec.containers[0].env_value(VERSION_ENV), Some("2.0.0"));
    assert_eq!(
        recreated.metadata.labels.get(VERSION_LABEL).map(String::as_str),
        Some("2.0.0")
    );

    // The service does not depend on image or version.
    assert_eq!(
        manager.ensure(&changed).await.unwrap(),
        EnsureOutcome::Converged(ServiceChange::Unchanged)
    );
}

#[tokio::test]
async fn ttl_change_recreates_pod() {
    let store = Arc::new(RecordingStore::new());
    let instance = fixtures::instance("demo", "alpha")
        .create(store.inner().as_ref())
        .await;
    let manager = manager(&store, WorkloadSettings::default());
    converge(&manager, &instance).await;

    let mut changed = instance.clone();
    changed.spec.ttl_seconds = Some(120);
    let changed = typed::update(store.inner().as_ref(), changed).await.unwrap();

    assert_eq!(manager.ensure(&changed).await.unwrap(), EnsureOutcome::PodRecreating);
    assert_eq!(manager.ensure(&changed).await.unwrap(), EnsureOutcome::PodCreated);
    let recreated = pod(&store, "alpha-pod").await.unwrap();
    assert_eq!(recreated.spec.active_deadline_seconds, Some(120));
}

#[tokio::test]
async fn port_change_patches_service_in_place() {
    let store = Arc::new(RecordingStore::new());
    let instance = fixtures::instance("demo", "alpha")
        .create(store.inner().as_ref())
        .await;
    converge(&manager(&store, WorkloadSettings::default()), &instance).await;
    let before = service(&store, "alpha-svc").await.unwrap();

    let moved = manager(
        &store,
        WorkloadSettings {
            pod_port: 9000,
            ..Default::default()
        },
    );

    store.clear_calls();
    assert_eq!(moved.ensure(&instance).await.unwrap(), EnsureOutcome::PodRecreating);
    assert_eq!(moved.ensure(&instance).await.unwrap(), EnsureOutcome::PodCreated);
    assert_eq!(
        moved.ensure(&instance).await.unwrap(),
        EnsureOutcome::Converged(ServiceChange::Updated)
    );

    let after = service(&store, "alpha-svc").await.unwrap();
    assert_eq!(after.metadata.uid, before.metadata.uid, "service must not be recreated");
    assert_ne!(after.metadata.resource_version, before.metadata.resource_version);
    assert_eq!(after.spec.ports[0].target_port, 9000);
    assert_eq!(store.count(StoreOp::Delete, Kind::Service), 0);
    assert_eq!(store.count(StoreOp::Create, Kind::Service), 0);
    assert_eq!(store.count(StoreOp::Update, Kind::Service), 1);

    assert_eq!(
        moved.ensure(&instance).await.unwrap(),
        EnsureOutcome::Converged(ServiceChange::Unchanged)
    );
}

#[tokio::test]
async fn identity_falls_back_to_default() {
    let store = Arc::new(RecordingStore::new());
    let plain = fixtures::instance("demo", "alpha")
        .create(store.inner().as_ref())
        .await;
    let custom = fixtures::instance("demo", "beta")
        .identity("builder")
        .create(store.inner().as_ref())
        .await;
    let manager = manager(
        &store,
        WorkloadSettings {
            default_identity: "runner".to_string(),
            ..Default::default()
        },
    );

    manager.ensure(&plain).await.unwrap();
    manager.ensure(&custom).await.unwrap();

    let plain_pod = pod(&store, "alpha-pod").await.unwrap();
    let custom_pod = pod(&store, "beta-pod").await.unwrap();
    assert_eq!(plain_pod.spec.service_account_name.as_deref(), Some("runner"));
    assert_eq!(custom_pod.spec.service_account_name.as_deref(), Some("builder"));
}

#[tokio::test]
async fn pod_read_failure_propagates() {
    let store = Arc::new(RecordingStore::new());
    let instance = fixtures::instance("demo", "alpha")
        .create(store.inner().as_ref())
        .await;
    let manager = manager(&store, WorkloadSettings::default());

    store.fail(
        StoreOp::Get,
        Kind::Pod,
        None,
        StoreError::Unavailable("connection reset".to_string()),
    );
    let err = manager.ensure(&instance).await.unwrap_err();
    assert!(matches!(err, ControllerError::Store(StoreError::Unavailable(_))));
    assert!(err.is_retryable());
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn pod_create_race_surfaces_as_conflict() {
    let store = Arc::new(RecordingStore::new());
    let instance = fixtures::instance("demo", "alpha")
        .create(store.inner().as_ref())
        .await;
    let manager = manager(&store, WorkloadSettings::default());

    store.fail_once(
        StoreOp::Create,
        Kind::Pod,
        Some("alpha-pod"),
        StoreError::AlreadyExists {
            kind: Kind::Pod,
            key: ObjectKey::new("demo", "alpha-pod"),
        },
    );
    let err = manager.ensure(&instance).await.unwrap_err();
    assert!(matches!(err, ControllerError::Store(ref e) if e.is_conflict()));

    // The next pass wins.
    assert_eq!(manager.ensure(&instance).await.unwrap(), EnsureOutcome::PodCreated);
}

#[tokio::test]
async fn drift_delete_tolerates_missing_pod() {
    let store = Arc::new(RecordingStore::new());
    let instance = fixtures::instance("demo", "alpha")
        .create(store.inner().as_ref())
        .await;
    let manager = manager(&store, WorkloadSettings::default());
    converge(&manager, &instance).await;

    let mut changed = instance.clone();
    changed.spec.image = "nginx:1.27".to_string();

    store.fail_once(
        StoreOp::Delete,
        Kind::Pod,
        Some("alpha-pod"),
        StoreError::NotFound {
            kind: Kind::Pod,
            key: ObjectKey::new("demo", "alpha-pod"),
        },
    );
    assert_eq!(manager.ensure(&changed).await.unwrap(), EnsureOutcome::PodRecreating);
}

#[tokio::test]
async fn teardown_removes_everything() {
    let store = Arc::new(RecordingStore::new());
    let instance = fixtures::instance("demo", "alpha")
        .create(store.inner().as_ref())
        .await;
    let manager = manager(&store, WorkloadSettings::default());
    converge(&manager, &instance).await;

    store.clear_calls();
    let report = manager.teardown(&instance).await.unwrap();
    assert!(report.pod && report.service && report.instance);

    let deletes: Vec<_> = store
        .writes()
        .into_iter()
        .map(|call| (call.op, call.kind))
        .collect();
    assert_eq!(
        deletes,
        [
            (StoreOp::Delete, Kind::Pod),
            (StoreOp::Delete, Kind::Service),
            (StoreOp::Delete, Kind::Instance),
        ]
    );
    assert_eq!(store.inner().count(Kind::Pod).await, 0);
    assert_eq!(store.inner().count(Kind::Service).await, 0);
    assert_eq!(store.inner().count(Kind::Instance).await, 0);

    let store_dyn: &dyn ObjectStore = store.as_ref();
    assert!(typed::get::<Instance>(store_dyn, &ObjectKey::new("demo", "alpha"))
        .await
        .unwrap()
        .is_none());
}
