//! Snapshot store routes, in process and over a real socket

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tandem_editor::{HttpSnapshotStore, MemorySnapshotStore, SnapshotStore, VersionManager, VersionSnapshot};
use tandem_store::{router, SnapshotLog};
use tower::ServiceExt;

fn save_request(json: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/save")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_save_then_list() {
    let log = Arc::new(SnapshotLog::new());
    let app = router(log.clone());

    let response = app
        .clone()
        .oneshot(save_request(
            r#"{"snapshot":[1,0,7],"time":1700000000000,"clientID":42}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(log.len().await, 1);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/get/snapshots")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        serde_json::json!([{"snapshot":[1,0,7],"time":1700000000000i64,"clientID":42}])
    );
}

#[tokio::test]
async fn test_malformed_save_is_rejected() {
    let log = Arc::new(SnapshotLog::new());
    let response = router(log.clone())
        .oneshot(save_request(r#"{"time":"yesterday"}"#))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    assert!(log.is_empty().await);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let response = router(Arc::new(SnapshotLog::new()))
        .oneshot(Request::builder().uri("/snapshots").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_http_client_round_trips_through_service() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(Arc::new(SnapshotLog::new())))
            .await
            .unwrap();
    });

    let store = Arc::new(HttpSnapshotStore::new(format!("http://{}/", addr)));
    let mut writer = VersionManager::new(1, store.clone());
    let created = writer.create_version(vec![4, 5, 6]).await.unwrap();

    let mut reader = VersionManager::new(2, store.clone());
    assert_eq!(reader.load_versions().await.unwrap(), 1);
    assert_eq!(reader.versions(), vec![created]);

    // same contents as an in-process store would hold
    let memory = MemorySnapshotStore::new();
    for version in store.list().await.unwrap() {
        memory.save(&version).await.unwrap();
    }
    assert_eq!(memory.snapshots(), reader.versions());
}

#[tokio::test]
async fn test_snapshots_decode_as_versions() {
    let log = Arc::new(SnapshotLog::new());
    log.append(VersionSnapshot {
        time: 3,
        snapshot: vec![9],
        client_id: 8,
    })
    .await
    .unwrap();

    let response = router(log)
        .oneshot(Request::builder().uri("/get/snapshots").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let versions: Vec<VersionSnapshot> = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(versions[0].client_id, 8);
}
