use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use nfsmon::{
    pages::{StatsChange, StatsPage},
    source::{fetch_once, Endpoint, HttpSource, SnapshotSource},
    PollConfig,
};
use nfsmon_core::{ClientDetail, ProtocolFamily, VersionInfo};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

#[derive(Clone, Default)]
struct Recorded {
    revokes: Arc<Mutex<Vec<(String, Value)>>>,
}

async fn version() -> Json<Value> {
    Json(json!("nfsd 2.4.1"))
}

async fn clients() -> Json<Value> {
    Json(json!(["c2", "a b/c"]))
}

async fn client(Path(id): Path<String>) -> Result<Json<Value>, StatusCode> {
    if id == "missing" {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(json!({
        "confirmed": false,
        "sessions": [format!("{id}-s1")],
        "opens": [],
        "delegations": ["d1"],
        "layouts": []
    })))
}

async fn garbage() -> &'static str {
    "not json"
}

async fn fsattr() -> Json<Value> {
    Json(json!({
        "stats": {"totalSpace": 4096, "freeSpace": 2048},
        "devices": [{"id": 1, "state": "healthy"}],
        "replicas": []
    }))
}

async fn ops4() -> Json<Value> {
    Json(json!({"operations": {"READ": 7, "ACCESS": 2}}))
}

async fn ops3() -> Json<Value> {
    Json(json!({"operations": {}}))
}

async fn revoke(
    State(recorded): State<Recorded>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    if let Ok(mut revokes) = recorded.revokes.lock() {
        revokes.push((id, body));
    }
    StatusCode::NO_CONTENT
}

async fn serve() -> (HttpSource, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/version", get(version))
        .route("/nfs4/client", get(clients))
        .route("/nfs4/client/:id", get(client))
        .route("/nfs4/client/:id/revoke", post(revoke))
        .route("/nfs4/session/:id", get(garbage))
        .route("/fsattr", get(fsattr))
        .route("/nfs4", get(ops4))
        .route("/nfs3", get(ops3))
        .with_state(recorded.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let base = Url::parse(&format!("http://{addr}/")).expect("base url");
    (HttpSource::new(base).expect("http source"), recorded)
}

#[tokio::test]
async fn decodes_typed_payloads() {
    let (source, _) = serve().await;

    let version: VersionInfo = fetch_once(&source, &Endpoint::Version)
        .await
        .expect("version");
    assert_eq!(version.to_string(), "nfsd 2.4.1");

    let detail: ClientDetail = fetch_once(&source, &Endpoint::Client("c2".to_string()))
        .await
        .expect("client detail");
    assert!(!detail.confirmed);
    assert_eq!(detail.sessions, vec!["c2-s1"]);
    assert_eq!(detail.delegations, vec!["d1"]);
}

#[tokio::test]
async fn ids_travel_as_single_encoded_segments() {
    let (source, _) = serve().await;
    let detail: ClientDetail = fetch_once(&source, &Endpoint::Client("a b/c".to_string()))
        .await
        .expect("client detail");
    assert_eq!(detail.sessions, vec!["a b/c-s1"]);
}

#[tokio::test]
async fn non_success_status_is_a_transport_failure() {
    let (source, _) = serve().await;
    let err = source
        .fetch(&Endpoint::Client("missing".to_string()))
        .await
        .expect_err("404");
    assert_eq!(err.kind(), "transport");
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn malformed_bodies_are_decode_failures() {
    let (source, _) = serve().await;

    let err = source
        .fetch(&Endpoint::Session("s1".to_string()))
        .await
        .expect_err("invalid json");
    assert_eq!(err.kind(), "decode");

    let err = fetch_once::<_, Vec<String>>(&source, &Endpoint::Filesystem)
        .await
        .expect_err("wrong shape");
    assert_eq!(err.kind(), "decode");
}

#[tokio::test]
async fn unreachable_server_is_a_transport_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("reserve port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    let source =
        HttpSource::new(Url::parse(&format!("http://{addr}/")).expect("url")).expect("source");
    let err = source.fetch(&Endpoint::Clients).await.expect_err("refused");
    assert_eq!(err.kind(), "transport");
}

#[tokio::test]
async fn revoke_posts_true() {
    let (source, recorded) = serve().await;
    source
        .post(&Endpoint::Revoke("c2".to_string()), json!(true))
        .await
        .expect("revoke");
    let revokes = recorded.revokes.lock().expect("lock").clone();
    assert_eq!(revokes, vec![("c2".to_string(), json!(true))]);
}

#[tokio::test]
async fn stats_page_reconciles_live_feeds() {
    let (source, _) = serve().await;
    let config = PollConfig {
        interval: Duration::from_millis(50),
        ..PollConfig::default()
    };
    let mut page = StatsPage::open(&source, config);

    let mut seen_filesystem = false;
    let mut seen_nfs4 = false;
    while !(seen_filesystem && seen_nfs4) {
        let change = tokio::time::timeout(Duration::from_secs(5), page.changed())
            .await
            .expect("feed published in time")
            .expect("page alive");
        match change {
            StatsChange::Filesystem => seen_filesystem = true,
            StatsChange::Operations(ProtocolFamily::Nfs4) => seen_nfs4 = true,
            StatsChange::Operations(ProtocolFamily::Nfs3) => {}
        }
    }

    let filesystem = page.filesystem.borrow();
    assert_eq!(filesystem.view.stats.total_space, Some(4096));
    assert_eq!(filesystem.view.devices.list().items()[0].id, "1");
    assert!(filesystem.view.replicas.is_hidden());

    let nfs4 = page.nfs4.borrow();
    let names: Vec<&str> = nfs4.view.operations.iter().map(|row| row.name.as_str()).collect();
    assert_eq!(names, vec!["ACCESS", "READ"]);
}
