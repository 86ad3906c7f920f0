use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{document_routes, migration_routes, status_page, storage_routes};
use crate::core::documents::IngestService;
use crate::core::migration::MigrationService;

/// Defaults used when a request leaves a parameter out.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub writing_folder: PathBuf,
    pub oral_folder: PathBuf,
    pub writing_module_type_id: i32,
    pub oral_module_type_id: i32,
    pub auto_migrate_batch_size: i64,
}

/// Shared application state for API handlers.
pub struct AppState {
    pub migrations: Arc<MigrationService>,
    pub documents: Arc<IngestService>,
    pub settings: HttpSettings,
}

/// Build the Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/ping", get(ping))
        .route("/status", get(status_page::status_page))
        .route("/api/tables", get(migration_routes::list_tables))
        .route("/api/tables/:slug/status", get(migration_routes::table_status))
        .route("/api/tables/:slug/check", get(migration_routes::check_table))
        .route("/api/tables/:slug/migrate", post(migration_routes::migrate))
        .route("/api/tables/:slug/auto-migrate", post(migration_routes::auto_migrate))
        .route("/api/documents/writing-tarea1/parse", post(document_routes::parse_writing))
        .route("/api/documents/oral-tarea2/parse", post(document_routes::parse_oral))
        .route("/api/files", get(storage_routes::list_files))
        .route("/api/audio/*key", get(storage_routes::stream_audio))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves until Ctrl+C.
pub async fn serve(state: Arc<AppState>, address: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(address).await?;
    info!("HTTP server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Tarea content pipeline is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn ping() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{
        FakeAudioSource, FakeDocumentReader, FakeObjectStore, InMemoryAudioRows,
        InMemoryTareaStore,
    };
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    struct Harness {
        rows: InMemoryAudioRows,
        tareas: InMemoryTareaStore,
        router: Router,
    }

    fn harness(source: FakeAudioSource, reader: FakeDocumentReader) -> Harness {
        let rows = InMemoryAudioRows::new();
        let tareas = InMemoryTareaStore::new();
        let migrations = MigrationService::new(
            Box::new(rows.clone()),
            Box::new(source),
            Arc::new(FakeObjectStore::new("content")),
        );
        let documents = IngestService::new(Box::new(reader), Box::new(tareas.clone()));

        let state = Arc::new(AppState {
            migrations: Arc::new(migrations),
            documents: Arc::new(documents),
            settings: HttpSettings {
                writing_folder: PathBuf::from("Writing_Tarea_1"),
                oral_folder: PathBuf::from("Oral_Tarea_2"),
                writing_module_type_id: 1,
                oral_module_type_id: 6,
                auto_migrate_batch_size: 10,
            },
        });

        Harness {
            rows,
            tareas,
            router: build_router(state),
        }
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn send_json(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = send(router, request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str) -> Request<Body> {
        Request::post(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let h = harness(FakeAudioSource::new(), FakeDocumentReader::new());
        let (status, body) = send_json(&h.router, get("/ping")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_unknown_table_is_404() {
        let h = harness(FakeAudioSource::new(), FakeDocumentReader::new());
        let (status, body) = send_json(&h.router, post("/api/tables/users/migrate")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!("Unknown table: users"));
    }

    #[tokio::test]
    async fn test_migrate_then_stream_audio() {
        let source = FakeAudioSource::new().with_file("abc", b"ID3-audio");
        let h = harness(source, FakeDocumentReader::new());
        h.rows
            .insert(1, Some("https://drive.google.com/file/d/abc/view"), None);

        let (status, body) =
            send_json(&h.router, post("/api/tables/listening_tarea2/migrate?limit=5")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["successful"], json!(1));
        assert_eq!(body["test_mode"], json!(false));
        assert_eq!(
            h.rows.bucket_url(1).as_deref(),
            Some("gs://content/listening_tarea2/abc.mp3")
        );

        let response = h
            .router
            .clone()
            .oneshot(get("/api/audio/listening_tarea2/abc.mp3"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ID3-audio");
    }

    #[tokio::test]
    async fn test_missing_object_is_404_and_bad_key_is_400() {
        let h = harness(FakeAudioSource::new(), FakeDocumentReader::new());

        let (status, _) = send_json(&h.router, get("/api/audio/listening_tarea1/none.mp3")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send_json(&h.router, get("/api/audio/a/%2E%2E/secret")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn test_status_endpoints() {
        let h = harness(FakeAudioSource::new(), FakeDocumentReader::new());
        h.rows.insert(1, Some("https://drive.google.com/file/d/x/view"), None);

        let (status, body) = send_json(&h.router, get("/api/tables/oral_tarea2/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stats"]["pending_migration"], json!(1));

        let (status, html) = send(&h.router, get("/status")).await;
        assert_eq!(status, StatusCode::OK);
        let html = String::from_utf8(html).unwrap();
        assert!(html.contains("listening_tarea5"));

        let (status, body) = send_json(&h.router, get("/api/tables")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bucket"], json!("content"));
        assert_eq!(body["tables"].as_array().map(|t| t.len()), Some(7));
    }

    #[tokio::test]
    async fn test_parse_endpoint_uses_request_folder() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("uno.docx"), b"").unwrap();
        let reader = FakeDocumentReader::new().with_document(
            "uno.docx",
            &["Image_url", "https://i/1.jpg", "Audio_url", "https://a/1", "Solution", "Texto"],
        );
        let h = harness(FakeAudioSource::new(), reader);

        let request = Request::post("/api/documents/oral-tarea2/parse")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"folder": dir.path(), "dry_run": true}).to_string(),
            ))
            .unwrap();
        let (status, body) = send_json(&h.router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], json!(1));
        assert_eq!(body["successful"], json!(1));
        assert_eq!(body["dry_run"], json!(true));
        assert!(h.tareas.oral_rows().is_empty());
    }

    #[tokio::test]
    async fn test_parse_endpoint_rejects_malformed_body_without_inserting() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("uno.docx"), b"").unwrap();
        let reader = FakeDocumentReader::new().with_document(
            "uno.docx",
            &["Image_url", "https://i/1.jpg", "Audio_url", "https://a/1", "Solution", "Texto"],
        );
        let h = harness(FakeAudioSource::new(), reader);

        let not_json = Request::post("/api/documents/oral-tarea2/parse")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(
                json!({"folder": dir.path(), "dry_run": true}).to_string(),
            ))
            .unwrap();
        let (status, body) = send_json(&h.router, not_json).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));

        let wrong_type = Request::post("/api/documents/oral-tarea2/parse")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"folder": dir.path(), "dry_run": "true"}).to_string(),
            ))
            .unwrap();
        let (status, _) = send_json(&h.router, wrong_type).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert!(h.tareas.oral_rows().is_empty());
    }

    #[tokio::test]
    async fn test_negative_limits_are_rejected() {
        let h = harness(FakeAudioSource::new(), FakeDocumentReader::new());

        let (status, body) =
            send_json(&h.router, post("/api/tables/listening_tarea1/migrate?limit=-1")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("Bad request: limit must not be negative"));

        let (status, _) = send_json(
            &h.router,
            post("/api/tables/listening_tarea1/auto-migrate?batch_size=0"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_parse_endpoint_reports_missing_folder() {
        let h = harness(FakeAudioSource::new(), FakeDocumentReader::new());
        let (status, body) =
            send_json(&h.router, post("/api/documents/writing-tarea1/parse")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], json!("Folder not found: Writing_Tarea_1"));
    }
}
