//! Router assembly: HTTP endpoints, WebSocket upgrade, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws` (catalog push + edits)
/// - REST-ish catalog API under `/api/v1/...`
/// - CORS (allow any origin/method/headers), adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/cases", get(http::http_list_cases).post(http::http_create_case))
        .route("/api/v1/cases/reload", post(http::http_reload))
        .route(
            "/api/v1/cases/:id",
            get(http::http_get_case).put(http::http_put_case).delete(http::http_delete_case),
        )
        .route("/api/v1/cases/:id/legacy", get(http::http_get_legacy))
        .route("/api/v1/cases/:id/edit", post(http::http_edit_case))
        .route("/api/v1/cases/:id/move", post(http::http_move_case))
        .route("/api/v1/export", get(http::http_export))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::clock::FixedClock;
    use crate::repository::{CaseRepository, Collections};
    use crate::seeds::StaticDataset;
    use crate::error::StoreError;
    use crate::store::{MemoryStore, MockDocumentStore};

    async fn app() -> Router {
        let repo = CaseRepository::new(
            Arc::new(MemoryStore::new()),
            Arc::new(FixedClock::at("2026-06-01T10:00:00Z")),
            StaticDataset::bundled(),
            Collections::default(),
        );
        repo.load().await;
        build_router(Arc::new(AppState::with_repository(repo)))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = app().await;
        let (status, body) = call(&app, "GET", "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn catalog_lists_seeded_cases_in_order() {
        let app = app().await;
        let (status, body) = call(&app, "GET", "/api/v1/cases", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "seed_then_remote");
        let ids: Vec<_> = body["cases"].as_array().unwrap().iter().map(|c| c["id"].clone()).collect();
        assert_eq!(ids, vec![json!("html-first-steps"), json!("the-broken-navbar"), json!("the-vanishing-stylesheet")]);
    }

    #[tokio::test]
    async fn unknown_case_is_404() {
        let app = app().await;
        let (status, body) = call(&app, "GET", "/api/v1/cases/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn legacy_view_uses_old_field_names() {
        let app = app().await;
        let (status, body) = call(&app, "GET", "/api/v1/cases/the-broken-navbar/legacy", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cinematicSlides"][0]["dialogue"], "Monday, 7:02 AM. The homepage has no menu.");
        assert!(body["missions"][0]["brokenHtml"].is_string());
    }

    #[tokio::test]
    async fn delete_requires_confirmation() {
        let app = app().await;
        let (status, body) = call(&app, "DELETE", "/api/v1/cases/html-first-steps", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], false);

        let (status, body) = call(&app, "DELETE", "/api/v1/cases/html-first-steps?confirm=true", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], true);
        assert_eq!(body["reindexed"], 2);

        let (_, list) = call(&app, "GET", "/api/v1/cases", None).await;
        let orders: Vec<_> = list["cases"].as_array().unwrap().iter().map(|c| c["displayOrder"].clone()).collect();
        assert_eq!(orders, vec![json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn edit_that_blanks_title_is_rejected_with_rule() {
        let app = app().await;
        let cmds = json!({ "commands": [{ "op": "update_details", "patch": { "title": "   " } }] });
        let (status, body) = call(&app, "POST", "/api/v1/cases/the-broken-navbar/edit", Some(cmds)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["rule"], "title_required");

        let (_, case) = call(&app, "GET", "/api/v1/cases/the-broken-navbar", None).await;
        assert_eq!(case["title"], "The Case of the Broken Navbar");
    }

    #[tokio::test]
    async fn edit_addressing_unknown_mission_is_404() {
        let app = app().await;
        let cmds = json!({ "commands": [{ "op": "delete_mission", "id": "ghost" }] });
        let (status, _) = call(&app, "POST", "/api/v1/cases/the-broken-navbar/edit", Some(cmds)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_appends_case_at_end() {
        let app = app().await;
        let body = json!({
            "details": { "title": "The Silent Form", "description": "Submissions go nowhere." },
            "commands": [{ "op": "add_mission" }, { "op": "add_slide" }]
        });
        let (status, out) = call(&app, "POST", "/api/v1/cases", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(out["case"]["displayOrder"], 4);
        assert_eq!(out["createdIds"].as_array().unwrap().len(), 2);
        assert_eq!(out["case"]["richBody"]["missions"][0]["order"], 1);
    }

    #[tokio::test]
    async fn create_detective_without_missions_is_rejected() {
        let app = app().await;
        let body = json!({ "details": { "title": "Empty", "description": "Nothing yet." } });
        let (status, out) = call(&app, "POST", "/api/v1/cases", Some(body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(out["rule"], "mission_required");
    }

    #[tokio::test]
    async fn put_normalizes_legacy_mission_names() {
        let app = app().await;
        let doc = json!({
            "title": "Fix nav",
            "description": "Menu is gone.",
            "isDetectiveMission": true,
            "missions": [{ "title": "Fix nav", "content": { "brokenHtml": "<div>", "targetHtml": "<nav>" } }]
        });
        let (status, case) = call(&app, "PUT", "/api/v1/cases/the-broken-navbar", Some(doc)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(case["id"], "the-broken-navbar");
        assert_eq!(case["displayOrder"], 2);
        assert_eq!(case["richBody"]["missions"][0]["content"]["initialCode"], "<div>");
        assert_eq!(case["richBody"]["missions"][0]["content"]["targetCode"], "<nav>");
    }

    #[tokio::test]
    async fn put_rejects_non_object_body() {
        let app = app().await;
        let (status, _) = call(&app, "PUT", "/api/v1/cases/the-broken-navbar", Some(json!([1, 2]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn move_up_swaps_neighbours() {
        let app = app().await;
        let (status, out) =
            call(&app, "POST", "/api/v1/cases/the-broken-navbar/move", Some(json!({ "direction": "up" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(out["moved"], true);

        let (_, out) = call(&app, "POST", "/api/v1/cases/the-broken-navbar/move", Some(json!({ "direction": "up" }))).await;
        assert_eq!(out["moved"], false);

        let (_, list) = call(&app, "GET", "/api/v1/cases", None).await;
        assert_eq!(list["cases"][0]["id"], "the-broken-navbar");
    }

    #[tokio::test]
    async fn writes_while_serving_bundled_cases_are_unavailable() {
        let mut store = MockDocumentStore::new();
        store.expect_list().returning(|_| Err(StoreError::Transport("connection refused".into())));
        store.expect_upsert().never();
        store.expect_delete().never();
        let repo = CaseRepository::new(
            Arc::new(store),
            Arc::new(FixedClock::at("2026-06-01T10:00:00Z")),
            StaticDataset::bundled(),
            Collections::default(),
        );
        repo.load().await;
        let app = build_router(Arc::new(AppState::with_repository(repo)));

        let (_, list) = call(&app, "GET", "/api/v1/cases", None).await;
        assert_eq!(list["mode"], "static_fallback");

        let (status, body) =
            call(&app, "POST", "/api/v1/cases/the-broken-navbar/move", Some(json!({ "direction": "up" }))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("read-only"));

        let (status, _) = call(&app, "DELETE", "/api/v1/cases/html-first-steps?confirm=true", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn export_summarizes_catalog() {
        let app = app().await;
        let (status, doc) = call(&app, "GET", "/api/v1/export", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doc["totalCases"], 3);
        assert_eq!(doc["exportDate"], "2026-06-01T10:00:00Z");
        assert!(doc["cases"][0].get("richBody").is_none());
    }
}
