//! HTTP API
//!
//! Exposes entity states, button presses, the effective configuration and
//! an options endpoint that reloads the entry.

use crate::buttons::Button;
use crate::config::{Config, EntryOptions};
use crate::entity::StateReader;
use crate::integration::Ampster;
use crate::logging::get_logger;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

mod logs;

#[derive(Clone)]
pub struct AppState {
    pub app: Arc<Ampster>,
    /// Entry served by the config and options endpoints
    pub entry_id: String,
    pub log_file: String,
}

impl AppState {
    pub fn new(app: Arc<Ampster>, entry_id: impl Into<String>, log_file: impl Into<String>) -> Self {
        Self {
            app,
            entry_id: entry_id.into(),
            log_file: log_file.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SetStateBody {
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({"ok": false, "error": message.into()}))).into_response()
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn version() -> impl IntoResponse {
    Json(json!({"version": env!("APP_VERSION")}))
}

pub async fn list_states(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.app.registry().all_states())
}

pub async fn get_entity_state(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> Response {
    match state.app.registry().get_state(&entity_id) {
        Some(s) => Json(s).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("Unknown entity {}", entity_id)),
    }
}

pub async fn set_entity_state(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
    Json(body): Json<SetStateBody>,
) -> Response {
    let registry = state.app.registry();
    match registry.set_state(&entity_id, body.state, body.attributes) {
        Ok(()) => match registry.get_state(&entity_id) {
            Some(s) => Json(s).into_response(),
            None => error_response(StatusCode::INTERNAL_SERVER_ERROR, "state vanished"),
        },
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

pub async fn press_button(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> Response {
    let Some(button) = state.app.registry().button(&entity_id) else {
        return error_response(StatusCode::NOT_FOUND, format!("Unknown button {}", entity_id));
    };
    get_logger("web").info(&format!("Button {} pressed", entity_id));
    button.press().await;
    (StatusCode::OK, Json(json!({"ok": true}))).into_response()
}

async fn current_config(state: &AppState) -> Option<Config> {
    state.app.config(&state.entry_id).await
}

pub async fn get_config(State(state): State<AppState>) -> Response {
    match current_config(&state).await {
        Some(config) => {
            let value = serde_json::to_value(config.redacted())
                .unwrap_or_else(|_| json!({"error": "serialization"}));
            Json(value).into_response()
        }
        None => error_response(StatusCode::SERVICE_UNAVAILABLE, "Entry not loaded"),
    }
}

pub async fn get_config_schema() -> impl IntoResponse {
    let schema = schemars::schema_for!(Config);
    Json(serde_json::to_value(&schema).unwrap_or_else(|_| json!({"error": "schema"})))
}

pub async fn post_options(
    State(state): State<AppState>,
    Json(options): Json<EntryOptions>,
) -> Response {
    match state.app.update_options(&state.entry_id, options).await {
        Ok(reloaded) => (StatusCode::OK, Json(json!({"ok": true, "reloaded": reloaded}))).into_response(),
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/version", get(version))
        .route("/api/states", get(list_states))
        .route(
            "/api/states/{entity_id}",
            get(get_entity_state).post(set_entity_state),
        )
        .route("/api/buttons/{entity_id}/press", post(press_button))
        .route("/api/config", get(get_config))
        .route("/api/config/schema", get(get_config_schema))
        .route("/api/options", post(post_options))
        .merge(logs::routes())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let router = build_router(state);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .unwrap_or_else(|_| ([127, 0, 0, 1], port).into());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    get_logger("web").info(&format!("HTTP API listening on {}", addr));
    axum::serve(listener, router).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Country;
    use crate::fetcher::{FetchError, PriceSource};
    use crate::integration::DEFAULT_ENTRY_ID;
    use crate::price::PriceSnapshot;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct Fixed;

    #[async_trait::async_trait]
    impl PriceSource for Fixed {
        async fn fetch(&self, _url: &str) -> std::result::Result<PriceSnapshot, FetchError> {
            Ok(json!({"current_period_all_in_price": 0.25, "country": "NL"})
                .as_object()
                .cloned()
                .unwrap())
        }
    }

    async fn loaded_state() -> AppState {
        let app = Arc::new(Ampster::new());
        let mut config = Config::default();
        config.entry.country_prefix = Some(Country::NL);
        config.entry.api_key = "secret".to_string();
        app.setup_entry_with_source(DEFAULT_ENTRY_ID, &config, Arc::new(Fixed))
            .await
            .unwrap();
        AppState::new(app, DEFAULT_ENTRY_ID, "/nonexistent/ampster.log")
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_ok() {
        let router = Router::new().route("/api/health", get(health));
        let response = router.oneshot(get_req("/api/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn lists_and_reads_states() {
        let router = build_router(loaded_state().await);

        let response = router.clone().oneshot(get_req("/api/states")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let states = body_json(response).await;
        assert!(states.as_array().unwrap().len() >= 4);

        let response = router
            .clone()
            .oneshot(get_req("/api/states/sensor.ampster_country"))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["state"], "NL");

        let response = router
            .oneshot(get_req("/api/states/sensor.nope"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn external_state_can_be_set_but_not_managed() {
        let router = build_router(loaded_state().await);

        let response = router
            .clone()
            .oneshot(post_json("/api/states/sensor.test_sensor", json!({"state": "on"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["state"], "on");

        let response = router
            .oneshot(post_json("/api/states/sensor.ampster_country", json!({"state": "FR"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn pressing_buttons() {
        let router = build_router(loaded_state().await);

        let response = router
            .clone()
            .oneshot(post_json("/api/buttons/button.ampster_update_now/press", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(post_json("/api/buttons/button.missing/press", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn config_is_redacted() {
        let router = build_router(loaded_state().await);
        let response = router.oneshot(get_req("/api/config")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["entry"]["api_key"], "***");
    }

    #[tokio::test]
    async fn config_schema_is_json() {
        let router = Router::new().route("/api/config/schema", get(get_config_schema));
        let response = router.oneshot(get_req("/api/config/schema")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await.is_object());
    }

    #[tokio::test]
    async fn invalid_options_are_rejected() {
        let router = build_router(loaded_state().await);
        let response = router
            .oneshot(post_json("/api/options", json!({"minute": 75})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_log_file_is_not_found() {
        let router = build_router(loaded_state().await);
        let response = router.oneshot(get_req("/api/logs/tail")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
