//! AJAX-style endpoints for the calendar front-end.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{FromRequest, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::api_client::ApiError;
use crate::app::App;
use crate::sync::SyncError;

pub type AppState = Arc<App>;

/// `{"success": true, "data": ...}`
#[derive(Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

#[derive(Serialize)]
struct Message {
    message: String,
}

#[derive(Serialize)]
struct SyncData {
    message: String,
    synced_count: usize,
    error_count: usize,
}

#[derive(Serialize)]
struct EnhancedData {
    html: String,
    event_id: i64,
}

/// Error half of the envelope, with a status code that matches the cause.
pub struct AjaxError {
    status: StatusCode,
    message: String,
}

impl AjaxError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for AjaxError {
    fn into_response(self) -> Response {
        let body = Json(Envelope {
            success: false,
            data: Message {
                message: self.message,
            },
        });
        (self.status, body).into_response()
    }
}

impl From<ApiError> for AjaxError {
    fn from(err: ApiError) -> Self {
        let status = match err {
            ApiError::MissingCredentials | ApiError::InvalidEndpoint(_) => StatusCode::BAD_REQUEST,
            ApiError::Transport(_) | ApiError::Status { .. } | ApiError::MalformedResponse(_) => {
                StatusCode::BAD_GATEWAY
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<SyncError> for AjaxError {
    fn from(err: SyncError) -> Self {
        let message = err.to_string();
        match err {
            SyncError::Api(api) => api.into(),
            SyncError::DependencyMissing => Self::new(StatusCode::SERVICE_UNAVAILABLE, message),
            _ => {
                error!("request failed: {message}");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        }
    }
}

/// `event_id` from either a urlencoded form or a JSON body.
#[derive(Debug, Default, Deserialize)]
pub struct EventIdRequest {
    #[serde(default)]
    pub event_id: Option<Value>,
}

impl<S> FromRequest<S> for EventIdRequest
where
    S: Send + Sync,
{
    type Rejection = AjaxError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/json"));

        let parsed = if is_json {
            Json::<EventIdRequest>::from_request(req, state)
                .await
                .map(|Json(body)| body)
                .map_err(|err| err.body_text())
        } else {
            Form::<EventIdRequest>::from_request(req, state)
                .await
                .map(|Form(body)| body)
                .map_err(|err| err.body_text())
        };
        parsed.map_err(|message| AjaxError::new(StatusCode::BAD_REQUEST, message))
    }
}

impl EventIdRequest {
    /// Positive local event id; negatives are folded to their absolute value.
    fn event_id(&self) -> Option<i64> {
        let id = match self.event_id.as_ref()? {
            Value::Number(n) => n.as_i64()?,
            Value::String(s) => s.trim().parse::<i64>().ok()?,
            _ => return None,
        };
        Some(id.saturating_abs()).filter(|id| *id > 0)
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ajax/sync_events", post(sync_events))
        .route("/ajax/get_enhanced_content", post(get_enhanced_content))
        .route("/ajax/test_connection", post(test_connection))
        .with_state(state)
        .layer(cors)
}

/// POST /ajax/sync_events
async fn sync_events(State(app): State<AppState>) -> Result<Json<Envelope<SyncData>>, AjaxError> {
    let report = app.run_sync().await?;
    Ok(Json(Envelope {
        success: true,
        data: SyncData {
            message: format!("Successfully synchronized {} events.", report.synced_count),
            synced_count: report.synced_count,
            error_count: report.error_count,
        },
    }))
}

/// POST /ajax/get_enhanced_content
async fn get_enhanced_content(
    State(app): State<AppState>,
    request: EventIdRequest,
) -> Result<Json<Envelope<EnhancedData>>, AjaxError> {
    let event_id = request
        .event_id()
        .ok_or_else(|| AjaxError::new(StatusCode::BAD_REQUEST, "Invalid event ID"))?;

    let html = tokio::task::spawn_blocking(move || app.enhanced_content(event_id))
        .await
        .map_err(|err| AjaxError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))??
        .ok_or_else(|| AjaxError::new(StatusCode::NOT_FOUND, "No enhanced data available"))?;

    Ok(Json(Envelope {
        success: true,
        data: EnhancedData { html, event_id },
    }))
}

/// POST /ajax/test_connection
async fn test_connection(State(app): State<AppState>) -> Result<Json<Envelope<Message>>, AjaxError> {
    app.test_connection().await?;
    Ok(Json(Envelope {
        success: true,
        data: Message {
            message: "Connection successful".to_string(),
        },
    }))
}

/// Serves until ctrl-c.
pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("live-connect listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("failed to listen for shutdown signal: {err}");
            }
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, ConfigStore};
    use crate::db::Store;
    use axum::{body::Body, routing::get};
    use serde_json::json;
    use tower::ServiceExt;

    async fn spawn_platform(events: Value) -> String {
        let app = Router::new()
            .route("/health", get(|| async { StatusCode::OK }))
            .route("/events", get(move || async move { Json(json!({ "events": events })) }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn state(config: AppConfig) -> AppState {
        let store = Store::open_in_memory().unwrap();
        store.install_calendar_schema().unwrap();
        Arc::new(App::new(ConfigStore::in_memory(config), store))
    }

    fn configured(endpoint: String) -> AppConfig {
        AppConfig {
            api_endpoint: endpoint,
            api_token: "secret".into(),
            ..AppConfig::default()
        }
    }

    async fn call(state: AppState, request: axum::http::Request<Body>) -> (StatusCode, Value) {
        let response = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_form(uri: &str, body: &str) -> axum::http::Request<Body> {
        axum::http::Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn sync_then_enhance() {
        let endpoint = spawn_platform(json!([{
            "id": "ext-1",
            "title": "Show",
            "start_date": "2024-05-01T20:00:00Z",
            "venue": {"name": "The Hall"},
            "artists": [{"name": "Headliner"}]
        }]))
        .await;
        let state = state(configured(endpoint));

        let (status, body) = call(state.clone(), post_form("/ajax/sync_events", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"]["synced_count"], json!(1));
        assert_eq!(body["data"]["error_count"], json!(0));
        assert_eq!(body["data"]["message"], json!("Successfully synchronized 1 events."));

        let event_id = state
            .store()
            .unwrap()
            .find_event_by_platform_id("ext-1")
            .unwrap()
            .unwrap();

        let (status, body) = call(
            state.clone(),
            post_form("/ajax/get_enhanced_content", &format!("event_id={event_id}")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["event_id"], json!(event_id));
        assert!(body["data"]["html"]
            .as_str()
            .unwrap()
            .contains("<h5>Headliner</h5>"));

        let json_request = axum::http::Request::post("/ajax/get_enhanced_content")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "event_id": event_id }).to_string()))
            .unwrap();
        let (status, _) = call(state, json_request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn event_without_extras_returns_empty_wrapper() {
        let endpoint = spawn_platform(json!([{"id": "bare", "title": "Quiet Night"}])).await;
        let state = state(configured(endpoint));
        let (status, _) = call(state.clone(), post_form("/ajax/sync_events", "")).await;
        assert_eq!(status, StatusCode::OK);

        let event_id = state
            .store()
            .unwrap()
            .find_event_by_platform_id("bare")
            .unwrap()
            .unwrap();
        let (status, body) = call(
            state,
            post_form("/ajax/get_enhanced_content", &format!("event_id={event_id}")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(
            body["data"]["html"],
            json!("<div class=\"live-connect-enhanced-content\"></div>")
        );
    }

    #[tokio::test]
    async fn enhance_rejects_bad_or_unknown_ids() {
        let state = state(AppConfig::default());

        let (status, body) =
            call(state.clone(), post_form("/ajax/get_enhanced_content", "event_id=abc")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["data"]["message"], json!("Invalid event ID"));

        let (status, _) = call(state.clone(), post_form("/ajax/get_enhanced_content", "")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) =
            call(state, post_form("/ajax/get_enhanced_content", "event_id=42")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["data"]["message"], json!("No enhanced data available"));
    }

    #[tokio::test]
    async fn sync_without_credentials_is_a_client_error() {
        let (status, body) = call(
            state(AppConfig::default()),
            post_form("/ajax/sync_events", ""),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
        assert_eq!(
            body["data"]["message"],
            json!("API endpoint or token not configured")
        );
    }

    #[tokio::test]
    async fn test_connection_reports_success() {
        let endpoint = spawn_platform(json!([])).await;
        let (status, body) = call(
            state(configured(endpoint)),
            post_form("/ajax/test_connection", ""),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["message"], json!("Connection successful"));
    }

    #[test]
    fn event_id_parsing() {
        let parse = |value: Value| EventIdRequest { event_id: Some(value) }.event_id();
        assert_eq!(parse(json!("12")), Some(12));
        assert_eq!(parse(json!(" 7 ")), Some(7));
        assert_eq!(parse(json!(-3)), Some(3));
        assert_eq!(parse(json!(0)), None);
        assert_eq!(parse(json!("x")), None);
        assert_eq!(parse(json!(null)), None);
        assert_eq!(EventIdRequest::default().event_id(), None);
    }
}
