use std::future::Future;
use std::time::Duration;

use reqwest::{header, Client, StatusCode, Url};
use thiserror::Error;

use crate::config::AppConfig;
use crate::models::{EventBatch, UpstreamEvent};

const USER_AGENT: &str = concat!("live-connect/", env!("CARGO_PKG_VERSION"));
const READ_TIMEOUT: Duration = Duration::from_secs(30);
const LIST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API endpoint or token not configured")]
    MissingCredentials,
    #[error("invalid API endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("http error: {0}")]
    Transport(String),
    #[error("API returned status code {status}")]
    Status { status: u16 },
    #[error("invalid JSON response from API: {0}")]
    MalformedResponse(String),
}

/// Anything the sync engine can pull events from.
pub trait EventSource {
    fn fetch_events(
        &self,
        limit: u32,
        offset: u32,
    ) -> impl Future<Output = Result<EventBatch, ApiError>> + Send;

    fn fetch_event(&self, id: &str) -> impl Future<Output = Result<UpstreamEvent, ApiError>> + Send;
}

/// Read-only client for the event platform. Every call is a single GET with a bearer token;
/// retries are left to the caller.
#[derive(Clone)]
pub struct ApiClient {
    endpoint: String,
    token: String,
    client: Client,
}

impl ApiClient {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!("falling back to default http client: {err}");
                Client::new()
            });
        Self {
            endpoint: endpoint.into().trim().to_string(),
            token: token.into().trim().to_string(),
            client,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.api_endpoint.clone(), config.api_token.clone())
    }

    pub async fn test_connection(&self) -> Result<(), ApiError> {
        let url = self.url(&["health"])?;
        self.get(url, READ_TIMEOUT).await?;
        Ok(())
    }

    pub async fn fetch_events(&self, limit: u32, offset: u32) -> Result<EventBatch, ApiError> {
        let mut url = self.url(&["events"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());

        let body = self.get(url, LIST_TIMEOUT).await?;
        serde_json::from_str(&body).map_err(|err| ApiError::MalformedResponse(err.to_string()))
    }

    pub async fn fetch_event(&self, id: &str) -> Result<UpstreamEvent, ApiError> {
        let url = self.url(&["events", id])?;
        let body = self.get(url, READ_TIMEOUT).await?;
        serde_json::from_str(&body).map_err(|err| ApiError::MalformedResponse(err.to_string()))
    }

    fn credentials(&self) -> Result<(&str, &str), ApiError> {
        if self.endpoint.is_empty() || self.token.is_empty() {
            return Err(ApiError::MissingCredentials);
        }
        Ok((&self.endpoint, &self.token))
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let (endpoint, _) = self.credentials()?;
        let mut url = Url::parse(endpoint.trim_end_matches('/'))
            .map_err(|err| ApiError::InvalidEndpoint(err.to_string()))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ApiError::InvalidEndpoint(endpoint.to_string()))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    async fn get(&self, url: Url, timeout: Duration) -> Result<String, ApiError> {
        let (_, token) = self.credentials()?;
        tracing::debug!(%url, "platform request");

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, "application/json")
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| ApiError::Transport(err.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ApiError::Status {
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|err| ApiError::Transport(err.to_string()))
    }
}

impl EventSource for ApiClient {
    async fn fetch_events(&self, limit: u32, offset: u32) -> Result<EventBatch, ApiError> {
        ApiClient::fetch_events(self, limit, offset).await
    }

    async fn fetch_event(&self, id: &str) -> Result<UpstreamEvent, ApiError> {
        ApiClient::fetch_event(self, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, Query},
        http::{HeaderMap, StatusCode as AxumStatus},
        response::IntoResponse,
        routing::get,
        Json, Router,
    };
    use serde_json::json;
    use std::collections::HashMap;

    async fn spawn_platform() -> String {
        async fn health(headers: HeaderMap) -> AxumStatus {
            match headers.get("authorization").and_then(|v| v.to_str().ok()) {
                Some("Bearer secret") => AxumStatus::OK,
                _ => AxumStatus::UNAUTHORIZED,
            }
        }

        async fn events(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
            Json(json!({
                "events": [{"id": "ext-1", "title": "Show"}],
                "limit": params.get("limit"),
                "offset": params.get("offset"),
            }))
        }

        async fn event(Path(id): Path<String>) -> axum::response::Response {
            match id.as_str() {
                "broken" => "{not json".into_response(),
                "missing" => AxumStatus::NOT_FOUND.into_response(),
                other => Json(json!({"id": other, "title": "Single"})).into_response(),
            }
        }

        let app = Router::new()
            .route("/v1/health", get(health))
            .route("/v1/events", get(events))
            .route("/v1/events/{id}", get(event));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1/")
    }

    #[tokio::test]
    async fn missing_token_fails_before_any_request() {
        // Nothing listens on this port; reaching the network would surface as Transport.
        let client = ApiClient::new("http://127.0.0.1:9", "  ");
        assert!(matches!(
            client.fetch_events(50, 0).await,
            Err(ApiError::MissingCredentials)
        ));
        assert!(matches!(
            client.test_connection().await,
            Err(ApiError::MissingCredentials)
        ));

        let client = ApiClient::new("", "secret");
        assert!(matches!(
            client.fetch_event("ext-1").await,
            Err(ApiError::MissingCredentials)
        ));
    }

    #[tokio::test]
    async fn health_check_sends_bearer_token() {
        let base = spawn_platform().await;
        assert!(ApiClient::new(&base, "secret").test_connection().await.is_ok());
        assert!(matches!(
            ApiClient::new(&base, "wrong").test_connection().await,
            Err(ApiError::Status { status: 401 })
        ));
    }

    #[tokio::test]
    async fn fetch_events_decodes_batch() {
        let base = spawn_platform().await;
        let batch = ApiClient::new(&base, "secret")
            .fetch_events(25, 50)
            .await
            .unwrap();
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0]["id"], json!("ext-1"));
        assert_eq!(batch.total, None);
    }

    #[tokio::test]
    async fn fetch_event_maps_errors() {
        let base = spawn_platform().await;
        let client = ApiClient::new(&base, "secret");

        let event = client.fetch_event("ext 9").await.unwrap();
        assert_eq!(event.id.as_deref(), Some("ext 9"));

        assert!(matches!(
            client.fetch_event("broken").await,
            Err(ApiError::MalformedResponse(_))
        ));
        assert!(matches!(
            client.fetch_event("missing").await,
            Err(ApiError::Status { status: 404 })
        ));
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ApiClient::new(format!("http://{addr}"), "secret");
        assert!(matches!(
            client.fetch_events(1, 0).await,
            Err(ApiError::Transport(_))
        ));
    }

    #[test]
    fn urls_join_segments_once() {
        let client = ApiClient::new("https://api.example.com/v1/", "t");
        assert_eq!(
            client.url(&["events", "a/b"]).unwrap().as_str(),
            "https://api.example.com/v1/events/a%2Fb"
        );
        let bad = ApiClient::new("mailto:someone@example.com", "t");
        assert!(matches!(
            bad.url(&["health"]),
            Err(ApiError::InvalidEndpoint(_))
        ));
    }
}
