//! HTTP front end for the tracker
//!
//! Lets an orchestration process (e.g. a container event watcher) drive
//! the tracker over HTTP.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tracing::info;

use crate::api::ExposureApi;
use crate::error::TrackerError;
use crate::tracker::Tracker;
use crate::types::PortMap;

/// Build the router for a shared tracker
pub fn router<A: ExposureApi + 'static>(tracker: Arc<Tracker<A>>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/containers", get(list_containers::<A>).delete(remove_all::<A>))
        .route(
            "/containers/:id",
            get(get_container::<A>)
                .put(add_container::<A>)
                .delete(remove_container::<A>),
        )
        .with_state(tracker)
}

// Exposure Service failures surface as 502 with the tracker's message.
struct RemoteFailure {
    err: TrackerError,
    tracked: Option<PortMap>,
}

impl IntoResponse for RemoteFailure {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.err.to_string(),
            "binding": self.err.binding(),
        });
        if let Some(tracked) = self.tracked {
            body["tracked"] = json!(tracked);
        }
        (StatusCode::BAD_GATEWAY, Json(body)).into_response()
    }
}

impl From<TrackerError> for RemoteFailure {
    fn from(err: TrackerError) -> Self {
        Self { err, tracked: None }
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "port-tracker",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn list_containers<A: ExposureApi + 'static>(
    State(tracker): State<Arc<Tracker<A>>>,
) -> Json<Vec<String>> {
    Json(tracker.containers())
}

async fn get_container<A: ExposureApi + 'static>(
    State(tracker): State<Arc<Tracker<A>>>,
    Path(id): Path<String>,
) -> Response {
    match tracker.get(&id) {
        Some(ports) => Json(ports).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "container_not_tracked"})),
        )
            .into_response(),
    }
}

async fn add_container<A: ExposureApi + 'static>(
    State(tracker): State<Arc<Tracker<A>>>,
    Path(id): Path<String>,
    Json(ports): Json<PortMap>,
) -> Result<Json<PortMap>, RemoteFailure> {
    info!(container_id = %id, "Add requested");

    match tracker.add(&id, &ports).await {
        Ok(()) => Ok(Json(tracker.get(&id).unwrap_or_default())),
        // Partial success: report what did get exposed
        Err(err) => Err(RemoteFailure {
            err,
            tracked: tracker.get(&id),
        }),
    }
}

async fn remove_container<A: ExposureApi + 'static>(
    State(tracker): State<Arc<Tracker<A>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, RemoteFailure> {
    info!(container_id = %id, "Remove requested");

    tracker.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_all<A: ExposureApi + 'static>(
    State(tracker): State<Arc<Tracker<A>>>,
) -> Result<StatusCode, RemoteFailure> {
    info!("Remove all requested");

    tracker.remove_all().await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ExposeRequest, UnexposeRequest};
    use crate::error::ApiError;
    use crate::types::PortBinding;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    /// Accepts everything except local addresses on port 81
    struct PickyApi;

    #[async_trait]
    impl ExposureApi for PickyApi {
        async fn expose(&self, request: &ExposeRequest) -> Result<(), ApiError> {
            if request.local.ends_with(":81") {
                return Err(ApiError::status(500, "port in use"));
            }
            Ok(())
        }

        async fn unexpose(&self, _request: &UnexposeRequest) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn app() -> (Router, Arc<Tracker<PickyApi>>) {
        let tracker = Arc::new(Tracker::with_api(PickyApi, "192.168.127.2"));
        (router(tracker.clone()), tracker)
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (app, tracker) = app();
        let body = r#"{"80/tcp":[{"HostIp":"127.0.0.1","HostPort":"80"}]}"#;

        let (status, json) = send(app.clone(), "PUT", "/containers/abc", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["80/tcp"][0]["HostPort"], "80");

        let (status, json) = send(app, "GET", "/containers/abc", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["80/tcp"][0]["HostIp"], "127.0.0.1");
        assert_eq!(tracker.containers(), vec!["abc".to_string()]);
    }

    #[tokio::test]
    async fn test_partial_put_reports_tracked_ports() {
        let (app, tracker) = app();
        let body = r#"{"80/tcp":[{"HostIp":"127.0.0.1","HostPort":"80"},{"HostIp":"127.0.0.1","HostPort":"81"}]}"#;

        let (status, json) = send(app, "PUT", "/containers/abc", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["binding"]["HostPort"], "81");
        assert_eq!(json["tracked"]["80/tcp"].as_array().map(Vec::len), Some(1));
        assert!(json["error"]
            .as_str()
            .unwrap()
            .starts_with("failed exposing 127.0.0.1:81"));

        let tracked = tracker.get("abc").unwrap();
        assert_eq!(tracked["80/tcp"], vec![PortBinding::new("127.0.0.1", "80")]);
    }

    #[tokio::test]
    async fn test_get_untracked_is_not_found() {
        let (app, _) = app();
        let (status, _) = send(app, "GET", "/containers/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_routes() {
        let (app, tracker) = app();
        let body = r#"{"443/tcp":[{"HostIp":"127.0.0.1","HostPort":"443"}]}"#;
        send(app.clone(), "PUT", "/containers/a", Some(body)).await;
        send(app.clone(), "PUT", "/containers/b", Some(body)).await;

        let (status, _) = send(app.clone(), "DELETE", "/containers/a", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(tracker.containers(), vec!["b".to_string()]);

        let (status, _) = send(app, "DELETE", "/containers", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(tracker.is_empty());
    }
}
