// src/api/mod.rs
pub mod stats;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use thiserror::Error;

use crate::{
    config::Settings,
    container::{BackendError, Connector},
    metrics,
};

#[derive(Clone)]
pub struct AppState {
    pub connector: Arc<dyn Connector>,
    pub settings: Arc<Settings>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Container ID required")]
    MissingId,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingId => StatusCode::BAD_REQUEST,
            ApiError::Backend(BackendError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/stats", get(stats::all_stats))
        .route("/stats/", get(stats::missing_id))
        .route("/stats/{id}", get(stats::container_stats))
        .route("/metrics", get(metrics::metrics_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::container::Session;
    use crate::usage::testing::*;

    struct FakeConnector {
        backend: Option<FakeBackend>,
        probe: FakeProbe,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self) -> Result<Session, BackendError> {
            let backend = self.backend.clone().ok_or_else(|| {
                BackendError::Connect("error during connect: No such file or directory".into())
            })?;
            Ok(Session {
                backend: Box::new(backend),
                probe: Box::new(self.probe.clone()),
            })
        }
    }

    fn app(backend: Option<FakeBackend>, probe: FakeProbe) -> Router {
        router(AppState {
            connector: Arc::new(FakeConnector { backend, probe }),
            settings: Arc::new(Settings::default()),
        })
    }

    fn sample() -> Router {
        let backend = FakeBackend::default()
            .with_container(
                "abcdef1234567890",
                "web1",
                vec![volume("data-vol")],
                vec![],
            )
            .with_container(
                "1234567890abcdef",
                "db",
                vec![bind(), volume("broken-vol")],
                vec![port("5432/tcp", &["15432"])],
            );
        let probe = FakeProbe::default()
            .with("data-vol", Outcome::Bytes(15_990_000))
            .with("broken-vol", Outcome::ExitCode(1));
        app(Some(backend), probe)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn lists_all_volumes() {
        let (status, body) = get(sample(), "/stats").await;
        assert_eq!(status, StatusCode::OK);

        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(
            body,
            json!([
                {
                    "container_name": "web1",
                    "container_id": "abcdef123456",
                    "volume_name": "data-vol",
                    "usage": "15.25MB",
                    "usage_mb": "15.25"
                },
                {
                    "container_name": "db",
                    "container_id": "1234567890ab",
                    "volume_name": "broken-vol",
                    "usage": "0B",
                    "usage_mb": "0.00",
                    "port": "15432"
                }
            ])
        );
    }

    #[tokio::test]
    async fn empty_host_yields_empty_array() {
        let app = app(Some(FakeBackend::default()), FakeProbe::default());
        let (status, body) = get(app, "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "[]");
    }

    #[tokio::test]
    async fn single_container() {
        let (status, body) = get(sample(), "/stats/abcdef1234567890").await;
        assert_eq!(status, StatusCode::OK);

        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["container_id"], "abcdef123456");
        assert!(body[0].get("port").is_none());
    }

    #[tokio::test]
    async fn empty_id_is_a_bad_request() {
        let (status, body) = get(sample(), "/stats/").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Container ID required");
    }

    #[tokio::test]
    async fn unknown_container_is_not_found() {
        let (status, body) = get(sample(), "/stats/doesnotexist").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("doesnotexist"));
    }

    #[tokio::test]
    async fn unreachable_daemon_is_a_server_error() {
        let (status, body) = get(app(None, FakeProbe::default()), "/stats").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("No such file or directory"));
    }

    #[tokio::test]
    async fn list_failure_is_a_server_error() {
        let backend = FakeBackend {
            list_error: true,
            ..Default::default()
        };
        let (status, _) = get(app(Some(backend), FakeProbe::default()), "/stats").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn inspect_error_is_a_server_error_for_one_container() {
        let backend = FakeBackend::default().with_broken("9999999999999999", "flaky");
        let (status, body) = get(
            app(Some(backend), FakeProbe::default()),
            "/stats/9999999999999999",
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("9999999999999999"));
    }

    #[tokio::test]
    async fn inspect_error_skips_container_in_listing() {
        let backend = FakeBackend::default()
            .with_broken("9999999999999999", "flaky")
            .with_container("abcdef1234567890", "web1", vec![volume("data-vol")], vec![]);
        let probe = FakeProbe::default().with("data-vol", Outcome::Bytes(2048));
        let (status, body) = get(app(Some(backend), probe), "/stats").await;
        assert_eq!(status, StatusCode::OK);

        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["container_name"], "web1");
    }
}
