//! Operator API, served on its own listener.

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};

use self::auth::admin_auth_middleware;
use self::handlers::{get_forms, get_status};
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/forms", get(get_forms))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FormConfig, RelayConfig};
    use crate::http::HttpServer;
    use crate::store::{MemorySubmissionLog, SubmissionLog};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn server(log: Arc<MemorySubmissionLog>) -> HttpServer {
        let mut config = RelayConfig::default();
        config.admin.api_key = "s3cret".into();
        config.forms.push(FormConfig {
            id: "abcd".into(),
            server_url: "http://odk.test".into(),
            open_rosa_id: "household".into(),
            active: true,
        });
        HttpServer::new(config).with_submission_log(log)
    }

    fn get(uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(key) = key {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_requires_api_key() {
        let router = server(Arc::new(MemorySubmissionLog::new(None))).admin_router();
        let response = router.clone().oneshot(get("/admin/status", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let response = router.oneshot(get("/admin/status", Some("wrong"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_forms_include_submission_counts() {
        let log = Arc::new(MemorySubmissionLog::new(None));
        log.record_if_new("abcd", "uuid:1", None).await.unwrap();
        log.record_if_new("abcd", "uuid:2", None).await.unwrap();

        let router = server(log).admin_router();
        let response = router.oneshot(get("/admin/forms", Some("s3cret"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let forms: Vec<handlers::FormStatus> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0].id, "abcd");
        assert_eq!(forms[0].submissions, 2);
    }
}
