use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::error::{ErrorExposure, ErrorReport};
use crate::middleware::tracing::RequestId;

/// Re-renders error responses produced by [`crate::error::AppError`] with the
/// request id and the exposure level of the running environment.
///
/// Must sit inside `request_id_middleware` so the id is already attached.
pub async fn error_envelope_middleware(
    State(exposure): State<ErrorExposure>,
    req: Request,
    next: Next,
) -> Response {
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.as_str().to_owned());

    let mut response = next.run(req).await;

    let Some(report) = response.extensions_mut().remove::<ErrorReport>() else {
        return response;
    };

    let mut rendered = report.render(exposure, request_id.as_deref());
    let original = response.headers();
    for name in original.keys() {
        if name == header::CONTENT_TYPE
            || name == header::CONTENT_LENGTH
            || rendered.headers().contains_key(name)
        {
            continue;
        }
        for value in original.get_all(name) {
            rendered.headers_mut().append(name.clone(), value.clone());
        }
    }

    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::middleware::request_id_middleware;
    use axum::{Router, body::Body, http::Request as HttpRequest, middleware, routing::get};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app(exposure: ErrorExposure) -> Router {
        Router::new()
            .route(
                "/boom",
                get(|| async {
                    Err::<(), _>(AppError::InternalError(anyhow::anyhow!("disk on fire")))
                }),
            )
            .route("/ok", get(|| async { "fine" }))
            .layer(middleware::from_fn_with_state(
                exposure,
                error_envelope_middleware,
            ))
            .layer(middleware::from_fn(request_id_middleware))
    }

    async fn call(app: Router, uri: &str) -> (Response, Value) {
        let res = app
            .oneshot(
                HttpRequest::builder()
                    .uri(uri)
                    .header("x-request-id", "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let (parts, body) = res.into_parts();
        let bytes = body.collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (Response::from_parts(parts, Body::empty()), json)
    }

    #[tokio::test]
    async fn production_hides_internal_message() {
        let (res, body) = call(app(ErrorExposure::Redacted), "/boom").await;
        assert_eq!(res.status(), 500);
        assert_eq!(body["message"], "Internal server error");
        assert_eq!(body["responseObject"]["requestId"], "req-42");
        assert!(body["responseObject"].get("stack").is_none());
        assert_eq!(res.headers().get("x-request-id").unwrap(), "req-42");
    }

    #[tokio::test]
    async fn development_shows_message_and_stack() {
        let (_, body) = call(app(ErrorExposure::Full), "/boom").await;
        assert_eq!(body["message"], "disk on fire");
        assert!(body["responseObject"]["stack"].as_str().unwrap().contains("disk on fire"));
    }

    #[tokio::test]
    async fn success_responses_are_untouched() {
        let (res, _) = call(app(ErrorExposure::Full), "/ok").await;
        assert_eq!(res.status(), 200);
    }
}
