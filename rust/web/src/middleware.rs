use std::time::Instant;
use warp::http::Method;
use warp::path::FullPath;
use warp::reject::Rejection;
use warp::reply::{Reply, Response};
use warp::Filter;

/// Wraps a route tree with method/path/status/latency logging. The level
/// follows the response class: server errors log at error, client errors
/// at warn, everything else at info.
pub fn with_request_logging<F, T>(
    filter: F,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone
where
    F: Filter<Extract = (T,), Error = Rejection> + Clone + Send + Sync + 'static,
    T: Reply,
{
    warp::any()
        .and(warp::method())
        .and(warp::path::full())
        .map(|method: Method, path: FullPath| (Instant::now(), method, path))
        .and(filter)
        .map(
            |(start, method, path): (Instant, Method, FullPath), reply: T| {
                let response = reply.into_response();
                let status = response.status();
                let duration_ms = start.elapsed().as_millis();

                if status.is_server_error() {
                    tracing::error!(
                        method = %method,
                        path = %path.as_str(),
                        status = status.as_u16(),
                        duration_ms = duration_ms,
                        "request completed"
                    );
                } else if status.is_client_error() {
                    tracing::warn!(
                        method = %method,
                        path = %path.as_str(),
                        status = status.as_u16(),
                        duration_ms = duration_ms,
                        "request completed"
                    );
                } else {
                    tracing::info!(
                        method = %method,
                        path = %path.as_str(),
                        status = status.as_u16(),
                        duration_ms = duration_ms,
                        "request completed"
                    );
                }
                response
            },
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogCapture;
    use tracing::Level;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;
    use warp::http::StatusCode;

    #[tokio::test]
    async fn test_request_logging_records_success() {
        let capture = LogCapture::new();
        let layer = capture.clone().into_layer::<Registry>();
        let registry = Registry::default().with(layer);

        let _guard = tracing::subscriber::set_default(registry);

        let route = warp::path!("ping")
            .and(warp::get())
            .map(|| warp::reply::json(&"pong"));
        let logged = with_request_logging(route);

        let response = warp::test::request()
            .method("GET")
            .path("/ping")
            .reply(&logged)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let entries = capture.entries();
        assert!(entries.iter().any(|e| {
            e.level == Level::INFO
                && e.message.contains("request completed")
                && e.fields.iter().any(|(k, v)| k == "status" && v.contains("200"))
                && e.fields.iter().any(|(k, v)| k == "path" && v.contains("/ping"))
        }));
    }

    #[tokio::test]
    async fn test_request_logging_flags_client_errors() {
        let capture = LogCapture::new();
        let layer = capture.clone().into_layer::<Registry>();
        let registry = Registry::default().with(layer);

        let _guard = tracing::subscriber::set_default(registry);

        let route = warp::path!("missing")
            .and(warp::get())
            .map(|| warp::reply::with_status("gone", StatusCode::NOT_FOUND));
        let logged = with_request_logging(route);

        let response = warp::test::request()
            .method("GET")
            .path("/missing")
            .reply(&logged)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let entries = capture.entries();
        assert!(entries.iter().any(|e| {
            e.level == Level::WARN
                && e.fields.iter().any(|(k, v)| k == "status" && v.contains("404"))
        }));
    }
}
