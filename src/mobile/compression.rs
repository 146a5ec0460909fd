use super::classify::ClientClassification;
use axum::body::HttpBody;
use axum::http::{Response, StatusCode};
use axum::Router;
use tower_http::compression::predicate::{DefaultPredicate, Predicate};
use tower_http::compression::{CompressionLayer, CompressionLevel};

fn is_mobile<B>(response: &Response<B>) -> bool {
    response
        .extensions()
        .get::<ClientClassification>()
        .map(|c| c.is_mobile)
        .unwrap_or(false)
}

/// Compress every mobile response
#[derive(Debug, Clone, Copy, Default)]
pub struct MobileClients;

impl Predicate for MobileClients {
    fn should_compress<B>(&self, response: &Response<B>) -> bool
    where
        B: HttpBody,
    {
        is_mobile(response) && response.status() != StatusCode::SWITCHING_PROTOCOLS
    }
}

/// Content-type and size based compression for everyone else
#[derive(Clone)]
pub struct DesktopClients {
    default: DefaultPredicate,
}

impl Default for DesktopClients {
    fn default() -> Self {
        Self {
            default: DefaultPredicate::new(),
        }
    }
}

impl Predicate for DesktopClients {
    fn should_compress<B>(&self, response: &Response<B>) -> bool
    where
        B: HttpBody,
    {
        !is_mobile(response) && self.default.should_compress(response)
    }
}

/// Wrap `router` in the two compression policies.
///
/// Mobile responses are compressed at the best level by the outer layer,
/// desktop responses at the default level by the inner one. A response is
/// never compressed twice because the outer layer skips anything that
/// already carries a `Content-Encoding`.
pub fn with_compression<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(
            CompressionLayer::new()
                .quality(CompressionLevel::Default)
                .compress_when(DesktopClients::default()),
        )
        .layer(
            CompressionLayer::new()
                .quality(CompressionLevel::Best)
                .compress_when(MobileClients),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mobile::ConnectionType;
    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::routing::get;
    use tower::ServiceExt;

    fn small_json(classification: Option<ClientClassification>) -> Response<Body> {
        let mut response = Response::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"ok":true}"#))
            .unwrap();
        if let Some(classification) = classification {
            response.extensions_mut().insert(classification);
        }
        response
    }

    fn mobile() -> ClientClassification {
        ClientClassification {
            is_mobile: true,
            connection_type: ConnectionType::Fast,
        }
    }

    #[test]
    fn test_mobile_always_compressed() {
        assert!(MobileClients.should_compress(&small_json(Some(mobile()))));
        assert!(!MobileClients.should_compress(&small_json(None)));
    }

    #[test]
    fn test_desktop_uses_default_predicate() {
        // Below the default size threshold
        assert!(!DesktopClients::default().should_compress(&small_json(None)));
        assert!(!DesktopClients::default().should_compress(&small_json(Some(mobile()))));

        let large = Response::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("x".repeat(4096)))
            .unwrap();
        assert!(DesktopClients::default().should_compress(&large));
    }

    #[tokio::test]
    async fn test_router_compresses_mobile_responses() {
        let router = with_compression(Router::new().route(
            "/",
            get(|| async { small_json(Some(mobile())) }),
        ));

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::ACCEPT_ENCODING, "gzip")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
    }
}
