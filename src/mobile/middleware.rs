use super::classify::ClientClassification;
use super::pipeline::{ErrorDetails, ResponsePipeline, ShapedResponse, TransformContext};
use crate::config::MobileConfig;
use axum::body::{Body, Bytes, HttpBody};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use futures::{stream, StreamExt};
use serde_json::{json, Value};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Shared state of the mobile adapter middleware
#[derive(Clone)]
pub struct MobileAdapter {
    config: Arc<MobileConfig>,
    pipeline: Arc<ResponsePipeline>,
    default_timeout: Duration,
    max_body_bytes: usize,
}

impl MobileAdapter {
    pub fn new(config: MobileConfig, default_timeout: Duration, max_body_bytes: usize) -> Self {
        let pipeline = ResponsePipeline::standard(&config);
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            default_timeout,
            max_body_bytes,
        }
    }

    /// Request timeout for this client
    pub fn timeout_for(&self, classification: &ClientClassification) -> Duration {
        if classification.is_slow_mobile() {
            self.config.slow_timeout()
        } else {
            self.default_timeout
        }
    }
}

/// Classify the request, adapt it for mobile clients, run it under the
/// client's timeout and reshape the response through the pipeline.
pub async fn mobile_adapter(
    State(adapter): State<MobileAdapter>,
    mut request: Request,
    next: Next,
) -> Response {
    let classification = ClientClassification::from_headers(request.headers());
    request.extensions_mut().insert(classification);
    let path = request.uri().path().to_string();

    if classification.is_mobile {
        inject_page_size(request.uri_mut(), adapter.config.default_page_size);
    }

    let request = match batch_or_request(request, adapter.max_body_bytes).await {
        Ok(BatchOutcome::Forward(request)) => request,
        Ok(BatchOutcome::Batch(response)) | Err(response) => {
            return shape(&adapter, classification, path, response).await;
        }
    };

    let timeout = adapter.timeout_for(&classification);
    let response = match tokio::time::timeout(timeout, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!("Request to {} timed out after {:?}", path, timeout);
            ErrorDetails::new("Request timed out")
                .with_code("REQUEST_TIMEOUT")
                .into_response(StatusCode::REQUEST_TIMEOUT)
        }
    };

    shape(&adapter, classification, path, response).await
}

/// Render a handler panic as a 500 carrying error details
pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "Unknown panic".to_string()
    };
    error!("Request handler panicked: {}", details);

    ErrorDetails::new("An error occurred")
        .with_code("INTERNAL_ERROR")
        .into_response(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Append `limit=<page_size>` unless the query already carries a limit
fn inject_page_size(uri: &mut Uri, page_size: usize) {
    let limit = format!("limit={}", page_size);
    let query = uri.query().unwrap_or("");
    let mut pairs: Vec<&str> = query.split('&').filter(|p| !p.is_empty()).collect();

    let has_limit = pairs.iter().any(|pair| match pair.split_once('=') {
        Some((key, value)) => key == "limit" && !value.is_empty(),
        None => false,
    });
    if has_limit {
        return;
    }

    pairs.retain(|pair| pair.split('=').next() != Some("limit"));
    pairs.push(&limit);

    let path_and_query = format!("{}?{}", uri.path(), pairs.join("&"));
    let mut parts = uri.clone().into_parts();
    match path_and_query.parse() {
        Ok(pq) => {
            parts.path_and_query = Some(pq);
            match Uri::from_parts(parts) {
                Ok(rewritten) => {
                    debug!("Injected mobile page size: {}", rewritten);
                    *uri = rewritten;
                }
                Err(e) => warn!("Could not rewrite request URI: {}", e),
            }
        }
        Err(e) => warn!("Could not rewrite request query: {}", e),
    }
}

enum BatchOutcome {
    Forward(Request),
    Batch(Response),
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/json"))
        .unwrap_or(false)
}

/// Answer `_batch` requests with one pending placeholder per entry.
///
/// Sub-requests are never executed.
async fn batch_or_request(request: Request, limit: usize) -> Result<BatchOutcome, Response> {
    if matches!(*request.method(), Method::GET | Method::HEAD) || !is_json(request.headers()) {
        return Ok(BatchOutcome::Forward(request));
    }

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, limit).await.map_err(|e| {
        warn!("Rejected request body: {}", e);
        ErrorDetails::new("Request body too large")
            .with_code("PAYLOAD_TOO_LARGE")
            .into_response(StatusCode::PAYLOAD_TOO_LARGE)
    })?;

    if let Some(entries) = batch_entries(&bytes) {
        debug!("Answering batch request with {} entries", entries);
        let results: Vec<Value> = (0..entries)
            .map(|_| json!({"status": "pending", "data": null}))
            .collect();
        return Ok(BatchOutcome::Batch(
            Json(json!({"batch": true, "results": results})).into_response(),
        ));
    }

    Ok(BatchOutcome::Forward(Request::from_parts(
        parts,
        Body::from(bytes),
    )))
}

fn batch_entries(body: &Bytes) -> Option<usize> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value.get("_batch")?.as_array().map(Vec::len)
}

async fn shape(
    adapter: &MobileAdapter,
    classification: ClientClassification,
    path: String,
    response: Response,
) -> Response {
    if response.status() == StatusCode::SWITCHING_PROTOCOLS {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let error = parts.extensions.get::<ErrorDetails>().cloned();
    let buffer = classification.is_mobile && (is_json(&parts.headers) || error.is_some());

    let (json, body) = if buffer {
        match buffer_body(body, adapter.max_body_bytes).await {
            Ok(Buffered::Complete(bytes)) => {
                (serde_json::from_slice::<Value>(&bytes).ok(), Body::from(bytes))
            }
            Ok(Buffered::Oversized(body)) => {
                debug!("Response for {} exceeds the shaping limit, passing through", path);
                parts.extensions.insert(classification);
                return Response::from_parts(parts, body);
            }
            Err(e) => {
                warn!("Could not buffer response for {}: {}", path, e);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    } else {
        (None, body)
    };

    let ctx = TransformContext {
        classification,
        path,
        now: Utc::now(),
    };
    let shaped = adapter.pipeline.run(
        ShapedResponse {
            status: parts.status,
            headers: parts.headers,
            json,
            error,
        },
        &ctx,
    );

    parts.status = shaped.status;
    parts.headers = shaped.headers;
    parts.extensions.insert(classification);

    let body = match shaped.json.map(|json| serde_json::to_vec(&json)) {
        Some(Ok(bytes)) => {
            parts.headers.remove(header::CONTENT_LENGTH);
            parts.headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            Body::from(bytes)
        }
        Some(Err(e)) => {
            warn!("Could not serialize shaped response: {}", e);
            body
        }
        None => body,
    };

    Response::from_parts(parts, body)
}

enum Buffered {
    Complete(Bytes),
    /// Over the limit; the body is rebuilt from what was read plus the rest
    Oversized(Body),
}

async fn buffer_body(body: Body, limit: usize) -> Result<Buffered, axum::Error> {
    if body.size_hint().lower() > limit as u64 {
        return Ok(Buffered::Oversized(body));
    }

    let mut data = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut total = 0usize;

    while let Some(chunk) = data.next().await {
        let chunk = chunk?;
        total += chunk.len();
        chunks.push(chunk);

        if total > limit {
            let head = stream::iter(chunks.into_iter().map(Ok::<_, axum::Error>));
            return Ok(Buffered::Oversized(Body::from_stream(head.chain(data))));
        }
    }

    let mut buffered = Vec::with_capacity(total);
    for chunk in chunks {
        buffered.extend_from_slice(&chunk);
    }
    Ok(Buffered::Complete(Bytes::from(buffered)))
}
