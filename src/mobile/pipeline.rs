//! Ordered response transforms applied to buffered responses.
//!
//! Each transform is a pure function from one [`ShapedResponse`] to the
//! next; the pipeline owns the order. The axum middleware only buffers the
//! response and hands it over.

use super::classify::ClientClassification;
use crate::config::MobileConfig;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use tracing::trace;

const DEFAULT_ERROR_MESSAGE: &str = "An error occurred";
const DEFAULT_ERROR_CODE: &str = "INTERNAL_ERROR";

/// Error description attached to error responses as a response extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetails {
    pub message: String,
    pub code: Option<String>,
}

impl ErrorDetails {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Desktop error body, carrying the details for later reshaping
    pub fn into_response(self, status: StatusCode) -> Response {
        let body = Json(json!({
            "error": self.message,
            "code": self.code.as_deref().unwrap_or(DEFAULT_ERROR_CODE),
        }));
        let mut response = (status, body).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

/// A response as seen by the transforms
#[derive(Debug, Clone)]
pub struct ShapedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Parsed JSON body; `None` when the body was not buffered or not JSON
    pub json: Option<Value>,
    pub error: Option<ErrorDetails>,
}

impl ShapedResponse {
    pub fn json(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            json: Some(body),
            error: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.status.is_client_error() || self.status.is_server_error()
    }
}

/// Request facts the transforms may depend on
#[derive(Debug, Clone)]
pub struct TransformContext {
    pub classification: ClientClassification,
    pub path: String,
    pub now: DateTime<Utc>,
}

pub trait ResponseTransform: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, response: ShapedResponse, ctx: &TransformContext) -> ShapedResponse;
}

/// Mobile clients get the simplified error envelope
pub struct MobileErrorEnvelope;

impl ResponseTransform for MobileErrorEnvelope {
    fn name(&self) -> &'static str {
        "mobile_error_envelope"
    }

    fn apply(&self, mut response: ShapedResponse, ctx: &TransformContext) -> ShapedResponse {
        if !ctx.classification.is_mobile {
            return response;
        }
        let Some(error) = response.error.clone() else {
            return response;
        };

        if !(response.status.is_client_error() || response.status.is_server_error()) {
            response.status = StatusCode::INTERNAL_SERVER_ERROR;
        }

        let message = if error.message.is_empty() {
            DEFAULT_ERROR_MESSAGE.to_string()
        } else {
            error.message
        };

        response.json = Some(json!({
            "error": {
                "message": message,
                "code": error.code.as_deref().unwrap_or(DEFAULT_ERROR_CODE),
                "mobile": true,
            }
        }));
        response
    }
}

/// Adds the `_mobile` metadata block to JSON object bodies
pub struct MobileMetadata;

impl ResponseTransform for MobileMetadata {
    fn name(&self) -> &'static str {
        "mobile_metadata"
    }

    fn apply(&self, mut response: ShapedResponse, ctx: &TransformContext) -> ShapedResponse {
        if !ctx.classification.is_mobile {
            return response;
        }

        if let Some(Value::Object(body)) = response.json.as_mut() {
            let mut metadata = Map::new();
            metadata.insert("optimized".to_string(), Value::Bool(true));
            metadata.insert(
                "connectionType".to_string(),
                json!(ctx.classification.connection_type),
            );
            metadata.insert(
                "timestamp".to_string(),
                Value::String(ctx.now.to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
            if let Some(quality) = ctx.classification.image_quality() {
                metadata.insert("imageQuality".to_string(), json!(quality));
            }
            body.insert("_mobile".to_string(), Value::Object(metadata));
        }

        response
    }
}

/// Caps top-level arrays for slow mobile connections
pub struct SlowConnectionTruncation {
    pub limit: usize,
}

impl ResponseTransform for SlowConnectionTruncation {
    fn name(&self) -> &'static str {
        "slow_connection_truncation"
    }

    fn apply(&self, mut response: ShapedResponse, ctx: &TransformContext) -> ShapedResponse {
        if !ctx.classification.is_slow_mobile() {
            return response;
        }
        let Some(Value::Object(body)) = response.json.as_mut() else {
            return response;
        };

        let mut truncated = false;
        for value in body.values_mut() {
            if let Value::Array(items) = value {
                if items.len() > self.limit {
                    items.truncate(self.limit);
                    truncated = true;
                }
            }
        }

        if truncated {
            if let Some(Value::Object(metadata)) = body.get_mut("_mobile") {
                metadata.insert("truncated".to_string(), Value::Bool(true));
            }
        }

        response
    }
}

/// Mobile caching headers; an explicit handler Cache-Control is kept
pub struct MobileCacheHeaders {
    pub cache_control: Option<HeaderValue>,
}

impl ResponseTransform for MobileCacheHeaders {
    fn name(&self) -> &'static str {
        "mobile_cache_headers"
    }

    fn apply(&self, mut response: ShapedResponse, ctx: &TransformContext) -> ShapedResponse {
        if !ctx.classification.is_mobile {
            return response;
        }

        response
            .headers
            .insert("x-mobile-optimized", HeaderValue::from_static("true"));

        if !response.is_error() && !response.headers.contains_key(header::CACHE_CONTROL) {
            if let Some(value) = &self.cache_control {
                response.headers.insert(header::CACHE_CONTROL, value.clone());
            }
        }

        response
    }
}

/// Service worker hints for API paths, for every client
pub struct ServiceWorkerHeaders;

impl ResponseTransform for ServiceWorkerHeaders {
    fn name(&self) -> &'static str {
        "service_worker_headers"
    }

    fn apply(&self, mut response: ShapedResponse, ctx: &TransformContext) -> ShapedResponse {
        if ctx.path.contains("/api/") {
            response
                .headers
                .insert("service-worker-allowed", HeaderValue::from_static("/"));
            response
                .headers
                .insert("x-sw-cacheable", HeaderValue::from_static("true"));
        }
        response
    }
}

pub struct ResponsePipeline {
    transforms: Vec<Box<dyn ResponseTransform>>,
}

impl ResponsePipeline {
    pub fn new(transforms: Vec<Box<dyn ResponseTransform>>) -> Self {
        Self { transforms }
    }

    /// Error envelope, metadata, truncation, cache headers, service worker headers
    pub fn standard(config: &MobileConfig) -> Self {
        Self::new(vec![
            Box::new(MobileErrorEnvelope),
            Box::new(MobileMetadata),
            Box::new(SlowConnectionTruncation {
                limit: config.array_limit,
            }),
            Box::new(MobileCacheHeaders {
                cache_control: HeaderValue::try_from(config.cache_control()).ok(),
            }),
            Box::new(ServiceWorkerHeaders),
        ])
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    pub fn run(&self, response: ShapedResponse, ctx: &TransformContext) -> ShapedResponse {
        self.transforms.iter().fold(response, |response, transform| {
            trace!("Applying response transform {}", transform.name());
            transform.apply(response, ctx)
        })
    }
}
