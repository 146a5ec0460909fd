use axum::extract::FromRequestParts;
use axum::http::{request::Parts, HeaderMap};
use serde::Serialize;
use std::convert::Infallible;

const MOBILE_USER_AGENT_TOKENS: &[&str] = &[
    "android",
    "webos",
    "iphone",
    "ipad",
    "ipod",
    "blackberry",
    "iemobile",
    "opera mini",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Slow,
    Medium,
    Fast,
}

/// Image quality suggested to mobile clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageQuality {
    Low,
    Medium,
    High,
}

/// Per-request client classification derived from headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClientClassification {
    pub is_mobile: bool,
    pub connection_type: ConnectionType,
}

impl ClientClassification {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let is_mobile = headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(is_mobile_user_agent)
            .unwrap_or(false);

        Self {
            is_mobile,
            connection_type: connection_type(headers),
        }
    }

    pub fn desktop() -> Self {
        Self {
            is_mobile: false,
            connection_type: ConnectionType::Fast,
        }
    }

    /// Mobile client on a slow connection
    pub fn is_slow_mobile(&self) -> bool {
        self.is_mobile && self.connection_type == ConnectionType::Slow
    }

    /// Suggested image quality, for mobile clients only
    pub fn image_quality(&self) -> Option<ImageQuality> {
        if !self.is_mobile {
            return None;
        }
        Some(match self.connection_type {
            ConnectionType::Slow => ImageQuality::Low,
            ConnectionType::Medium => ImageQuality::Medium,
            ConnectionType::Fast => ImageQuality::High,
        })
    }
}

pub fn is_mobile_user_agent(user_agent: &str) -> bool {
    let user_agent = user_agent.to_ascii_lowercase();
    MOBILE_USER_AGENT_TOKENS
        .iter()
        .any(|token| user_agent.contains(token))
}

/// Connection class from the `Save-Data` and `ECT` client hints
pub fn connection_type(headers: &HeaderMap) -> ConnectionType {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if header("save-data") == Some("on") {
        return ConnectionType::Slow;
    }

    match header("ect") {
        Some("slow-2g") | Some("2g") => ConnectionType::Slow,
        Some("3g") => ConnectionType::Medium,
        _ => ConnectionType::Fast,
    }
}

/// Uses the classification stored by the mobile adapter, or classifies the
/// request on the spot when the adapter is not installed.
#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientClassification {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<ClientClassification>()
            .copied()
            .unwrap_or_else(|| ClientClassification::from_headers(&parts.headers)))
    }
}
