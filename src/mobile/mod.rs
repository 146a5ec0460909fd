//! Mobile response adapter: client classification, request adaptation and
//! response shaping for mobile clients.

mod classify;
mod compression;
mod middleware;
mod pipeline;


pub use classify::{
    connection_type, is_mobile_user_agent, ClientClassification, ConnectionType, ImageQuality,
};
pub use compression::{with_compression, DesktopClients, MobileClients};
pub use middleware::{handle_panic, mobile_adapter, MobileAdapter};
pub use pipeline::{
    ErrorDetails, MobileCacheHeaders, MobileErrorEnvelope, MobileMetadata, ResponsePipeline,
    ResponseTransform, ServiceWorkerHeaders, ShapedResponse, SlowConnectionTruncation,
    TransformContext,
};
