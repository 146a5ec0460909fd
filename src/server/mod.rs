//! HTTP surface: REST endpoints, WebSocket push relay and server lifecycle.

mod error;
mod handlers;
mod router;
mod state;
mod ws;

pub use error::ApiError;
pub use router::{create_router, DashboardServer, DashboardServerBuilder};
pub use state::AppState;
