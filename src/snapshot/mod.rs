//! Dashboard snapshot loading with per-source development fallbacks.

mod dev_mode;
mod loader;
pub mod mock;
mod model;
mod source;


pub use dev_mode::DevMode;
pub use loader::{LoadState, SnapshotLoader};
pub use model::{DashboardSnapshot, DashboardStats, Provenance, Recommendation, SourceProvenance};
pub use source::{HttpSnapshotSource, SnapshotSource};
