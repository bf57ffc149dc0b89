//! HTTP API handlers for ideahub-import

pub mod health;
pub mod import_jobs;

pub use health::health_routes;
pub use import_jobs::import_routes;
