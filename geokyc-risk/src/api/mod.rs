//! HTTP API handlers for geokyc-risk

pub mod assess;
pub mod health;

pub use assess::assessment_routes;
pub use health::health_routes;
