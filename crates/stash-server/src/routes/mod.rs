//! HTTP routes.

pub mod health;
pub mod kv;
pub mod mvc;

pub use health::{HealthResponse, session_health_routes, transport_health_routes};
pub use kv::{
    CREATED_HEADER, OPERATION_HEADER, REVISION_HEADER, RevisionResponse, WireEntry, kv_routes,
};
pub use mvc::{SESSION_ID_HEADER, SseUpdateEvent, mvc_routes};
