//! # lumen-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Serve the **JSON API** used by the presentation layer
//!   (`/api/light-sensor`, `/api/devices`, `/api/automation`, `/api/curtain`)
//! - Stream new readings to browsers as **server-sent events**
//! - Map HTTP requests into registry, telemetry and service calls (driving adapter)
//! - Map [`LumenError`](lumen_domain::error::LumenError) into status codes
//!
//! ## Dependency rule
//! Depends on `lumen-app` (for stores and services) and `lumen-domain`
//! (for types used in request/response mapping). Never leaks axum types
//! into the domain.

pub mod api;
pub mod error;
pub mod router;
pub mod state;

#[cfg(test)]
mod testing;
