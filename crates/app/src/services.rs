//! Application services: use-cases driven by the HTTP adapter.
//!
//! Services hold shared handles to the registry, rule store and dispatcher,
//! adding the cross-cutting checks no single store can make on its own.

pub mod curtain_service;
pub mod rule_service;
