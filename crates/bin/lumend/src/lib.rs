//! # lumend: lumen daemon
//!
//! Composition root that wires all adapters together.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Initialize the `SQLite` connection pool and run migrations
//! - Restore the device registry and rule store from storage
//! - Start the dispatcher, automation engine, heartbeat watcher and
//!   (optionally) the virtual sensor poller
//! - Build the axum router over the shared state
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

pub mod actuator;
pub mod config;
pub mod runtime;
