//! # lumen-domain
//!
//! Pure domain model for the lumen light automation backend.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Devices** (light sensors and curtain-like actuators)
//! - Define **Readings** (timestamped measurements and their provenance)
//! - Define **Rules** (hysteresis triggers, actions, debounce state)
//! - Define **Actuation** intents and results
//! - Contain all invariant enforcement and rule evaluation logic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod actuation;
pub mod device;
pub mod reading;
pub mod rule;
