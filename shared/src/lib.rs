//! Shared types and models for the Plant Nursery Management Platform
//!
//! This crate contains the batch lifecycle domain shared between the backend,
//! the browser client (via WASM), and other components of the system.

pub mod models;
pub mod types;
pub mod units;
pub mod validation;

pub use models::*;
pub use types::*;
pub use units::*;
pub use validation::*;
