//! Toolgate — specification-driven tool gateway.
//!
//! Compiles OpenAPI specifications into model-facing tool definitions,
//! merges the tool sets of multiple backends into one namespace, and
//! drives a bounded tool-use conversation loop against a hosted model.

pub mod agent;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod model;
pub mod registry;
pub mod spec;
pub mod tools;
