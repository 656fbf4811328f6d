//! Library crate for gavel-back, exposing modules for binaries and integration tests.

/// Cache in front of the durable store.
pub mod cache;
/// Runtime configuration.
pub mod config;
/// Persistence layer.
pub mod dao;
mod dto;
mod error;
/// HTTP routers.
pub mod routes;
/// Business operations.
pub mod services;
/// Shared application state and the room lifecycle.
pub mod state;
