//! HTTP surface for SyncopateDB: axum routes over the engine, the API
//! error envelope, shared state, and configuration.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;
