//! travel_records: bearer-token protected CRUD service for travel records.
//!
//! Records are schema-less JSON documents kept in a Sled tree; the REST
//! layer (Axum) authenticates callers with HS256 JWTs issued against a fixed
//! user directory.

pub mod auth;
pub mod config;
pub mod errors;
pub mod logging;
pub mod middleware;
pub mod models;
// Bracket query strings -> filter/sort evaluated by the store
pub mod query;
pub mod repository;
// REST API module: Axum router and handlers under /api
pub mod rest;
pub mod storage;
pub mod validation;
