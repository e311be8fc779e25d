// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Campus-Auth: shared login and session handling for the campus surfaces
//!
//! This crate reconciles the identity provider, the Firestore `users`
//! collection and a device-local session cache into a single signed-in user,
//! and serves that session to local UI surfaces over a loopback HTTP API.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::FirestoreDb;
use services::{FileKvStore, IdentityToolkitClient, SessionManager};
use std::sync::Arc;

/// Shared application state.
///
/// Generic over the backends so tests can run the full router against
/// in-memory fakes; the defaults are the production types.
pub struct AppState<A = IdentityToolkitClient, S = FirestoreDb, K = FileKvStore> {
    pub config: Config,
    pub sessions: Arc<SessionManager<A, S, K>>,
}
