//! Opzenix governance core: roles, permissions, approval quorum and
//! environment locks for CI/CD pipelines, with the HTTP API and stores
//! that serve them.

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod events;
pub mod governance;
pub mod models;
pub mod notification;
pub mod store;

use governance::service::GovernanceService;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub governance: GovernanceService,
    pub config: config::Config,
}
