//! Governance rules: who may do what, where, and when a request is decided.
//!
//! Leaves first: [`role_mapper`] → [`permissions`] → [`quorum`] and
//! [`lock_gate`]. [`transition`] turns each mutation into a single planned
//! state change, [`service`] executes those against a store, and
//! [`ui_state`] is the dashboard-side reducer consuming the results.

pub mod comment;
pub mod lock_gate;
pub mod permissions;
pub mod quorum;
pub mod role_mapper;
pub mod service;
pub mod transition;
pub mod ui_state;
