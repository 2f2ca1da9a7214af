//! Rollbook - a college department attendance and records server
//!
//! This crate provides role-scoped CRUD over students, alumni, departments,
//! sections and users, an append-only attendance report log, and the student
//! promotion / term-rollover workflow.

pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod policy;
pub mod promotion;
pub mod routes;
pub mod state;

// Re-export commonly used types
pub use config::Config;
pub use state::AppState;
