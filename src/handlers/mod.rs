//! Request handlers module

pub mod alumni;
pub mod auth;
pub mod department;
pub mod history;
pub mod section;
pub mod student;
pub mod user;
