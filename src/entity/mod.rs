//! Entity module - SeaORM entity definitions
//!
//! One module per database table.

pub mod alumni;
pub mod attendance_history;
pub mod department;
pub mod department_section;
pub mod section;
pub mod student;
pub mod user;
