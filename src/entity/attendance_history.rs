//! AttendanceHistory entity - append-only report log
//!
//! Table: att_history
//!
//! One row per generated attendance report: which cohort, by whom, which
//! marking pass, plus the serialized student list that was downloaded. Rows
//! are created and deleted (admin only), never updated.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Conventional status labels. The column itself is free text so historical
/// rows written by older UI builds keep their original wording.
pub mod status {
    pub const MARKED_PRESENT: &str = "Marked Present";
    pub const MARKED_ABSENT: &str = "Marked Absent";
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "att_history")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Report date as supplied by the UI
    #[sea_orm(column_type = "String(Some(32))")]
    pub date: String,

    #[sea_orm(column_type = "String(Some(4))")]
    pub year: String,

    #[sea_orm(column_type = "String(Some(4))")]
    pub semester: String,

    pub section_id: i64,

    pub department_id: i64,

    /// Marking pass label, normally "Marked Present" or "Marked Absent"
    #[sea_orm(column_type = "String(Some(64))")]
    pub status: String,

    /// Name of the file that was downloaded
    #[sea_orm(column_type = "String(Some(255))")]
    pub file_name: String,

    /// JSON-encoded student snapshot, stored verbatim so the original file
    /// can be reproduced exactly without recomputing attendance state
    #[sea_orm(column_type = "Text")]
    pub details: String,

    /// User who generated the report
    pub downloaded_by: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::section::Entity",
        from = "Column::SectionId",
        to = "super::section::Column::Id"
    )]
    Section,
    #[sea_orm(
        belongs_to = "super::department::Entity",
        from = "Column::DepartmentId",
        to = "super::department::Column::Id"
    )]
    Department,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::DownloadedBy",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::section::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Section.def()
    }
}

impl Related<super::department::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Department.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
