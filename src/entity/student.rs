//! Student entity
//!
//! Table: att_student
//!
//! Year and semester are stored as text to match the wire format used by the
//! attendance UI; the promotion workflow parses them (see `promotion`).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "att_student")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Roll number (unique)
    #[sea_orm(column_type = "String(Some(32))", unique)]
    pub roll_number: String,

    /// Student name
    #[sea_orm(column_type = "String(Some(128))")]
    pub name: String,

    /// Mobile number
    #[sea_orm(column_type = "String(Some(20))")]
    pub mobile: String,

    /// Academic year, "1".."4"
    #[sea_orm(column_type = "String(Some(4))")]
    pub year: String,

    /// Semester, "1" or "2"
    #[sea_orm(column_type = "String(Some(4))")]
    pub semester: String,

    /// Section the student belongs to
    pub section_id: i64,

    /// Department the student belongs to
    pub department_id: i64,
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

impl ActiveModelBehavior for ActiveModel {}
