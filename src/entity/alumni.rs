//! Alumni entity
//!
//! Table: att_alumni
//!
//! Rows are created by the alumni branch of the promotion workflow (or by
//! direct admin entry) and have no further lifecycle transitions.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "att_alumni")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Roll number (unique)
    #[sea_orm(column_type = "String(Some(32))", unique)]
    pub roll_number: String,

    #[sea_orm(column_type = "String(Some(128))")]
    pub name: String,

    #[sea_orm(column_type = "String(Some(20))")]
    pub mobile: String,

    /// Calendar year of graduation
    #[sea_orm(column_type = "String(Some(8))")]
    pub passing_year: String,

    /// Department inherited from the student record
    pub department_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::department::Entity",
        from = "Column::DepartmentId",
        to = "super::department::Column::Id"
    )]
    Department,
}

impl Related<super::department::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Department.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
