//! Department entity
//!
//! Table: att_department

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "att_department")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Department name
    #[sea_orm(column_type = "String(Some(128))")]
    pub name: String,

    /// Department code (unique, e.g. "CSE")
    #[sea_orm(column_type = "String(Some(16))", unique)]
    pub code: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

// Child-side relations (student, user, alumni, history, link table) carry the
// foreign keys; queries against them are done manually in the handlers.

impl ActiveModelBehavior for ActiveModel {}
