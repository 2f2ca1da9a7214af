//! Section entity
//!
//! Table: att_section

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "att_section")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Section name (unique, e.g. "A")
    #[sea_orm(column_type = "String(Some(32))", unique)]
    pub name: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
