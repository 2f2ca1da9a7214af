//! User entity
//!
//! Table: att_user

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User role
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Unrestricted access to all entities
    Admin,
    /// Head of department: student read/write and history read within own department
    Hod,
    /// Attendance taker: read-only own-department student lists
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Hod => "HOD",
            Role::User => "USER",
        }
    }

    /// Parse the stored role string; unknown values are rejected rather than
    /// defaulted so a corrupted row cannot silently gain or lose privileges.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ADMIN" => Some(Role::Admin),
            "HOD" => Some(Role::Hod),
            "USER" => Some(Role::User),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "att_user")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Username (unique)
    #[sea_orm(column_type = "String(Some(64))", unique)]
    pub username: String,

    /// Password (bcrypt hash)
    #[sea_orm(column_type = "String(Some(128))")]
    #[serde(skip_serializing)]
    pub password: String,

    /// Role: ADMIN, HOD or USER
    #[sea_orm(column_type = "String(Some(16))")]
    pub role: String,

    /// Department; null only for ADMIN users
    #[sea_orm(nullable)]
    pub department_id: Option<i64>,

    /// Creation time (Unix timestamp)
    pub created_at: i64,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        for role in [Role::Admin, Role::Hod, Role::User] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn test_unknown_role_rejected() {
        assert_eq!(Role::parse("SUPERUSER"), None);
        assert_eq!(Role::parse("admin"), None);
        assert_eq!(Role::parse(""), None);
    }
}
