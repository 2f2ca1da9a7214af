//! Section handlers
//!
//! Implements section CRUD. Sections are shared across departments via the
//! department_section link table.

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::Json,
    Extension,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionError, TransactionTrait,
};
use serde::Deserialize;

use crate::entity::{department_section, section, student};
use crate::error::{AppError, AppResult, OptionExt};
use crate::middleware::auth::CurrentUser;
use crate::middleware::DbConn;
use crate::policy::{self, Capability};

/// Query parameters for section listing
#[derive(Debug, Deserialize)]
pub struct ListSectionsQuery {
    #[serde(rename = "departmentId")]
    pub department_id: Option<i64>,
}

/// Create/update section request
#[derive(Debug, Deserialize)]
pub struct SectionRequest {
    pub name: String,
}

/// GET /api/sections
pub async fn list_sections(
    Extension(db): Extension<DbConn>,
    Extension(_user): Extension<CurrentUser>,
    Query(query): Query<ListSectionsQuery>,
) -> AppResult<Json<Vec<section::Model>>> {
    let mut find = section::Entity::find();

    if let Some(department_id) = query.department_id {
        let links = department_section::Entity::find()
            .filter(department_section::Column::DepartmentId.eq(department_id))
            .all(&*db)
            .await?;
        let ids: Vec<i64> = links.into_iter().map(|l| l.section_id).collect();
        if ids.is_empty() {
            return Ok(Json(Vec::new()));
        }
        find = find.filter(section::Column::Id.is_in(ids));
    }

    let sections = find
        .order_by_asc(section::Column::Name)
        .all(&*db)
        .await?;

    Ok(Json(sections))
}

/// POST /api/sections
pub async fn create_section(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<SectionRequest>,
) -> AppResult<(StatusCode, Json<section::Model>)> {
    policy::require(&user, Capability::ManageCatalog)?;

    if req.name.trim().is_empty() {
        return Err(AppError::Validation("section name is required".to_string()));
    }

    let existing = section::Entity::find()
        .filter(section::Column::Name.eq(req.name.trim()))
        .one(&*db)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict("section name already exists".to_string()));
    }

    let new_section = section::ActiveModel {
        name: Set(req.name.trim().to_string()),
        ..Default::default()
    };
    let created = new_section.insert(&*db).await?;

    tracing::info!("Section created: {} by {}", created.name, user.username);
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /api/sections/:id
pub async fn update_section(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<SectionRequest>,
) -> AppResult<Json<section::Model>> {
    policy::require(&user, Capability::ManageCatalog)?;

    if req.name.trim().is_empty() {
        return Err(AppError::Validation("section name is required".to_string()));
    }

    let existing = section::Entity::find_by_id(id)
        .one(&*db)
        .await?
        .ok_or_not_found("section not found")?;

    let duplicate = section::Entity::find()
        .filter(section::Column::Name.eq(req.name.trim()))
        .filter(section::Column::Id.ne(id))
        .one(&*db)
        .await?;
    if duplicate.is_some() {
        return Err(AppError::Conflict("section name already exists".to_string()));
    }

    let mut active: section::ActiveModel = existing.into();
    active.name = Set(req.name.trim().to_string());
    let updated = active.update(&*db).await?;

    Ok(Json(updated))
}

/// DELETE /api/sections/:id
pub async fn delete_section(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    policy::require(&user, Capability::ManageCatalog)?;

    let existing = section::Entity::find_by_id(id)
        .one(&*db)
        .await?
        .ok_or_not_found("section not found")?;

    let student_count = student::Entity::find()
        .filter(student::Column::SectionId.eq(id))
        .count(&*db)
        .await?;
    if student_count > 0 {
        return Err(AppError::ReferentialIntegrity(
            "section still has students assigned".to_string(),
        ));
    }

    let result = (&*db)
        .transaction::<_, (), AppError>(|txn| {
            Box::pin(async move {
                department_section::Entity::delete_many()
                    .filter(department_section::Column::SectionId.eq(id))
                    .exec(txn)
                    .await?;
                section::Entity::delete_by_id(id).exec(txn).await?;
                Ok(())
            })
        })
        .await;

    // A remaining foreign key (attendance history) surfaces as a constraint
    // violation; anything else is a plain store failure
    match result {
        Ok(()) => {}
        Err(TransactionError::Connection(err)) => return Err(AppError::Database(err)),
        Err(TransactionError::Transaction(err)) => {
            if err.is_fk_violation() {
                tracing::warn!("Failed to delete section {}: {}", existing.name, err);
                return Err(AppError::ReferentialIntegrity(
                    "section is still referenced by other records".to_string(),
                ));
            }
            return Err(err);
        }
    }

    tracing::info!("Section deleted: {} by {}", existing.name, user.username);
    Ok(Json(
        serde_json::json!({"message": "section deleted successfully"}),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::user::Role;
    use sea_orm::{DatabaseBackend, DbErr, MockDatabase, RuntimeErr, Value};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn admin() -> CurrentUser {
        CurrentUser {
            id: 1,
            username: "admin".to_string(),
            role: Role::Admin,
            department_id: None,
        }
    }

    fn count_row(n: i64) -> BTreeMap<&'static str, Value> {
        let mut row = BTreeMap::new();
        row.insert("num_items", Value::BigInt(Some(n)));
        row
    }

    #[tokio::test]
    async fn test_delete_store_failure_is_not_a_conflict() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![section::Model {
                id: 1,
                name: "A".to_string(),
            }]])
            .append_query_results([vec![count_row(0)]])
            .append_exec_errors([DbErr::Conn(RuntimeErr::Internal(
                "connection closed".to_string(),
            ))])
            .into_connection();

        let err = delete_section(Extension(DbConn(Arc::new(db))), Extension(admin()), Path(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }

    #[tokio::test]
    async fn test_delete_with_students_rejected() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![section::Model {
                id: 1,
                name: "A".to_string(),
            }]])
            .append_query_results([vec![count_row(5)]])
            .into_connection();

        let err = delete_section(Extension(DbConn(Arc::new(db))), Extension(admin()), Path(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ReferentialIntegrity(_)));
    }
}
