//! Department handlers
//!
//! Implements department CRUD. Departments carry a set of linked sections
//! (many-to-many); create/update replace the link set atomically.

use axum::{
    extract::Path,
    http::StatusCode,
    response::Json,
    Extension,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::entity::{department, department_section, section, student, user};
use crate::error::{AppError, AppResult, OptionExt};
use crate::middleware::auth::CurrentUser;
use crate::middleware::DbConn;
use crate::policy::{self, Capability};

/// Create department request
#[derive(Debug, Deserialize)]
pub struct CreateDepartmentRequest {
    pub name: String,
    pub code: String,
    #[serde(rename = "sectionIds")]
    pub section_ids: Option<Vec<i64>>,
}

/// Update department request. When `sectionIds` is present the linked-section
/// set is replaced wholesale (an empty list unlinks everything); when absent
/// the links are left untouched.
#[derive(Debug, Deserialize)]
pub struct UpdateDepartmentRequest {
    pub name: Option<String>,
    pub code: Option<String>,
    #[serde(rename = "sectionIds")]
    pub section_ids: Option<Vec<i64>>,
}

/// Department response with linked sections
#[derive(Debug, Serialize)]
pub struct DepartmentResponse {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub sections: Vec<section::Model>,
}

fn unwrap_txn_err(e: TransactionError<AppError>) -> AppError {
    match e {
        TransactionError::Connection(err) => AppError::Database(err),
        TransactionError::Transaction(err) => err,
    }
}

/// Verify that every referenced section id exists
async fn check_sections_exist(
    db: &sea_orm::DatabaseConnection,
    section_ids: &[i64],
) -> AppResult<()> {
    if section_ids.is_empty() {
        return Ok(());
    }
    let found = section::Entity::find()
        .filter(section::Column::Id.is_in(section_ids.to_vec()))
        .count(db)
        .await?;
    if found as usize != section_ids.len() {
        return Err(AppError::NotFound(
            "one or more sections do not exist".to_string(),
        ));
    }
    Ok(())
}

async fn linked_sections(
    db: &sea_orm::DatabaseConnection,
    department_id: i64,
) -> AppResult<Vec<section::Model>> {
    let links = department_section::Entity::find()
        .filter(department_section::Column::DepartmentId.eq(department_id))
        .all(db)
        .await?;
    let ids: Vec<i64> = links.into_iter().map(|l| l.section_id).collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sections = section::Entity::find()
        .filter(section::Column::Id.is_in(ids))
        .order_by_asc(section::Column::Name)
        .all(db)
        .await?;
    Ok(sections)
}

/// GET /api/departments
pub async fn list_departments(
    Extension(db): Extension<DbConn>,
    Extension(_user): Extension<CurrentUser>,
) -> AppResult<Json<Vec<DepartmentResponse>>> {
    let departments = department::Entity::find()
        .order_by_asc(department::Column::Name)
        .all(&*db)
        .await?;

    let links = department_section::Entity::find().all(&*db).await?;
    let sections: HashMap<i64, section::Model> = section::Entity::find()
        .all(&*db)
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let mut by_department: HashMap<i64, Vec<section::Model>> = HashMap::new();
    for link in links {
        if let Some(s) = sections.get(&link.section_id) {
            by_department
                .entry(link.department_id)
                .or_default()
                .push(s.clone());
        }
    }

    let response = departments
        .into_iter()
        .map(|d| {
            let mut sections = by_department.remove(&d.id).unwrap_or_default();
            sections.sort_by(|a, b| a.name.cmp(&b.name));
            DepartmentResponse {
                id: d.id,
                name: d.name,
                code: d.code,
                sections,
            }
        })
        .collect();

    Ok(Json(response))
}

/// POST /api/departments
pub async fn create_department(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<CreateDepartmentRequest>,
) -> AppResult<(StatusCode, Json<DepartmentResponse>)> {
    policy::require(&user, Capability::ManageCatalog)?;

    if req.name.trim().is_empty() || req.code.trim().is_empty() {
        return Err(AppError::Validation(
            "department name and code are required".to_string(),
        ));
    }

    let existing = department::Entity::find()
        .filter(department::Column::Code.eq(req.code.trim()))
        .one(&*db)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict(
            "department code already exists".to_string(),
        ));
    }

    let section_ids = req.section_ids.unwrap_or_default();
    check_sections_exist(&db, &section_ids).await?;

    let name = req.name.trim().to_string();
    let code = req.code.trim().to_string();
    let link_ids = section_ids.clone();

    let created = (&*db)
        .transaction::<_, department::Model, AppError>(|txn| {
            Box::pin(async move {
                let new_dept = department::ActiveModel {
                    name: Set(name),
                    code: Set(code),
                    ..Default::default()
                };
                let dept = new_dept.insert(txn).await?;

                for section_id in link_ids {
                    let link = department_section::ActiveModel {
                        department_id: Set(dept.id),
                        section_id: Set(section_id),
                    };
                    link.insert(txn).await?;
                }

                Ok(dept)
            })
        })
        .await
        .map_err(unwrap_txn_err)?;

    tracing::info!("Department created: {} by {}", created.code, user.username);

    let sections = linked_sections(&db, created.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(DepartmentResponse {
            id: created.id,
            name: created.name,
            code: created.code,
            sections,
        }),
    ))
}

/// PUT /api/departments/:id
pub async fn update_department(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateDepartmentRequest>,
) -> AppResult<Json<DepartmentResponse>> {
    policy::require(&user, Capability::ManageCatalog)?;

    let existing = department::Entity::find_by_id(id)
        .one(&*db)
        .await?
        .ok_or_not_found("department not found")?;

    if let Some(code) = &req.code {
        let duplicate = department::Entity::find()
            .filter(department::Column::Code.eq(code.trim()))
            .filter(department::Column::Id.ne(id))
            .one(&*db)
            .await?;
        if duplicate.is_some() {
            return Err(AppError::Conflict(
                "department code already exists".to_string(),
            ));
        }
    }
    if let Some(section_ids) = &req.section_ids {
        check_sections_exist(&db, section_ids).await?;
    }

    let updated = (&*db)
        .transaction::<_, department::Model, AppError>(|txn| {
            Box::pin(async move {
                let mut active: department::ActiveModel = existing.into();
                if let Some(name) = req.name {
                    active.name = Set(name.trim().to_string());
                }
                if let Some(code) = req.code {
                    active.code = Set(code.trim().to_string());
                }
                let dept = active.update(txn).await?;

                // Replace the link set when one was supplied
                if let Some(section_ids) = req.section_ids {
                    department_section::Entity::delete_many()
                        .filter(department_section::Column::DepartmentId.eq(dept.id))
                        .exec(txn)
                        .await?;
                    for section_id in section_ids {
                        let link = department_section::ActiveModel {
                            department_id: Set(dept.id),
                            section_id: Set(section_id),
                        };
                        link.insert(txn).await?;
                    }
                }

                Ok(dept)
            })
        })
        .await
        .map_err(unwrap_txn_err)?;

    let sections = linked_sections(&db, updated.id).await?;
    Ok(Json(DepartmentResponse {
        id: updated.id,
        name: updated.name,
        code: updated.code,
        sections,
    }))
}

/// DELETE /api/departments/:id
pub async fn delete_department(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    policy::require(&user, Capability::ManageCatalog)?;

    let existing = department::Entity::find_by_id(id)
        .one(&*db)
        .await?
        .ok_or_not_found("department not found")?;

    let student_count = student::Entity::find()
        .filter(student::Column::DepartmentId.eq(id))
        .count(&*db)
        .await?;
    if student_count > 0 {
        return Err(AppError::ReferentialIntegrity(
            "department still has students assigned".to_string(),
        ));
    }
    let user_count = user::Entity::find()
        .filter(user::Column::DepartmentId.eq(id))
        .count(&*db)
        .await?;
    if user_count > 0 {
        return Err(AppError::ReferentialIntegrity(
            "department still has users assigned".to_string(),
        ));
    }

    let result = (&*db)
        .transaction::<_, (), AppError>(|txn| {
            Box::pin(async move {
                department_section::Entity::delete_many()
                    .filter(department_section::Column::DepartmentId.eq(id))
                    .exec(txn)
                    .await?;
                department::Entity::delete_by_id(id).exec(txn).await?;
                Ok(())
            })
        })
        .await;

    // Foreign keys not covered by the pre-checks (alumni, history) surface as
    // a constraint violation; anything else is a plain store failure
    match result {
        Ok(()) => {}
        Err(TransactionError::Connection(err)) => return Err(AppError::Database(err)),
        Err(TransactionError::Transaction(err)) => {
            if err.is_fk_violation() {
                tracing::warn!("Failed to delete department {}: {}", existing.code, err);
                return Err(AppError::ReferentialIntegrity(
                    "department is still referenced by other records".to_string(),
                ));
            }
            return Err(err);
        }
    }

    tracing::info!("Department deleted: {} by {}", existing.code, user.username);
    Ok(Json(
        serde_json::json!({"message": "department deleted successfully"}),
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

    fn dept_row(id: i64) -> department::Model {
        department::Model {
            id,
            name: "Computer Science".to_string(),
            code: "CSE".to_string(),
        }
    }

    fn count_row(n: i64) -> BTreeMap<&'static str, Value> {
        let mut row = BTreeMap::new();
        row.insert("num_items", Value::BigInt(Some(n)));
        row
    }

    #[tokio::test]
    async fn test_delete_with_students_rejected_without_deleting() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![dept_row(1)]])
                .append_query_results([vec![count_row(3)]])
                .into_connection(),
        );

        let err = delete_department(
            Extension(DbConn(db.clone())),
            Extension(admin()),
            Path(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::ReferentialIntegrity(_)));

        // The pre-check must stop the request before any row is touched
        let log = Arc::into_inner(db).unwrap().into_transaction_log();
        assert!(
            log.iter().all(|t| !format!("{:?}", t).contains("DELETE")),
            "no delete statement expected in {:?}",
            log
        );
    }

    #[tokio::test]
    async fn test_delete_with_users_rejected() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![dept_row(1)]])
                .append_query_results([vec![count_row(0)]])
                .append_query_results([vec![count_row(2)]])
                .into_connection(),
        );

        let err = delete_department(
            Extension(DbConn(db.clone())),
            Extension(admin()),
            Path(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::ReferentialIntegrity(_)));

        let log = Arc::into_inner(db).unwrap().into_transaction_log();
        assert!(log.iter().all(|t| !format!("{:?}", t).contains("DELETE")));
    }

    #[tokio::test]
    async fn test_delete_store_failure_is_not_a_conflict() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![dept_row(1)]])
            .append_query_results([vec![count_row(0)]])
            .append_query_results([vec![count_row(0)]])
            .append_exec_errors([DbErr::Conn(RuntimeErr::Internal(
                "connection closed".to_string(),
            ))])
            .into_connection();

        let err = delete_department(Extension(DbConn(Arc::new(db))), Extension(admin()), Path(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }
}
