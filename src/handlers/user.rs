//! User handlers
//!
//! Implements user account CRUD. All operations are admin-only. ADMIN
//! accounts never carry a department; HOD/USER accounts must.

use axum::{
    extract::Path,
    http::StatusCode,
    response::Json,
    Extension,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::entity::{attendance_history, department, user};
use crate::entity::user::Role;
use crate::error::{AppError, AppResult, OptionExt};
use crate::middleware::auth::CurrentUser;
use crate::middleware::DbConn;
use crate::policy::{self, Capability};

/// Create user request
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    /// Role name; defaults to USER
    pub role: Option<String>,
    #[serde(rename = "departmentId")]
    pub department_id: Option<i64>,
}

/// Update user request. Password is re-hashed only when a non-empty value is
/// supplied; an absent field leaves the stored hash untouched.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    #[serde(rename = "departmentId")]
    pub department_id: Option<i64>,
}

/// User response (no password)
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub role: String,
    #[serde(rename = "departmentId")]
    pub department_id: Option<i64>,
    pub department: Option<department::Model>,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

impl UserResponse {
    fn from_model(m: user::Model, departments: &HashMap<i64, department::Model>) -> Self {
        let department = m
            .department_id
            .and_then(|id| departments.get(&id).cloned());
        Self {
            id: m.id,
            username: m.username,
            role: m.role,
            department_id: m.department_id,
            department,
            created_at: m.created_at,
        }
    }
}

fn parse_role(value: Option<&str>) -> AppResult<Role> {
    match value {
        None => Ok(Role::User),
        Some(v) => {
            Role::parse(v).ok_or_else(|| AppError::Validation(format!("unknown role: {}", v)))
        }
    }
}

/// Enforce the role/department pairing rule. Returns the department to store:
/// ADMIN is forced to null, HOD/USER must name an existing department.
async fn resolve_department(
    db: &sea_orm::DatabaseConnection,
    role: Role,
    department_id: Option<i64>,
) -> AppResult<Option<i64>> {
    if role.is_admin() {
        return Ok(None);
    }
    let Some(department_id) = department_id else {
        return Err(AppError::Validation(
            "department is required for this role".to_string(),
        ));
    };
    department::Entity::find_by_id(department_id)
        .one(db)
        .await?
        .ok_or_not_found("department does not exist")?;
    Ok(Some(department_id))
}

/// GET /api/users
pub async fn list_users(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<Vec<UserResponse>>> {
    policy::require(&current_user, Capability::ManageUsers)?;

    let users = user::Entity::find()
        .order_by_asc(user::Column::Username)
        .all(&*db)
        .await?;

    let departments: HashMap<i64, department::Model> = department::Entity::find()
        .all(&*db)
        .await?
        .into_iter()
        .map(|d| (d.id, d))
        .collect();

    let response = users
        .into_iter()
        .map(|u| UserResponse::from_model(u, &departments))
        .collect();

    Ok(Json(response))
}

/// POST /api/users
pub async fn create_user(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    policy::require(&current_user, Capability::ManageUsers)?;

    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::Validation(
            "username and password are required".to_string(),
        ));
    }

    let role = parse_role(req.role.as_deref())?;
    let department_id = resolve_department(&db, role, req.department_id).await?;

    let existing = user::Entity::find()
        .filter(user::Column::Username.eq(req.username.trim()))
        .one(&*db)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict("username already exists".to_string()));
    }

    let hashed = bcrypt::hash(&req.password, 12)
        .map_err(|e| AppError::Internal(format!("failed to hash password: {}", e)))?;

    let new_user = user::ActiveModel {
        username: Set(req.username.trim().to_string()),
        password: Set(hashed),
        role: Set(role.as_str().to_string()),
        department_id: Set(department_id),
        created_at: Set(chrono::Utc::now().timestamp()),
        ..Default::default()
    };
    let created = new_user.insert(&*db).await?;

    tracing::info!(
        "User created: {} ({}) by {}",
        created.username,
        created.role,
        current_user.username
    );

    let departments: HashMap<i64, department::Model> = department::Entity::find()
        .all(&*db)
        .await?
        .into_iter()
        .map(|d| (d.id, d))
        .collect();
    Ok((
        StatusCode::CREATED,
        Json(UserResponse::from_model(created, &departments)),
    ))
}

/// PUT /api/users/:id
pub async fn update_user(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    policy::require(&current_user, Capability::ManageUsers)?;

    let existing = user::Entity::find_by_id(id)
        .one(&*db)
        .await?
        .ok_or_not_found("user not found")?;

    // Effective role/department after the update must still satisfy the
    // pairing rule
    let role = match &req.role {
        Some(v) => {
            Role::parse(v).ok_or_else(|| AppError::Validation(format!("unknown role: {}", v)))?
        }
        None => Role::parse(&existing.role)
            .ok_or_else(|| AppError::Internal("stored role is invalid".to_string()))?,
    };
    let department_id = resolve_department(
        &db,
        role,
        req.department_id.or(existing.department_id),
    )
    .await?;

    if let Some(username) = &req.username {
        let duplicate = user::Entity::find()
            .filter(user::Column::Username.eq(username.trim()))
            .filter(user::Column::Id.ne(id))
            .one(&*db)
            .await?;
        if duplicate.is_some() {
            return Err(AppError::Conflict("username already exists".to_string()));
        }
    }

    let mut active: user::ActiveModel = existing.into();
    if let Some(username) = req.username {
        active.username = Set(username.trim().to_string());
    }
    if let Some(password) = req.password {
        // Empty string means "unchanged" as well
        if !password.is_empty() {
            let hashed = bcrypt::hash(&password, 12)
                .map_err(|e| AppError::Internal(format!("failed to hash password: {}", e)))?;
            active.password = Set(hashed);
        }
    }
    active.role = Set(role.as_str().to_string());
    active.department_id = Set(department_id);

    let updated = active.update(&*db).await?;

    let departments: HashMap<i64, department::Model> = department::Entity::find()
        .all(&*db)
        .await?
        .into_iter()
        .map(|d| (d.id, d))
        .collect();
    Ok(Json(UserResponse::from_model(updated, &departments)))
}

/// DELETE /api/users/:id
pub async fn delete_user(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    policy::require(&current_user, Capability::ManageUsers)?;

    if id == current_user.id {
        return Err(AppError::Validation(
            "cannot delete your own account".to_string(),
        ));
    }

    let existing = user::Entity::find_by_id(id)
        .one(&*db)
        .await?
        .ok_or_not_found("user not found")?;

    let history_count = attendance_history::Entity::find()
        .filter(attendance_history::Column::DownloadedBy.eq(id))
        .count(&*db)
        .await?;
    if history_count > 0 {
        return Err(AppError::ReferentialIntegrity(
            "user has generated attendance history records".to_string(),
        ));
    }

    user::Entity::delete_by_id(id).exec(&*db).await?;

    tracing::info!(
        "User deleted: {} by {}",
        existing.username,
        current_user.username
    );
    Ok(Json(serde_json::json!({"success": true})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn dept_row(id: i64) -> department::Model {
        department::Model {
            id,
            name: "Computer Science".to_string(),
            code: "CSE".to_string(),
        }
    }

    #[test]
    fn test_parse_role_defaults_to_user() {
        assert_eq!(parse_role(None).unwrap(), Role::User);
        assert_eq!(parse_role(Some("HOD")).unwrap(), Role::Hod);
        assert!(matches!(
            parse_role(Some("ROOT")),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_admin_department_forced_null() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let stored = resolve_department(&db, Role::Admin, Some(5)).await.unwrap();
        assert_eq!(stored, None);
        // Admin short-circuits without a department lookup
        assert!(db.into_transaction_log().is_empty());
    }

    #[tokio::test]
    async fn test_non_admin_requires_department() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        for role in [Role::Hod, Role::User] {
            let err = resolve_department(&db, role, None).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_non_admin_department_must_exist() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![dept_row(3)]])
            .append_query_results([Vec::<department::Model>::new()])
            .into_connection();

        let stored = resolve_department(&db, Role::Hod, Some(3)).await.unwrap();
        assert_eq!(stored, Some(3));

        let err = resolve_department(&db, Role::User, Some(99))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
