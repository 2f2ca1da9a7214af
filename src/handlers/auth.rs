//! Authentication handlers
//!
//! Implements login, logout, and current user endpoints

use axum::{Extension, Json};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::entity::user;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{CurrentUser, SESSION_USER_KEY};
use crate::middleware::DbConn;

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Session identity returned by login and /api/me
#[derive(Debug, Serialize)]
pub struct SessionUserResponse {
    pub id: i64,
    pub username: String,
    pub role: String,
    #[serde(rename = "departmentId")]
    pub department_id: Option<i64>,
}

/// POST /api/login
pub async fn login(
    Extension(db): Extension<DbConn>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<SessionUserResponse>> {
    if req.username.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation(
            "username and password are required".to_string(),
        ));
    }

    let db_user = user::Entity::find()
        .filter(user::Column::Username.eq(&req.username))
        .one(&*db)
        .await?;

    let Some(db_user) = db_user else {
        tracing::warn!("Login failed: user not found - {}", req.username);
        return Err(AppError::Validation(
            "username or password error".to_string(),
        ));
    };

    let password_valid = bcrypt::verify(&req.password, &db_user.password).unwrap_or(false);
    if !password_valid {
        tracing::warn!("Login failed: wrong password - {}", req.username);
        return Err(AppError::Validation(
            "username or password error".to_string(),
        ));
    }

    session
        .insert(SESSION_USER_KEY, &req.username)
        .await
        .map_err(|e| AppError::Internal(format!("failed to save session: {}", e)))?;

    tracing::info!("User logged in: {}", req.username);

    Ok(Json(SessionUserResponse {
        id: db_user.id,
        username: db_user.username,
        role: db_user.role,
        department_id: db_user.department_id,
    }))
}

/// POST /api/logout
pub async fn logout(session: Session) -> AppResult<Json<serde_json::Value>> {
    session
        .flush()
        .await
        .map_err(|e| AppError::Internal(format!("failed to flush session: {}", e)))?;

    Ok(Json(serde_json::json!({"message": "logout success"})))
}

/// GET /api/me
pub async fn me(Extension(user): Extension<CurrentUser>) -> Json<SessionUserResponse> {
    Json(SessionUserResponse {
        id: user.id,
        username: user.username,
        role: user.role.as_str().to_string(),
        department_id: user.department_id,
    })
}
