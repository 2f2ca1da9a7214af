//! Authentication middleware
//!
//! Provides session-based authentication for API routes

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde_json::json;
use std::ops::Deref;
use std::sync::Arc;
use tower_sessions::Session;

use crate::entity::user::{self, Role};
use crate::state::AppState;

/// Session key for storing username
pub const SESSION_USER_KEY: &str = "user";

/// Database connection wrapper for use in handlers via Extension
#[derive(Clone)]
pub struct DbConn(pub Arc<DatabaseConnection>);

impl Deref for DbConn {
    type Target = DatabaseConnection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Request-bound actor identity, resolved from the session on every request
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub department_id: Option<i64>,
}

/// Paths that don't require authentication
fn is_public_path(path: &str) -> bool {
    // Only authenticate API routes; everything else is static frontend
    if !path.starts_with("/api") {
        return true;
    }

    if path == "/api/login" || path == "/api/logout" {
        return true;
    }
    if path == "/api/health" {
        return true;
    }
    false
}

/// Authentication middleware
///
/// Looks up the session user on every request and injects `CurrentUser` and
/// `DbConn` into request extensions for the handlers.
pub async fn auth_layer(
    State(state): State<AppState>,
    session: Session,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    request.extensions_mut().insert(DbConn(state.db.clone()));

    if is_public_path(&path) {
        return next.run(request).await;
    }

    let username: Option<String> = session.get(SESSION_USER_KEY).await.unwrap_or(None);

    let Some(username) = username else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "unauthorized"})),
        ).into_response();
    };

    let user_result = user::Entity::find()
        .filter(user::Column::Username.eq(&username))
        .one(&*state.db)
        .await;

    match user_result {
        Ok(Some(user_model)) => {
            let Some(role) = Role::parse(&user_model.role) else {
                tracing::error!(
                    "User {} has unrecognized role {:?}",
                    user_model.username,
                    user_model.role
                );
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "internal server error"})),
                ).into_response();
            };

            let current_user = CurrentUser {
                id: user_model.id,
                username: user_model.username,
                role,
                department_id: user_model.department_id,
            };

            request.extensions_mut().insert(current_user);

            next.run(request).await
        }
        Ok(None) => {
            tracing::warn!("User not found in database: {}", username);
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "invalid session"})),
            ).into_response()
        }
        Err(e) => {
            tracing::error!("Database error during auth: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal server error"})),
            ).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_paths() {
        assert!(is_public_path("/"));
        assert!(is_public_path("/index.html"));
        assert!(is_public_path("/api/login"));
        assert!(is_public_path("/api/logout"));
        assert!(is_public_path("/api/health"));
    }

    #[test]
    fn test_protected_paths() {
        assert!(!is_public_path("/api/students"));
        assert!(!is_public_path("/api/students/promote"));
        assert!(!is_public_path("/api/attendance/history"));
        assert!(!is_public_path("/api/users"));
    }
}
