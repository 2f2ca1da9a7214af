use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tower_sessions::{MemoryStore, SessionManagerLayer};

use crate::handlers;
use crate::middleware::auth_layer;
use crate::state::AppState;

pub mod health;

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    // Session store (in-memory for now)
    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false) // Set to true in production with HTTPS
        .with_http_only(true);

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API routes
    let api_routes = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Auth routes
        .route("/login", post(handlers::auth::login))
        .route("/logout", post(handlers::auth::logout))
        .route("/me", get(handlers::auth::me))
        // Student routes
        .route(
            "/students",
            get(handlers::student::list_students).post(handlers::student::create_student),
        )
        .route("/students/promote", post(handlers::student::promote_students))
        .route(
            "/students/:id",
            put(handlers::student::update_student).delete(handlers::student::delete_student),
        )
        // Department routes
        .route(
            "/departments",
            get(handlers::department::list_departments)
                .post(handlers::department::create_department),
        )
        .route(
            "/departments/:id",
            put(handlers::department::update_department)
                .delete(handlers::department::delete_department),
        )
        // Section routes
        .route(
            "/sections",
            get(handlers::section::list_sections).post(handlers::section::create_section),
        )
        .route(
            "/sections/:id",
            put(handlers::section::update_section).delete(handlers::section::delete_section),
        )
        // Alumni routes
        .route(
            "/alumni",
            get(handlers::alumni::list_alumni).post(handlers::alumni::create_alumni),
        )
        .route(
            "/alumni/:id",
            put(handlers::alumni::update_alumni).delete(handlers::alumni::delete_alumni),
        )
        // User routes
        .route(
            "/users",
            get(handlers::user::list_users).post(handlers::user::create_user),
        )
        .route(
            "/users/:id",
            put(handlers::user::update_user).delete(handlers::user::delete_user),
        )
        // Attendance history routes
        .route(
            "/attendance/history",
            get(handlers::history::list_history).post(handlers::history::record_report),
        )
        .route(
            "/attendance/history/:id",
            get(handlers::history::get_history).delete(handlers::history::delete_history),
        );

    // Static file service for frontend
    // Serves the built UI, falls back to index.html for SPA routing
    let static_dir = state.config.static_dir.clone();
    let index_file = format!("{}/index.html", static_dir);
    let serve_dir = ServeDir::new(&static_dir).not_found_service(ServeFile::new(&index_file));

    Router::new()
        .nest("/api", api_routes)
        .fallback_service(serve_dir)
        .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
