//! Alumni handlers
//!
//! Alumni records are normally produced by the promotion workflow; these
//! endpoints cover direct admin maintenance of the table.

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::Json,
    Extension,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::entity::{alumni, department};
use crate::error::{AppError, AppResult, OptionExt};
use crate::middleware::auth::CurrentUser;
use crate::middleware::DbConn;
use crate::policy::{self, Capability};

/// Query parameters for alumni listing
#[derive(Debug, Deserialize)]
pub struct ListAlumniQuery {
    #[serde(rename = "passingYear")]
    pub passing_year: Option<String>,
}

/// Create alumni request
#[derive(Debug, Deserialize)]
pub struct CreateAlumniRequest {
    #[serde(rename = "rollNumber")]
    pub roll_number: String,
    pub name: String,
    #[serde(default)]
    pub mobile: String,
    #[serde(rename = "passingYear")]
    pub passing_year: String,
    #[serde(rename = "departmentId")]
    pub department_id: i64,
}

/// Update alumni request; absent fields are left untouched
#[derive(Debug, Deserialize)]
pub struct UpdateAlumniRequest {
    #[serde(rename = "rollNumber")]
    pub roll_number: Option<String>,
    pub name: Option<String>,
    pub mobile: Option<String>,
    #[serde(rename = "passingYear")]
    pub passing_year: Option<String>,
}

/// Alumni response with joined department
#[derive(Debug, Serialize)]
pub struct AlumniResponse {
    pub id: i64,
    #[serde(rename = "rollNumber")]
    pub roll_number: String,
    pub name: String,
    pub mobile: String,
    #[serde(rename = "passingYear")]
    pub passing_year: String,
    #[serde(rename = "departmentId")]
    pub department_id: i64,
    pub department: Option<department::Model>,
}

impl AlumniResponse {
    fn from_model(m: alumni::Model, departments: &HashMap<i64, department::Model>) -> Self {
        Self {
            id: m.id,
            roll_number: m.roll_number,
            name: m.name,
            mobile: m.mobile,
            passing_year: m.passing_year,
            department_id: m.department_id,
            department: departments.get(&m.department_id).cloned(),
        }
    }
}

/// GET /api/alumni
pub async fn list_alumni(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ListAlumniQuery>,
) -> AppResult<Json<Vec<AlumniResponse>>> {
    policy::require(&user, Capability::ManageAlumni)?;

    let mut find = alumni::Entity::find();
    if let Some(passing_year) = &query.passing_year {
        find = find.filter(alumni::Column::PassingYear.eq(passing_year));
    }

    let records = find
        .order_by_desc(alumni::Column::PassingYear)
        .all(&*db)
        .await?;

    let departments: HashMap<i64, department::Model> = department::Entity::find()
        .all(&*db)
        .await?
        .into_iter()
        .map(|d| (d.id, d))
        .collect();

    let response = records
        .into_iter()
        .map(|a| AlumniResponse::from_model(a, &departments))
        .collect();

    Ok(Json(response))
}

/// POST /api/alumni
pub async fn create_alumni(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<CreateAlumniRequest>,
) -> AppResult<(StatusCode, Json<alumni::Model>)> {
    policy::require(&user, Capability::ManageAlumni)?;

    if req.roll_number.trim().is_empty()
        || req.name.trim().is_empty()
        || req.passing_year.trim().is_empty()
    {
        return Err(AppError::Validation(
            "roll number, name and passing year are required".to_string(),
        ));
    }

    department::Entity::find_by_id(req.department_id)
        .one(&*db)
        .await?
        .ok_or_not_found("department does not exist")?;

    let existing = alumni::Entity::find()
        .filter(alumni::Column::RollNumber.eq(req.roll_number.trim()))
        .one(&*db)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict("roll number already exists".to_string()));
    }

    let new_alumni = alumni::ActiveModel {
        roll_number: Set(req.roll_number.trim().to_string()),
        name: Set(req.name.trim().to_string()),
        mobile: Set(req.mobile),
        passing_year: Set(req.passing_year.trim().to_string()),
        department_id: Set(req.department_id),
        ..Default::default()
    };
    let created = new_alumni.insert(&*db).await?;

    tracing::info!("Alumnus created: {} by {}", created.roll_number, user.username);
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /api/alumni/:id
pub async fn update_alumni(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateAlumniRequest>,
) -> AppResult<Json<alumni::Model>> {
    policy::require(&user, Capability::ManageAlumni)?;

    let existing = alumni::Entity::find_by_id(id)
        .one(&*db)
        .await?
        .ok_or_not_found("alumnus not found")?;

    if let Some(roll) = &req.roll_number {
        let duplicate = alumni::Entity::find()
            .filter(alumni::Column::RollNumber.eq(roll.trim()))
            .filter(alumni::Column::Id.ne(id))
            .one(&*db)
            .await?;
        if duplicate.is_some() {
            return Err(AppError::Conflict("roll number already exists".to_string()));
        }
    }

    let mut active: alumni::ActiveModel = existing.into();
    if let Some(roll) = req.roll_number {
        active.roll_number = Set(roll.trim().to_string());
    }
    if let Some(name) = req.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(mobile) = req.mobile {
        active.mobile = Set(mobile);
    }
    if let Some(passing_year) = req.passing_year {
        active.passing_year = Set(passing_year.trim().to_string());
    }

    let updated = active.update(&*db).await?;
    Ok(Json(updated))
}

/// DELETE /api/alumni/:id
pub async fn delete_alumni(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    policy::require(&user, Capability::ManageAlumni)?;

    let existing = alumni::Entity::find_by_id(id)
        .one(&*db)
        .await?
        .ok_or_not_found("alumnus not found")?;

    alumni::Entity::delete_by_id(id).exec(&*db).await?;

    tracing::info!("Alumnus deleted: {} by {}", existing.roll_number, user.username);
    Ok(Json(serde_json::json!({"success": true})))
}
