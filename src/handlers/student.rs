//! Student handlers
//!
//! Implements student CRUD and the promotion workflow endpoint. All reads and
//! writes go through the scoping policy: non-admin actors only ever see or
//! touch students of their own department.

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::Datelike;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::entity::{department, section, student};
use crate::error::{AppError, AppResult, OptionExt};
use crate::middleware::auth::CurrentUser;
use crate::middleware::DbConn;
use crate::policy::{self, Capability};
use crate::promotion::{self, Term};

/// Student response with joined section/department info
#[derive(Debug, Serialize)]
pub struct StudentResponse {
    pub id: i64,
    #[serde(rename = "rollNumber")]
    pub roll_number: String,
    pub name: String,
    pub mobile: String,
    pub year: String,
    pub semester: String,
    #[serde(rename = "sectionId")]
    pub section_id: i64,
    pub section: Option<section::Model>,
    #[serde(rename = "departmentId")]
    pub department_id: i64,
    pub department: Option<department::Model>,
}

impl StudentResponse {
    fn from_model(
        m: student::Model,
        sections: &HashMap<i64, section::Model>,
        departments: &HashMap<i64, department::Model>,
    ) -> Self {
        Self {
            id: m.id,
            roll_number: m.roll_number,
            name: m.name,
            mobile: m.mobile,
            year: m.year,
            semester: m.semester,
            section_id: m.section_id,
            section: sections.get(&m.section_id).cloned(),
            department_id: m.department_id,
            department: departments.get(&m.department_id).cloned(),
        }
    }
}

/// Query parameters for student listing
#[derive(Debug, Deserialize)]
pub struct ListStudentsQuery {
    pub year: Option<String>,
    pub semester: Option<String>,
    #[serde(rename = "sectionId")]
    pub section_id: Option<i64>,
    #[serde(rename = "departmentId")]
    pub department_id: Option<i64>,
}

/// Create student request
#[derive(Debug, Deserialize)]
pub struct CreateStudentRequest {
    #[serde(rename = "rollNumber")]
    pub roll_number: String,
    pub name: String,
    #[serde(default)]
    pub mobile: String,
    pub year: String,
    pub semester: String,
    #[serde(rename = "sectionId")]
    pub section_id: i64,
    #[serde(rename = "departmentId")]
    pub department_id: i64,
}

/// Update student request; absent fields are left untouched
#[derive(Debug, Deserialize)]
pub struct UpdateStudentRequest {
    #[serde(rename = "rollNumber")]
    pub roll_number: Option<String>,
    pub name: Option<String>,
    pub mobile: Option<String>,
    pub year: Option<String>,
    pub semester: Option<String>,
    #[serde(rename = "sectionId")]
    pub section_id: Option<i64>,
    #[serde(rename = "departmentId")]
    pub department_id: Option<i64>,
}

/// Promotion request. Target values are advisory; the server recomputes the
/// transition from the stored records.
#[derive(Debug, Deserialize)]
pub struct PromoteRequest {
    #[serde(rename = "studentIds", default)]
    pub student_ids: Vec<i64>,
    #[serde(rename = "targetYear")]
    pub target_year: Option<String>,
    #[serde(rename = "targetSemester")]
    pub target_semester: Option<String>,
    #[serde(rename = "isAlumni", default)]
    pub is_alumni: bool,
}

#[derive(Debug, Serialize)]
pub struct PromoteResponse {
    pub success: bool,
    pub promoted: u64,
    pub graduated: u64,
}

async fn lookup_maps(
    db: &sea_orm::DatabaseConnection,
) -> AppResult<(HashMap<i64, section::Model>, HashMap<i64, department::Model>)> {
    let sections = section::Entity::find()
        .all(db)
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();
    let departments = department::Entity::find()
        .all(db)
        .await?
        .into_iter()
        .map(|d| (d.id, d))
        .collect();
    Ok((sections, departments))
}

/// GET /api/students
pub async fn list_students(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ListStudentsQuery>,
) -> AppResult<Json<Vec<StudentResponse>>> {
    let mut find = student::Entity::find();

    if let Some(year) = &query.year {
        find = find.filter(student::Column::Year.eq(year));
    }
    if let Some(semester) = &query.semester {
        find = find.filter(student::Column::Semester.eq(semester));
    }
    if let Some(section_id) = query.section_id {
        find = find.filter(student::Column::SectionId.eq(section_id));
    }

    match policy::student_scope(&user)? {
        // Non-admin actors are always pinned to their own department
        Some(dept) => find = find.filter(student::Column::DepartmentId.eq(dept)),
        None => {
            if let Some(department_id) = query.department_id {
                find = find.filter(student::Column::DepartmentId.eq(department_id));
            }
        }
    }

    let students = find
        .order_by_asc(student::Column::RollNumber)
        .all(&*db)
        .await?;

    let (sections, departments) = lookup_maps(&db).await?;
    let response = students
        .into_iter()
        .map(|s| StudentResponse::from_model(s, &sections, &departments))
        .collect();

    Ok(Json(response))
}

/// POST /api/students
pub async fn create_student(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<CreateStudentRequest>,
) -> AppResult<(StatusCode, Json<StudentResponse>)> {
    policy::require(&user, Capability::ManageStudents)?;
    policy::check_student_department(&user, req.department_id)?;

    if req.roll_number.trim().is_empty() || req.name.trim().is_empty() {
        return Err(AppError::Validation(
            "roll number and name are required".to_string(),
        ));
    }
    if Term::parse(&req.year, &req.semester).is_none() {
        return Err(AppError::Validation(
            "year must be 1-4 and semester 1-2".to_string(),
        ));
    }

    department::Entity::find_by_id(req.department_id)
        .one(&*db)
        .await?
        .ok_or_not_found("department does not exist")?;
    section::Entity::find_by_id(req.section_id)
        .one(&*db)
        .await?
        .ok_or_not_found("section does not exist")?;

    let existing = student::Entity::find()
        .filter(student::Column::RollNumber.eq(req.roll_number.trim()))
        .one(&*db)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict("roll number already exists".to_string()));
    }

    let new_student = student::ActiveModel {
        roll_number: Set(req.roll_number.trim().to_string()),
        name: Set(req.name.trim().to_string()),
        mobile: Set(req.mobile),
        year: Set(req.year),
        semester: Set(req.semester),
        section_id: Set(req.section_id),
        department_id: Set(req.department_id),
        ..Default::default()
    };
    let created = new_student.insert(&*db).await?;

    tracing::info!(
        "Student created: {} by {}",
        created.roll_number,
        user.username
    );

    let (sections, departments) = lookup_maps(&db).await?;
    Ok((
        StatusCode::CREATED,
        Json(StudentResponse::from_model(created, &sections, &departments)),
    ))
}

/// PUT /api/students/:id
pub async fn update_student(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateStudentRequest>,
) -> AppResult<Json<StudentResponse>> {
    policy::require(&user, Capability::ManageStudents)?;

    let existing = student::Entity::find_by_id(id)
        .one(&*db)
        .await?
        .ok_or_not_found("student not found")?;

    // The row itself must be in scope, and a department change may not move
    // the student outside the actor's department either
    policy::check_student_department(&user, existing.department_id)?;
    if let Some(new_dept) = req.department_id {
        policy::check_student_department(&user, new_dept)?;
        department::Entity::find_by_id(new_dept)
            .one(&*db)
            .await?
            .ok_or_not_found("department does not exist")?;
    }
    if let Some(new_section) = req.section_id {
        section::Entity::find_by_id(new_section)
            .one(&*db)
            .await?
            .ok_or_not_found("section does not exist")?;
    }

    let year = req.year.clone().unwrap_or_else(|| existing.year.clone());
    let semester = req
        .semester
        .clone()
        .unwrap_or_else(|| existing.semester.clone());
    if Term::parse(&year, &semester).is_none() {
        return Err(AppError::Validation(
            "year must be 1-4 and semester 1-2".to_string(),
        ));
    }

    if let Some(roll) = &req.roll_number {
        let duplicate = student::Entity::find()
            .filter(student::Column::RollNumber.eq(roll.trim()))
            .filter(student::Column::Id.ne(id))
            .one(&*db)
            .await?;
        if duplicate.is_some() {
            return Err(AppError::Conflict("roll number already exists".to_string()));
        }
    }

    let mut active: student::ActiveModel = existing.into();
    if let Some(roll) = req.roll_number {
        active.roll_number = Set(roll.trim().to_string());
    }
    if let Some(name) = req.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(mobile) = req.mobile {
        active.mobile = Set(mobile);
    }
    active.year = Set(year);
    active.semester = Set(semester);
    if let Some(section_id) = req.section_id {
        active.section_id = Set(section_id);
    }
    if let Some(department_id) = req.department_id {
        active.department_id = Set(department_id);
    }

    let updated = active.update(&*db).await?;

    let (sections, departments) = lookup_maps(&db).await?;
    Ok(Json(StudentResponse::from_model(
        updated,
        &sections,
        &departments,
    )))
}

/// DELETE /api/students/:id
pub async fn delete_student(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    policy::require(&user, Capability::ManageStudents)?;

    let existing = student::Entity::find_by_id(id)
        .one(&*db)
        .await?
        .ok_or_not_found("student not found")?;

    policy::check_student_department(&user, existing.department_id)?;

    student::Entity::delete_by_id(id).exec(&*db).await?;

    tracing::info!(
        "Student deleted: {} by {}",
        existing.roll_number,
        user.username
    );

    Ok(Json(serde_json::json!({"success": true})))
}

/// POST /api/students/promote
pub async fn promote_students(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<PromoteRequest>,
) -> AppResult<Json<PromoteResponse>> {
    policy::require(&user, Capability::Promote)?;

    if req.student_ids.is_empty() {
        return Err(AppError::Validation("no students selected".to_string()));
    }

    let target = match (&req.target_year, &req.target_semester) {
        (Some(year), Some(semester)) => Some(Term::parse(year, semester).ok_or_else(|| {
            AppError::Validation("target year must be 1-4 and semester 1-2".to_string())
        })?),
        (None, None) => None,
        _ => {
            return Err(AppError::Validation(
                "target year and semester must be supplied together".to_string(),
            ))
        }
    };

    let passing_year = chrono::Utc::now().year();
    let outcome =
        promotion::promote(&db, &req.student_ids, target, req.is_alumni, passing_year).await?;

    tracing::info!(
        "Promotion by {}: {} promoted, {} graduated",
        user.username,
        outcome.promoted,
        outcome.graduated
    );

    Ok(Json(PromoteResponse {
        success: true,
        promoted: outcome.promoted,
        graduated: outcome.graduated,
    }))
}
