//! Attendance history handlers
//!
//! Append-only log of generated attendance reports. Each record stores the
//! cohort, the marking pass, the downloaded file name, and the student
//! snapshot verbatim so the file can be re-downloaded byte-for-byte later.

use axum::{
    extract::Path,
    http::StatusCode,
    response::Json,
    Extension,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::entity::{attendance_history, department, section, user};
use crate::error::{AppError, AppResult, OptionExt};
use crate::middleware::auth::CurrentUser;
use crate::middleware::DbConn;
use crate::policy::{self, Capability};

/// Record report request
#[derive(Debug, Deserialize)]
pub struct RecordReportRequest {
    pub date: String,
    pub year: String,
    pub semester: String,
    #[serde(rename = "sectionId")]
    pub section_id: i64,
    #[serde(rename = "departmentId")]
    pub department_id: i64,
    pub status: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    /// JSON-encoded student snapshot, stored verbatim
    #[serde(default = "default_details")]
    pub details: String,
}

fn default_details() -> String {
    "[]".to_string()
}

/// History response with joined section and generating user
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub id: i64,
    pub date: String,
    pub year: String,
    pub semester: String,
    #[serde(rename = "sectionId")]
    pub section_id: i64,
    pub section: Option<section::Model>,
    #[serde(rename = "departmentId")]
    pub department_id: i64,
    pub department: Option<department::Model>,
    pub status: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    pub details: String,
    #[serde(rename = "downloadedBy")]
    pub downloaded_by: i64,
    pub username: Option<String>,
}

impl HistoryResponse {
    fn from_model(
        m: attendance_history::Model,
        sections: &HashMap<i64, section::Model>,
        departments: &HashMap<i64, department::Model>,
        usernames: &HashMap<i64, String>,
    ) -> Self {
        Self {
            id: m.id,
            date: m.date,
            year: m.year,
            semester: m.semester,
            section_id: m.section_id,
            section: sections.get(&m.section_id).cloned(),
            department_id: m.department_id,
            department: departments.get(&m.department_id).cloned(),
            status: m.status,
            file_name: m.file_name,
            details: m.details,
            downloaded_by: m.downloaded_by,
            username: usernames.get(&m.downloaded_by).cloned(),
        }
    }
}

async fn lookup_maps(
    db: &sea_orm::DatabaseConnection,
) -> AppResult<(
    HashMap<i64, section::Model>,
    HashMap<i64, department::Model>,
    HashMap<i64, String>,
)> {
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
    let usernames = user::Entity::find()
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.id, u.username))
        .collect();
    Ok((sections, departments, usernames))
}

/// GET /api/attendance/history
pub async fn list_history(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<Vec<HistoryResponse>>> {
    let mut find = attendance_history::Entity::find();

    // HOD actors only see their own department's reports
    if let Some(dept) = policy::history_scope(&current_user) {
        find = find.filter(attendance_history::Column::DepartmentId.eq(dept));
    }

    let records = find
        .order_by_desc(attendance_history::Column::Date)
        .all(&*db)
        .await?;

    let (sections, departments, usernames) = lookup_maps(&db).await?;
    let response = records
        .into_iter()
        .map(|r| HistoryResponse::from_model(r, &sections, &departments, &usernames))
        .collect();

    Ok(Json(response))
}

/// POST /api/attendance/history
pub async fn record_report(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<RecordReportRequest>,
) -> AppResult<(StatusCode, Json<HistoryResponse>)> {
    policy::require(&current_user, Capability::RecordHistory)?;

    if req.date.trim().is_empty() || req.status.trim().is_empty() || req.file_name.trim().is_empty()
    {
        return Err(AppError::Validation(
            "date, status and file name are required".to_string(),
        ));
    }

    section::Entity::find_by_id(req.section_id)
        .one(&*db)
        .await?
        .ok_or_not_found("section does not exist")?;
    department::Entity::find_by_id(req.department_id)
        .one(&*db)
        .await?
        .ok_or_not_found("department does not exist")?;

    let new_record = attendance_history::ActiveModel {
        date: Set(req.date),
        year: Set(req.year),
        semester: Set(req.semester),
        section_id: Set(req.section_id),
        department_id: Set(req.department_id),
        status: Set(req.status),
        file_name: Set(req.file_name),
        details: Set(req.details),
        downloaded_by: Set(current_user.id),
        ..Default::default()
    };
    let created = new_record.insert(&*db).await?;

    let (sections, departments, usernames) = lookup_maps(&db).await?;
    Ok((
        StatusCode::CREATED,
        Json(HistoryResponse::from_model(
            created,
            &sections,
            &departments,
            &usernames,
        )),
    ))
}

/// GET /api/attendance/history/:id
///
/// Re-download: returns the record including the verbatim snapshot.
pub async fn get_history(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<HistoryResponse>> {
    let record = attendance_history::Entity::find_by_id(id)
        .one(&*db)
        .await?
        .ok_or_not_found("history record not found")?;

    if let Some(dept) = policy::history_scope(&current_user) {
        if record.department_id != dept {
            return Err(AppError::Forbidden(
                "history records outside your department are not accessible".to_string(),
            ));
        }
    }

    let (sections, departments, usernames) = lookup_maps(&db).await?;
    Ok(Json(HistoryResponse::from_model(
        record,
        &sections,
        &departments,
        &usernames,
    )))
}

/// DELETE /api/attendance/history/:id
pub async fn delete_history(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    policy::require(&current_user, Capability::ManageHistory)?;

    attendance_history::Entity::find_by_id(id)
        .one(&*db)
        .await?
        .ok_or_not_found("history record not found")?;

    attendance_history::Entity::delete_by_id(id).exec(&*db).await?;

    tracing::info!("History record {} deleted by {}", id, current_user.username);
    Ok(Json(serde_json::json!({"success": true})))
}

#[cfg(test)]
mod tests {
    use super::*;

    // The snapshot must survive storage untouched so a re-download reproduces
    // the original file exactly
    #[test]
    fn test_details_snapshot_passes_through_verbatim() {
        let body = r#"{
            "date": "2026-03-02",
            "year": "2",
            "semester": "2",
            "sectionId": 1,
            "departmentId": 1,
            "status": "Marked Present",
            "fileName": "attendance-2026-03-02.xlsx",
            "details": "[{\"rollNumber\":\"23B81A0501\",\"present\":true}]"
        }"#;

        let req: RecordReportRequest = serde_json::from_str(body).unwrap();
        assert_eq!(
            req.details,
            "[{\"rollNumber\":\"23B81A0501\",\"present\":true}]"
        );
        // Round-trip: the stored string parses back to the same JSON value
        let parsed: serde_json::Value = serde_json::from_str(&req.details).unwrap();
        assert_eq!(parsed[0]["rollNumber"], "23B81A0501");
    }

    #[test]
    fn test_details_defaults_to_empty_list() {
        let body = r#"{
            "date": "2026-03-02",
            "year": "1",
            "semester": "1",
            "sectionId": 2,
            "departmentId": 1,
            "status": "Marked Absent",
            "fileName": "absentees.xlsx"
        }"#;

        let req: RecordReportRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.details, "[]");
        assert_eq!(req.status, attendance_history::status::MARKED_ABSENT);
    }
}
