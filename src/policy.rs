//! Authorization policy
//!
//! Single capability-check component consulted by every entity handler, so
//! role branching is not repeated ad hoc per endpoint.
//!
//! - ADMIN: unrestricted read/write on all entities.
//! - HOD: read/write students only within own department; read-only on own
//!   department's attendance history; no catalog/user/alumni management and
//!   no promotion.
//! - USER: read-only own-department student lists, may record attendance
//!   history entries.

use crate::error::{AppError, AppResult};
use crate::middleware::auth::CurrentUser;

/// Privileged operations a handler can ask about
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    /// Create/update/delete student records
    ManageStudents,
    /// Run the promotion / term-rollover workflow
    Promote,
    /// Create/update/delete departments and sections
    ManageCatalog,
    /// Create/update/delete user accounts
    ManageUsers,
    /// Create/update/delete alumni records
    ManageAlumni,
    /// Append an attendance history record
    RecordHistory,
    /// Delete attendance history records
    ManageHistory,
}

/// Check whether the actor holds a capability
pub fn allows(user: &CurrentUser, cap: Capability) -> bool {
    use crate::entity::user::Role;

    match cap {
        Capability::ManageStudents => matches!(user.role, Role::Admin | Role::Hod),
        Capability::RecordHistory => true,
        Capability::Promote
        | Capability::ManageCatalog
        | Capability::ManageUsers
        | Capability::ManageAlumni
        | Capability::ManageHistory => user.role.is_admin(),
    }
}

/// Require a capability, failing with 403 otherwise
pub fn require(user: &CurrentUser, cap: Capability) -> AppResult<()> {
    if allows(user, cap) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role {} may not perform this operation",
            user.role
        )))
    }
}

/// Department scope for student queries.
///
/// `None` means unrestricted (ADMIN); otherwise every query must be
/// constrained to the returned department. A non-admin actor without a
/// department cannot see any students.
pub fn student_scope(user: &CurrentUser) -> AppResult<Option<i64>> {
    if user.role.is_admin() {
        return Ok(None);
    }
    match user.department_id {
        Some(dept) => Ok(Some(dept)),
        None => Err(AppError::Forbidden(
            "user has no department assigned".to_string(),
        )),
    }
}

/// Department scope for attendance history reads: only HOD actors are
/// constrained to their own department.
pub fn history_scope(user: &CurrentUser) -> Option<i64> {
    use crate::entity::user::Role;

    match user.role {
        Role::Hod => user.department_id,
        _ => None,
    }
}

/// Check that a targeted student write stays inside the actor's department.
///
/// `department_id` is the department of the row being touched (or the value
/// it would be moved to).
pub fn check_student_department(user: &CurrentUser, department_id: i64) -> AppResult<()> {
    if user.role.is_admin() {
        return Ok(());
    }
    if user.department_id == Some(department_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "students outside your department are not accessible".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::user::Role;

    fn actor(role: Role, department_id: Option<i64>) -> CurrentUser {
        CurrentUser {
            id: 1,
            username: "test".to_string(),
            role,
            department_id,
        }
    }

    #[test]
    fn test_admin_holds_everything() {
        let admin = actor(Role::Admin, None);
        for cap in [
            Capability::ManageStudents,
            Capability::Promote,
            Capability::ManageCatalog,
            Capability::ManageUsers,
            Capability::ManageAlumni,
            Capability::RecordHistory,
            Capability::ManageHistory,
        ] {
            assert!(allows(&admin, cap), "admin should hold {:?}", cap);
        }
    }

    #[test]
    fn test_hod_capabilities() {
        let hod = actor(Role::Hod, Some(7));
        assert!(allows(&hod, Capability::ManageStudents));
        assert!(allows(&hod, Capability::RecordHistory));
        assert!(!allows(&hod, Capability::Promote));
        assert!(!allows(&hod, Capability::ManageCatalog));
        assert!(!allows(&hod, Capability::ManageUsers));
        assert!(!allows(&hod, Capability::ManageAlumni));
        assert!(!allows(&hod, Capability::ManageHistory));
    }

    #[test]
    fn test_user_capabilities() {
        let user = actor(Role::User, Some(7));
        assert!(!allows(&user, Capability::ManageStudents));
        assert!(allows(&user, Capability::RecordHistory));
        assert!(!allows(&user, Capability::Promote));
        assert!(!allows(&user, Capability::ManageHistory));
    }

    #[test]
    fn test_student_scope() {
        assert_eq!(student_scope(&actor(Role::Admin, None)).unwrap(), None);
        assert_eq!(
            student_scope(&actor(Role::Hod, Some(3))).unwrap(),
            Some(3)
        );
        assert_eq!(
            student_scope(&actor(Role::User, Some(4))).unwrap(),
            Some(4)
        );
        assert!(matches!(
            student_scope(&actor(Role::Hod, None)),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_history_scope_only_constrains_hod() {
        assert_eq!(history_scope(&actor(Role::Admin, None)), None);
        assert_eq!(history_scope(&actor(Role::Hod, Some(3))), Some(3));
        assert_eq!(history_scope(&actor(Role::User, Some(4))), None);
    }

    #[test]
    fn test_targeted_write_scope() {
        assert!(check_student_department(&actor(Role::Admin, None), 9).is_ok());
        assert!(check_student_department(&actor(Role::Hod, Some(9)), 9).is_ok());
        assert!(matches!(
            check_student_department(&actor(Role::Hod, Some(9)), 2),
            Err(AppError::Forbidden(_))
        ));
    }
}
