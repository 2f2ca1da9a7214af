//! Student promotion / term-rollover workflow
//!
//! The academic state of a student is the pair (year 1-4, semester 1-2) with a
//! terminal graduation state. The transition is computed server-side from the
//! stored record; target values supplied by the caller are advisory only and
//! the request is rejected when they disagree.
//!
//! The alumni branch creates alumni rows and deletes the student rows inside
//! one transaction, so a crash or error between the two steps leaves the
//! original student rows intact. The same transaction boundary also serializes
//! concurrent promotions of overlapping student sets at the store level.

use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TransactionError,
    TransactionTrait,
};
use std::collections::{BTreeMap, BTreeSet};

use crate::entity::{alumni, student};
use crate::error::{AppError, AppResult};

/// Academic term: (year 1-4, semester 1-2)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Term {
    pub year: u8,
    pub semester: u8,
}

/// Where a term transition leads
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Advance {
    /// Next (year, semester) pair
    Term(Term),
    /// End of year 4 semester 2: the student leaves the student table
    Graduate,
}

impl Term {
    pub fn new(year: u8, semester: u8) -> Option<Self> {
        if (1..=4).contains(&year) && (1..=2).contains(&semester) {
            Some(Self { year, semester })
        } else {
            None
        }
    }

    /// Parse the text columns of a student row
    pub fn parse(year: &str, semester: &str) -> Option<Self> {
        let year = year.trim().parse::<u8>().ok()?;
        let semester = semester.trim().parse::<u8>().ok()?;
        Self::new(year, semester)
    }

    /// Transition function:
    /// (4,2) -> Graduate, (y,1) -> (y,2), (y,2) -> (y+1,1) for y < 4
    pub fn next(self) -> Advance {
        match (self.year, self.semester) {
            (4, 2) => Advance::Graduate,
            (y, 1) => Advance::Term(Term {
                year: y,
                semester: 2,
            }),
            (y, _) => Advance::Term(Term {
                year: y + 1,
                semester: 1,
            }),
        }
    }
}

/// Counts returned by a successful promotion
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PromoteOutcome {
    /// Students advanced to their next term
    pub promoted: u64,
    /// Students migrated into the alumni table
    pub graduated: u64,
}

/// Run the promotion workflow over the selected students.
///
/// `target` is the client-computed next term; when present it must match the
/// server-computed transition for every selected student. `passing_year` is
/// the calendar year stamped onto alumni rows.
pub async fn promote(
    db: &DatabaseConnection,
    student_ids: &[i64],
    target: Option<Term>,
    to_alumni: bool,
    passing_year: i32,
) -> AppResult<PromoteOutcome> {
    let ids: BTreeSet<i64> = student_ids.iter().copied().collect();
    if ids.is_empty() {
        return Err(AppError::Validation("no students selected".to_string()));
    }

    let ids: Vec<i64> = ids.into_iter().collect();
    let expected = ids.len();

    let result = db
        .transaction::<_, PromoteOutcome, AppError>(|txn| {
            Box::pin(async move {
                let students = student::Entity::find()
                    .filter(student::Column::Id.is_in(ids.clone()))
                    .all(txn)
                    .await?;

                if students.len() != expected {
                    return Err(AppError::NotFound(
                        "one or more selected students no longer exist".to_string(),
                    ));
                }

                // Compute every transition up front so validation failures
                // reject the whole batch before any row is touched.
                let mut advances = Vec::with_capacity(students.len());
                for s in &students {
                    let term = Term::parse(&s.year, &s.semester).ok_or_else(|| {
                        AppError::Validation(format!(
                            "student {} has invalid year/semester {:?}/{:?}",
                            s.roll_number, s.year, s.semester
                        ))
                    })?;
                    advances.push((s, term.next()));
                }

                if to_alumni {
                    let mut rows = Vec::with_capacity(advances.len());
                    for (s, advance) in &advances {
                        if *advance != Advance::Graduate {
                            return Err(AppError::Validation(format!(
                                "student {} is not in the final term",
                                s.roll_number
                            )));
                        }
                        rows.push(alumni::ActiveModel {
                            roll_number: Set(s.roll_number.clone()),
                            name: Set(s.name.clone()),
                            mobile: Set(s.mobile.clone()),
                            passing_year: Set(passing_year.to_string()),
                            department_id: Set(s.department_id),
                            ..Default::default()
                        });
                    }

                    let graduated = rows.len() as u64;
                    alumni::Entity::insert_many(rows).exec(txn).await?;

                    student::Entity::delete_many()
                        .filter(student::Column::Id.is_in(ids))
                        .exec(txn)
                        .await?;

                    return Ok(PromoteOutcome {
                        promoted: 0,
                        graduated,
                    });
                }

                // Standard promotion: bucket students by their computed next
                // term (a selected cohort is normally uniform) and advance
                // each bucket in one statement.
                let mut buckets: BTreeMap<Term, Vec<i64>> = BTreeMap::new();
                for (s, advance) in &advances {
                    let next = match advance {
                        Advance::Term(t) => *t,
                        Advance::Graduate => {
                            return Err(AppError::Validation(format!(
                                "student {} has completed the final term; use the alumni transition",
                                s.roll_number
                            )));
                        }
                    };
                    if let Some(t) = target {
                        if t != next {
                            return Err(AppError::Validation(format!(
                                "requested target term {}/{} does not match the computed next term for student {}",
                                t.year, t.semester, s.roll_number
                            )));
                        }
                    }
                    buckets.entry(next).or_default().push(s.id);
                }

                let mut promoted = 0u64;
                for (term, bucket) in buckets {
                    let res = student::Entity::update_many()
                        .col_expr(student::Column::Year, Expr::value(term.year.to_string()))
                        .col_expr(
                            student::Column::Semester,
                            Expr::value(term.semester.to_string()),
                        )
                        .filter(student::Column::Id.is_in(bucket))
                        .exec(txn)
                        .await?;
                    promoted += res.rows_affected;
                }

                Ok(PromoteOutcome {
                    promoted,
                    graduated: 0,
                })
            })
        })
        .await;

    result.map_err(|e| match e {
        TransactionError::Connection(err) => AppError::Database(err),
        TransactionError::Transaction(err) => err,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};

    fn term(year: u8, semester: u8) -> Term {
        Term::new(year, semester).unwrap()
    }

    #[test]
    fn test_transition_function() {
        assert_eq!(term(1, 1).next(), Advance::Term(term(1, 2)));
        assert_eq!(term(1, 2).next(), Advance::Term(term(2, 1)));
        assert_eq!(term(2, 1).next(), Advance::Term(term(2, 2)));
        assert_eq!(term(2, 2).next(), Advance::Term(term(3, 1)));
        assert_eq!(term(3, 2).next(), Advance::Term(term(4, 1)));
        assert_eq!(term(4, 1).next(), Advance::Term(term(4, 2)));
        assert_eq!(term(4, 2).next(), Advance::Graduate);
    }

    #[test]
    fn test_term_parse() {
        assert_eq!(Term::parse("2", "1"), Some(term(2, 1)));
        assert_eq!(Term::parse(" 4", "2 "), Some(term(4, 2)));
        assert_eq!(Term::parse("5", "1"), None);
        assert_eq!(Term::parse("0", "1"), None);
        assert_eq!(Term::parse("2", "3"), None);
        assert_eq!(Term::parse("two", "1"), None);
    }

    fn student_row(id: i64, roll: &str, year: &str, semester: &str) -> student::Model {
        student::Model {
            id,
            roll_number: roll.to_string(),
            name: format!("Student {}", id),
            mobile: "9999999999".to_string(),
            year: year.to_string(),
            semester: semester.to_string(),
            section_id: 1,
            department_id: 1,
        }
    }

    #[tokio::test]
    async fn test_empty_selection_rejected_without_touching_db() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let err = promote(&db, &[], None, false, 2026).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(db.into_transaction_log().is_empty());
    }

    #[tokio::test]
    async fn test_standard_promotion_advances_cohort() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                student_row(1, "23B81A0501", "2", "2"),
                student_row(2, "23B81A0502", "2", "2"),
            ]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 2,
            }])
            .into_connection();

        let outcome = promote(&db, &[1, 2], Some(term(3, 1)), false, 2026)
            .await
            .unwrap();
        assert_eq!(outcome.promoted, 2);
        assert_eq!(outcome.graduated, 0);
    }

    #[tokio::test]
    async fn test_semester_one_advances_within_year() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![student_row(7, "24B81A0501", "1", "1")]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        // No advisory target: server computes (1,2)
        let outcome = promote(&db, &[7], None, false, 2026).await.unwrap();
        assert_eq!(outcome.promoted, 1);
    }

    #[tokio::test]
    async fn test_alumni_migration_is_one_transaction() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                student_row(1, "21B81A0501", "4", "2"),
                student_row(2, "21B81A0599", "4", "2"),
            ]])
            // The alumni insert_many issues INSERT ... RETURNING on Postgres,
            // which the mock serves from the query-results buffer.
            .append_query_results([vec![{
                let mut row = BTreeMap::new();
                row.insert("id", Value::BigInt(Some(2)));
                row
            }]])
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 2,
                    rows_affected: 2,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 2,
                },
            ])
            .into_connection();

        let outcome = promote(&db, &[1, 2], None, true, 2026).await.unwrap();
        assert_eq!(outcome.graduated, 2);
        assert_eq!(outcome.promoted, 0);

        let log = db.into_transaction_log();
        let sql: Vec<String> = log.iter().map(|t| format!("{:?}", t)).collect();
        let joined = sql.join("\n");
        assert!(joined.contains("INSERT"), "expected alumni insert in {}", joined);
        assert!(joined.contains("DELETE"), "expected student delete in {}", joined);
        assert!(joined.contains("2026"), "expected passing year in {}", joined);
    }

    #[tokio::test]
    async fn test_missing_student_fails_whole_batch() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![student_row(1, "23B81A0501", "2", "2")]])
            .into_connection();

        let err = promote(&db, &[1, 99], None, false, 2026).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_advisory_target_mismatch_rejected() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![student_row(1, "23B81A0501", "2", "2")]])
            .into_connection();

        let err = promote(&db, &[1], Some(term(2, 1)), false, 2026)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_final_term_requires_alumni_transition() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![student_row(1, "21B81A0501", "4", "2")]])
            .into_connection();

        let err = promote(&db, &[1], None, false, 2026).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_alumni_transition_rejects_non_final_students() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                student_row(1, "21B81A0501", "4", "2"),
                student_row(2, "23B81A0502", "2", "2"),
            ]])
            .into_connection();

        let err = promote(&db, &[1, 2], None, true, 2026).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
