//! SQLite implementation of [`OutcomeStore`]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outcomes_common::db::{
    AssessmentComponent, ComponentId, CourseOffering, DepartmentId, Enrollment, EnrollmentId,
    EnrollmentStatus, LearningOutcomeId, OfferingId, ProgramOutcome, ProgramOutcomeId,
    RelationId, Student, StudentId, StudentProgramOutcomeScore,
};
use outcomes_common::{Error, Result};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use super::{
    ComponentEdge, EdgeLookup, GradeMap, OutcomeEdge, OutcomeStore, RevisionSnapshot, ScoreWrite,
};
use crate::weight::Weight;

/// [`OutcomeStore`] backed by the shared SQLite database
#[derive(Clone)]
pub struct SqliteOutcomeStore {
    pool: SqlitePool,
}

impl SqliteOutcomeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl OutcomeStore for SqliteOutcomeStore {
    async fn find_student(&self, id: StudentId) -> Result<Option<Student>> {
        let student = sqlx::query_as::<_, Student>(
            "SELECT id, student_no, full_name FROM students WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(student)
    }

    async fn find_offering(&self, id: OfferingId) -> Result<Option<CourseOffering>> {
        let offering = sqlx::query_as::<_, CourseOffering>(
            "SELECT id, course_id, year, semester, is_active FROM course_offerings WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(offering)
    }

    async fn enrollments_for(
        &self,
        student: StudentId,
        status: EnrollmentStatus,
    ) -> Result<Vec<Enrollment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, student_id, offering_id, status
            FROM enrollments
            WHERE student_id = ? AND status = ?
            ORDER BY id
            "#,
        )
        .bind(student)
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut enrollments = Vec::with_capacity(rows.len());
        for row in rows {
            let raw_status: String = row.try_get("status")?;
            let Some(status) = EnrollmentStatus::parse(&raw_status) else {
                warn!(status = %raw_status, "Skipping enrollment with unknown status");
                continue;
            };

            enrollments.push(Enrollment {
                id: row.try_get("id")?,
                student_id: row.try_get("student_id")?,
                offering_id: row.try_get("offering_id")?,
                status,
            });
        }

        Ok(enrollments)
    }

    async fn students_in_offering(
        &self,
        offering: OfferingId,
        status: EnrollmentStatus,
    ) -> Result<Vec<StudentId>> {
        let students = sqlx::query_scalar::<_, StudentId>(
            "SELECT student_id FROM enrollments WHERE offering_id = ? AND status = ? ORDER BY student_id",
        )
        .bind(offering)
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(students)
    }

    async fn grades_for(&self, enrollments: &[EnrollmentId]) -> Result<GradeMap> {
        if enrollments.is_empty() {
            return Ok(GradeMap::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT g.enrollment_id, g.component_id, g.score
            FROM grades g
            JOIN enrollments e ON e.id = g.enrollment_id
            JOIN assessment_components c
              ON c.id = g.component_id AND c.offering_id = e.offering_id
            WHERE g.score IS NOT NULL AND g.enrollment_id IN (
            "#,
        );
        let mut ids = query.separated(", ");
        for enrollment in enrollments {
            ids.push_bind(*enrollment);
        }
        ids.push_unseparated(")");

        let rows = query.build().fetch_all(&self.pool).await?;

        let mut grades = GradeMap::new();
        for row in rows {
            let enrollment: EnrollmentId = row.try_get("enrollment_id")?;
            let component: ComponentId = row.try_get("component_id")?;
            let score: f64 = row.try_get("score")?;
            grades.insert((enrollment, component), score);
        }

        Ok(grades)
    }

    async fn components_for_offering(
        &self,
        offering: OfferingId,
    ) -> Result<Vec<AssessmentComponent>> {
        let components = sqlx::query_as::<_, AssessmentComponent>(
            r#"
            SELECT id, offering_id, name, CAST(weight AS REAL) AS weight
            FROM assessment_components
            WHERE offering_id = ?
            ORDER BY id
            "#,
        )
        .bind(offering)
        .fetch_all(&self.pool)
        .await?;

        Ok(components)
    }

    async fn component_edges(
        &self,
        component: ComponentId,
    ) -> Result<Vec<EdgeLookup<ComponentEdge>>> {
        // Weight is read as text so stray non-numeric values coerce to zero
        // instead of failing the decode.
        let rows = sqlx::query(
            r#"
            SELECT r.id, r.component_id, r.learning_outcome_id,
                   CAST(r.weight AS TEXT) AS weight_raw,
                   lo.id AS found_id
            FROM component_lo_relations r
            LEFT JOIN learning_outcomes lo ON lo.id = r.learning_outcome_id
            WHERE r.component_id = ?
            ORDER BY r.id
            "#,
        )
        .bind(component)
        .fetch_all(&self.pool)
        .await?;

        let mut edges = Vec::with_capacity(rows.len());
        for row in rows {
            let relation_id: RelationId = row.try_get("id")?;
            let found: Option<i64> = row.try_get("found_id")?;

            if found.is_none() {
                debug!(relation_id = %relation_id, "Component relation points at a missing learning outcome");
                edges.push(EdgeLookup::Missing { relation_id });
                continue;
            }

            let weight_raw: Option<String> = row.try_get("weight_raw")?;
            edges.push(EdgeLookup::Found(ComponentEdge {
                relation_id,
                component_id: row.try_get("component_id")?,
                learning_outcome_id: row.try_get("learning_outcome_id")?,
                weight: Weight::parse(weight_raw.as_deref()),
            }));
        }

        Ok(edges)
    }

    async fn outcome_edges(
        &self,
        learning_outcome: LearningOutcomeId,
        departments: &[DepartmentId],
    ) -> Result<Vec<EdgeLookup<OutcomeEdge>>> {
        let rows = sqlx::query(
            r#"
            SELECT r.id, r.learning_outcome_id, r.program_outcome_id,
                   CAST(r.weight AS TEXT) AS weight_raw,
                   po.id AS found_id, po.department_id
            FROM lo_po_relations r
            LEFT JOIN program_outcomes po ON po.id = r.program_outcome_id
            WHERE r.learning_outcome_id = ?
            ORDER BY r.id
            "#,
        )
        .bind(learning_outcome)
        .fetch_all(&self.pool)
        .await?;

        let mut edges = Vec::with_capacity(rows.len());
        for row in rows {
            let relation_id: RelationId = row.try_get("id")?;
            let found: Option<i64> = row.try_get("found_id")?;

            if found.is_none() {
                debug!(relation_id = %relation_id, "Outcome relation points at a missing program outcome");
                edges.push(EdgeLookup::Missing { relation_id });
                continue;
            }

            let department: Option<DepartmentId> = row.try_get("department_id")?;
            if !department.is_some_and(|d| departments.contains(&d)) {
                continue;
            }

            let weight_raw: Option<String> = row.try_get("weight_raw")?;
            edges.push(EdgeLookup::Found(OutcomeEdge {
                relation_id,
                learning_outcome_id: row.try_get("learning_outcome_id")?,
                program_outcome_id: row.try_get("program_outcome_id")?,
                weight: Weight::parse(weight_raw.as_deref()),
            }));
        }

        Ok(edges)
    }

    async fn student_departments(&self, student: StudentId) -> Result<Vec<DepartmentId>> {
        let departments = sqlx::query_scalar::<_, DepartmentId>(
            "SELECT department_id FROM student_departments WHERE student_id = ? ORDER BY department_id",
        )
        .bind(student)
        .fetch_all(&self.pool)
        .await?;

        Ok(departments)
    }

    async fn program_outcomes_for(
        &self,
        departments: &[DepartmentId],
    ) -> Result<Vec<ProgramOutcome>> {
        if departments.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, department_id, code, description FROM program_outcomes WHERE department_id IN (",
        );
        let mut ids = query.separated(", ");
        for department in departments {
            ids.push_bind(*department);
        }
        ids.push_unseparated(") ORDER BY id");

        let outcomes = query
            .build_query_as::<ProgramOutcome>()
            .fetch_all(&self.pool)
            .await?;

        Ok(outcomes)
    }

    async fn stored_scores(&self, student: StudentId) -> Result<Vec<StudentProgramOutcomeScore>> {
        let rows = sqlx::query(
            r#"
            SELECT s.student_id, s.program_outcome_id, po.code, po.description,
                   s.score, s.coverage, s.revision, s.updated_at
            FROM student_program_outcome_scores s
            JOIN program_outcomes po ON po.id = s.program_outcome_id
            WHERE s.student_id = ?
            ORDER BY s.program_outcome_id
            "#,
        )
        .bind(student)
        .fetch_all(&self.pool)
        .await?;

        let mut scores = Vec::with_capacity(rows.len());
        for row in rows {
            let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
            scores.push(StudentProgramOutcomeScore {
                student_id: row.try_get("student_id")?,
                program_outcome_id: row.try_get("program_outcome_id")?,
                code: row.try_get("code")?,
                description: row.try_get("description")?,
                score: row.try_get("score")?,
                coverage: row.try_get("coverage")?,
                revision: row.try_get("revision")?,
                updated_at,
            });
        }

        Ok(scores)
    }

    async fn score_revisions(&self, student: StudentId) -> Result<RevisionSnapshot> {
        let rows = sqlx::query_as::<_, (ProgramOutcomeId, i64)>(
            "SELECT program_outcome_id, revision FROM student_program_outcome_scores WHERE student_id = ?",
        )
        .bind(student)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn write_scores(
        &self,
        student: StudentId,
        snapshot: &RevisionSnapshot,
        rows: &[ScoreWrite],
    ) -> Result<usize> {
        let mut conn = self.pool.acquire().await?;

        // IMMEDIATE takes the write lock up front, so concurrent writers wait
        // on the busy timeout instead of failing the read-to-write upgrade.
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        match write_scores_locked(&mut *conn, student, snapshot, rows).await {
            Ok(written) => Ok(written),
            Err(e) => {
                if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    debug!(error = %rollback, "Rollback after failed score write");
                }
                Err(e)
            }
        }
    }
}

/// Revision check, upsert and commit inside an open IMMEDIATE transaction
async fn write_scores_locked(
    conn: &mut SqliteConnection,
    student: StudentId,
    snapshot: &RevisionSnapshot,
    rows: &[ScoreWrite],
) -> Result<usize> {
    let current: RevisionSnapshot = sqlx::query_as::<_, (ProgramOutcomeId, i64)>(
        "SELECT program_outcome_id, revision FROM student_program_outcome_scores WHERE student_id = ?",
    )
    .bind(student)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .collect();

    if &current != snapshot {
        return Err(Error::Conflict(format!(
            "program outcome scores of student {} changed during recompute",
            student
        )));
    }

    let now = Utc::now();
    for row in rows {
        sqlx::query(
            r#"
            INSERT INTO student_program_outcome_scores (
                student_id, program_outcome_id, score, coverage, revision, updated_at
            ) VALUES (?, ?, ?, ?, 1, ?)
            ON CONFLICT(student_id, program_outcome_id) DO UPDATE SET
                score = excluded.score,
                coverage = excluded.coverage,
                revision = student_program_outcome_scores.revision + 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(student)
        .bind(row.program_outcome_id)
        .bind(row.score)
        .bind(row.coverage)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }

    sqlx::query("COMMIT").execute(&mut *conn).await?;

    Ok(rows.len())
}
