//! Database fixtures for integration tests
//!
//! Every test gets its own temporary database built by `init_database`,
//! so the schema under test is exactly the production one.

#![allow(dead_code)]

use anyhow::Result;
use outcomes_common::db::{
    init_database, ComponentId, CourseOffering, DepartmentId, EnrollmentId, LearningOutcomeId,
    OfferingId, ProgramOutcomeId, RelationId, Student, StudentId,
};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Temporary database plus insert helpers
///
/// The TempDir must be kept alive for the duration of the test.
pub struct TestDb {
    _dir: TempDir,
    pub pool: SqlitePool,
}

pub async fn create_test_db() -> Result<TestDb> {
    let dir = TempDir::new()?;
    let pool = init_database(&dir.path().join("outcomes_test.db")).await?;
    Ok(TestDb { _dir: dir, pool })
}

impl TestDb {
    pub async fn department(&self, code: &str) -> Result<DepartmentId> {
        let id = sqlx::query("INSERT INTO departments (code, name) VALUES (?, ?)")
            .bind(code)
            .bind(format!("{} Department", code))
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(DepartmentId(id))
    }

    pub async fn student(&self, student_no: &str, departments: &[DepartmentId]) -> Result<Student> {
        let id = sqlx::query("INSERT INTO students (student_no, full_name) VALUES (?, ?)")
            .bind(student_no)
            .bind(format!("Student {}", student_no))
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        for department in departments {
            sqlx::query("INSERT INTO student_departments (student_id, department_id) VALUES (?, ?)")
                .bind(id)
                .bind(*department)
                .execute(&self.pool)
                .await?;
        }

        Ok(Student {
            id: StudentId(id),
            student_no: student_no.to_string(),
            full_name: format!("Student {}", student_no),
        })
    }

    /// Course with a single active offering
    pub async fn offering(&self, course_code: &str) -> Result<CourseOffering> {
        let course_id = sqlx::query("INSERT INTO courses (code, name) VALUES (?, ?)")
            .bind(course_code)
            .bind(format!("{} Course", course_code))
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        let id = sqlx::query(
            "INSERT INTO course_offerings (course_id, year, semester, is_active) VALUES (?, 2024, 'FALL', 1)",
        )
        .bind(course_id)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(CourseOffering {
            id: OfferingId(id),
            course_id: course_id.into(),
            year: 2024,
            semester: "FALL".to_string(),
            is_active: true,
        })
    }

    pub async fn enroll(&self, student: StudentId, offering: OfferingId, status: &str) -> Result<EnrollmentId> {
        let id = sqlx::query("INSERT INTO enrollments (student_id, offering_id, status) VALUES (?, ?, ?)")
            .bind(student)
            .bind(offering)
            .bind(status)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(EnrollmentId(id))
    }

    pub async fn component(&self, offering: OfferingId, name: &str, weight: Option<f64>) -> Result<ComponentId> {
        let id = sqlx::query("INSERT INTO assessment_components (offering_id, name, weight) VALUES (?, ?, ?)")
            .bind(offering)
            .bind(name)
            .bind(weight)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(ComponentId(id))
    }

    /// Insert or replace a grade; `None` records an ungraded component
    pub async fn grade(&self, enrollment: EnrollmentId, component: ComponentId, score: Option<f64>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO grades (enrollment_id, component_id, score) VALUES (?, ?, ?)
            ON CONFLICT(enrollment_id, component_id) DO UPDATE SET score = excluded.score
            "#,
        )
        .bind(enrollment)
        .bind(component)
        .bind(score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn learning_outcome(&self, offering: &CourseOffering, code: &str) -> Result<LearningOutcomeId> {
        let id = sqlx::query("INSERT INTO learning_outcomes (course_id, code, description) VALUES (?, ?, ?)")
            .bind(offering.course_id)
            .bind(code)
            .bind(format!("{} description", code))
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(LearningOutcomeId(id))
    }

    pub async fn program_outcome(&self, department: DepartmentId, code: &str) -> Result<ProgramOutcomeId> {
        let id = sqlx::query("INSERT INTO program_outcomes (department_id, code, description) VALUES (?, ?, ?)")
            .bind(department)
            .bind(code)
            .bind(format!("{} description", code))
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(ProgramOutcomeId(id))
    }

    pub async fn component_relation(
        &self,
        component: ComponentId,
        learning_outcome: LearningOutcomeId,
        weight: f64,
    ) -> Result<RelationId> {
        let id = sqlx::query(
            "INSERT INTO component_lo_relations (component_id, learning_outcome_id, weight) VALUES (?, ?, ?)",
        )
        .bind(component)
        .bind(learning_outcome)
        .bind(weight)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(RelationId(id))
    }

    /// Component relation with the weight stored as raw text
    pub async fn component_relation_text(
        &self,
        component: ComponentId,
        learning_outcome: LearningOutcomeId,
        weight: &str,
    ) -> Result<RelationId> {
        let id = sqlx::query(
            "INSERT INTO component_lo_relations (component_id, learning_outcome_id, weight) VALUES (?, ?, ?)",
        )
        .bind(component)
        .bind(learning_outcome)
        .bind(weight)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(RelationId(id))
    }

    pub async fn outcome_relation(
        &self,
        learning_outcome: LearningOutcomeId,
        program_outcome: ProgramOutcomeId,
        weight: f64,
    ) -> Result<RelationId> {
        let id = sqlx::query(
            "INSERT INTO lo_po_relations (learning_outcome_id, program_outcome_id, weight) VALUES (?, ?, ?)",
        )
        .bind(learning_outcome)
        .bind(program_outcome)
        .bind(weight)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(RelationId(id))
    }

    /// Outcome relation pointing at a program outcome id that does not exist
    ///
    /// Foreign keys are switched off on one pooled connection for the insert.
    pub async fn dangling_outcome_relation(
        &self,
        learning_outcome: LearningOutcomeId,
        missing_program_outcome: i64,
        weight: f64,
    ) -> Result<RelationId> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query("PRAGMA foreign_keys = OFF").execute(&mut *conn).await?;
        let id = sqlx::query(
            "INSERT INTO lo_po_relations (learning_outcome_id, program_outcome_id, weight) VALUES (?, ?, ?)",
        )
        .bind(learning_outcome)
        .bind(missing_program_outcome)
        .bind(weight)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();
        sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;

        Ok(RelationId(id))
    }

    pub async fn score_row_count(&self, student: StudentId) -> Result<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM student_program_outcome_scores WHERE student_id = ?",
        )
        .bind(student)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

/// One student, one offering, Midterm 80 -> LO1 (100%) -> PO1 (50%)
pub struct Scenario {
    pub db: TestDb,
    pub department: DepartmentId,
    pub student: Student,
    pub offering: CourseOffering,
    pub enrollment: EnrollmentId,
    pub midterm: ComponentId,
    pub lo1: LearningOutcomeId,
    pub po1: ProgramOutcomeId,
}

pub async fn basic_scenario() -> Result<Scenario> {
    let db = create_test_db().await?;
    let department = db.department("CSE").await?;
    let student = db.student("S001", &[department]).await?;
    let offering = db.offering("CSE101").await?;
    let enrollment = db.enroll(student.id, offering.id, "ENROLLED").await?;
    let midterm = db.component(offering.id, "Midterm", Some(40.0)).await?;
    db.grade(enrollment, midterm, Some(80.0)).await?;
    let lo1 = db.learning_outcome(&offering, "LO1").await?;
    let po1 = db.program_outcome(department, "PO1").await?;
    db.component_relation(midterm, lo1, 100.0).await?;
    db.outcome_relation(lo1, po1, 50.0).await?;

    Ok(Scenario {
        db,
        department,
        student,
        offering,
        enrollment,
        midterm,
        lo1,
        po1,
    })
}
