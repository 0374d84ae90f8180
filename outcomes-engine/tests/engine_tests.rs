//! Integration tests for the outcome engine against a real SQLite database

mod helpers;

use async_trait::async_trait;
use helpers::{basic_scenario, create_test_db};
use outcomes_common::db::{
    AssessmentComponent, ComponentId, CourseOffering, DepartmentId, Enrollment, EnrollmentId,
    EnrollmentStatus, LearningOutcomeId, OfferingId, ProgramOutcome, StudentId, Student,
    StudentProgramOutcomeScore,
};
use outcomes_common::{Error, Result};
use outcomes_engine::audit::WeightStatus;
use outcomes_engine::store::{
    ComponentEdge, EdgeLookup, GradeMap, OutcomeEdge, RevisionSnapshot, ScoreWrite,
};
use outcomes_engine::{OutcomeEngine, OutcomeStore, SqliteOutcomeStore};
use sqlx::SqlitePool;
use std::sync::Arc;

fn engine(pool: &SqlitePool) -> OutcomeEngine<SqliteOutcomeStore> {
    OutcomeEngine::new(SqliteOutcomeStore::new(pool.clone()))
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// =============================================================================
// Aggregation
// =============================================================================

#[tokio::test]
async fn test_single_component_flows_to_program_outcome() {
    let s = basic_scenario().await.unwrap();
    let engine = engine(&s.db.pool);

    let learning = engine.compute_student_learning_outcomes(&s.student).await.unwrap();
    assert!(approx(learning.get(s.lo1).unwrap(), 80.0));
    assert!(learning.skipped_relations.is_empty());

    let report = engine.compute_student_program_outcomes(&s.student).await.unwrap();
    let po1 = report.get(s.po1).unwrap();
    assert_eq!(po1.score, 40.0);
    assert_eq!(po1.coverage, 50.0);
    assert_eq!(po1.code, "PO1");

    // Computing alone persists nothing
    assert_eq!(s.db.score_row_count(s.student.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_ungraded_component_is_excluded_not_zero() {
    let s = basic_scenario().await.unwrap();
    let final_exam = s.db.component(s.offering.id, "Final", Some(60.0)).await.unwrap();
    s.db.grade(s.enrollment, final_exam, None).await.unwrap();
    s.db.component_relation(final_exam, s.lo1, 100.0).await.unwrap();

    let learning = engine(&s.db.pool)
        .compute_student_learning_outcomes(&s.student)
        .await
        .unwrap();

    // A zero grade would give (80 + 0) / 2 = 40
    assert!(approx(learning.get(s.lo1).unwrap(), 80.0));
}

#[tokio::test]
async fn test_over_weighted_learning_outcome_is_rescaled() {
    let s = basic_scenario().await.unwrap();
    let project = s.db.component(s.offering.id, "Project", Some(60.0)).await.unwrap();
    s.db.grade(s.enrollment, project, Some(60.0)).await.unwrap();
    s.db.component_relation(project, s.lo1, 50.0).await.unwrap();

    let engine = engine(&s.db.pool);
    let learning = engine.compute_student_learning_outcomes(&s.student).await.unwrap();

    // (80 * 1.0 + 60 * 0.5) / 1.5
    assert!(approx(learning.get(s.lo1).unwrap(), 110.0 / 1.5));

    let report = engine.compute_student_program_outcomes(&s.student).await.unwrap();
    let po1 = report.get(s.po1).unwrap();
    assert_eq!(po1.score, 36.67);
    assert_eq!(po1.coverage, 50.0);
}

#[tokio::test]
async fn test_fraction_and_text_weights_match_percentages() {
    let s = basic_scenario().await.unwrap();
    let lo2 = s.db.learning_outcome(&s.offering, "LO2").await.unwrap();
    let lo3 = s.db.learning_outcome(&s.offering, "LO3").await.unwrap();
    let lo4 = s.db.learning_outcome(&s.offering, "LO4").await.unwrap();

    s.db.component_relation(s.midterm, lo2, 0.5).await.unwrap();
    s.db.component_relation_text(s.midterm, lo3, "50").await.unwrap();
    s.db.component_relation_text(s.midterm, lo4, "not a number").await.unwrap();

    let learning = engine(&s.db.pool)
        .compute_student_learning_outcomes(&s.student)
        .await
        .unwrap();

    assert!(approx(learning.get(lo2).unwrap(), 40.0));
    assert!(approx(learning.get(lo3).unwrap(), 40.0));
    // Unparseable weight counts as zero, so LO4 receives nothing
    assert_eq!(learning.get(lo4), None);
}

#[tokio::test]
async fn test_reported_ties_round_half_to_even() {
    let s = basic_scenario().await.unwrap();
    s.db.grade(s.enrollment, s.midterm, Some(80.25)).await.unwrap();

    let report = engine(&s.db.pool)
        .compute_student_program_outcomes(&s.student)
        .await
        .unwrap();

    // 80.25 * 0.5 = 40.125 exactly
    assert_eq!(report.get(s.po1).unwrap().score, 40.12);
}

#[tokio::test]
async fn test_report_lists_every_department_outcome_in_id_order() {
    let s = basic_scenario().await.unwrap();
    let po2 = s.db.program_outcome(s.department, "PO2").await.unwrap();
    let po3 = s.db.program_outcome(s.department, "PO3").await.unwrap();

    let other = s.db.department("EEE").await.unwrap();
    let foreign = s.db.program_outcome(other, "EEE-PO1").await.unwrap();
    s.db.outcome_relation(s.lo1, foreign, 100.0).await.unwrap();

    let report = engine(&s.db.pool)
        .compute_student_program_outcomes(&s.student)
        .await
        .unwrap();

    let ids: Vec<_> = report.outcomes.keys().copied().collect();
    assert_eq!(ids, vec![s.po1, po2, po3]);

    let po2_result = report.get(po2).unwrap();
    assert_eq!(po2_result.score, 0.0);
    assert_eq!(po2_result.coverage, 0.0);
    assert!(report.get(foreign).is_none());
}

#[tokio::test]
async fn test_student_in_two_departments_gets_both_outcome_sets() {
    let s = basic_scenario().await.unwrap();
    let other = s.db.department("MATH").await.unwrap();
    let math_po = s.db.program_outcome(other, "MATH-PO1").await.unwrap();
    s.db.outcome_relation(s.lo1, math_po, 100.0).await.unwrap();

    let student = s.db.student("S002", &[s.department, other]).await.unwrap();
    let enrollment = s.db.enroll(student.id, s.offering.id, "ENROLLED").await.unwrap();
    s.db.grade(enrollment, s.midterm, Some(90.0)).await.unwrap();

    let report = engine(&s.db.pool)
        .compute_student_program_outcomes(&student)
        .await
        .unwrap();

    assert_eq!(report.len(), 2);
    assert_eq!(report.get(s.po1).unwrap().score, 45.0);
    assert_eq!(report.get(math_po).unwrap().score, 90.0);
}

#[tokio::test]
async fn test_dangling_relation_is_skipped_and_reported() {
    let s = basic_scenario().await.unwrap();
    let dangling = s
        .db
        .dangling_outcome_relation(s.lo1, 9_999, 100.0)
        .await
        .unwrap();

    let report = engine(&s.db.pool)
        .compute_student_program_outcomes(&s.student)
        .await
        .unwrap();

    assert_eq!(report.get(s.po1).unwrap().score, 40.0);
    assert_eq!(report.skipped_relations, vec![dangling]);
}

#[tokio::test]
async fn test_dropped_and_completed_enrollments_are_ignored() {
    let s = basic_scenario().await.unwrap();
    sqlx::query("UPDATE enrollments SET status = 'DROPPED' WHERE id = ?")
        .bind(s.enrollment)
        .execute(&s.db.pool)
        .await
        .unwrap();

    let engine = engine(&s.db.pool);
    let learning = engine.compute_student_learning_outcomes(&s.student).await.unwrap();
    assert!(learning.scores.is_empty());
    assert_eq!(learning.enrollment_count, 0);

    sqlx::query("UPDATE enrollments SET status = 'COMPLETED' WHERE id = ?")
        .bind(s.enrollment)
        .execute(&s.db.pool)
        .await
        .unwrap();

    let report = engine.compute_student_program_outcomes(&s.student).await.unwrap();
    assert!(report.is_empty());
}

#[tokio::test]
async fn test_student_without_enrollments_gets_empty_result() {
    let db = create_test_db().await.unwrap();
    let department = db.department("CSE").await.unwrap();
    db.program_outcome(department, "PO1").await.unwrap();
    let student = db.student("S001", &[department]).await.unwrap();

    let engine = engine(&db.pool);
    let report = engine.compute_student_program_outcomes(&student).await.unwrap();
    assert!(report.is_empty());

    let saved = engine
        .compute_and_save_student_program_outcomes(&student)
        .await
        .unwrap();
    assert_eq!(saved.rows_written, 0);
    assert_eq!(db.score_row_count(student.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_student_without_departments_gets_empty_result() {
    let s = basic_scenario().await.unwrap();
    let student = s.db.student("S002", &[]).await.unwrap();
    let enrollment = s.db.enroll(student.id, s.offering.id, "ENROLLED").await.unwrap();
    s.db.grade(enrollment, s.midterm, Some(70.0)).await.unwrap();

    let engine = engine(&s.db.pool);
    let learning = engine.compute_student_learning_outcomes(&student).await.unwrap();
    assert!(approx(learning.get(s.lo1).unwrap(), 70.0));

    let report = engine.compute_student_program_outcomes(&student).await.unwrap();
    assert!(report.is_empty());
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn test_save_persists_one_row_per_outcome() {
    let s = basic_scenario().await.unwrap();
    let engine = engine(&s.db.pool);

    let saved = engine
        .compute_and_save_student_program_outcomes(&s.student)
        .await
        .unwrap();
    assert_eq!(saved.rows_written, 1);

    let stored = engine.stored_program_outcomes(&s.student).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].program_outcome_id, s.po1);
    assert_eq!(stored[0].code, "PO1");
    assert_eq!(stored[0].score, 40.0);
    assert_eq!(stored[0].coverage, 50.0);
    assert_eq!(stored[0].revision, 1);
}

#[tokio::test]
async fn test_repeated_save_overwrites_in_place() {
    let s = basic_scenario().await.unwrap();
    let engine = engine(&s.db.pool);

    let first = engine
        .compute_and_save_student_program_outcomes(&s.student)
        .await
        .unwrap();
    let second = engine
        .compute_and_save_student_program_outcomes(&s.student)
        .await
        .unwrap();

    assert_eq!(first.report, second.report);
    assert_eq!(s.db.score_row_count(s.student.id).await.unwrap(), 1);

    let stored = engine.stored_program_outcomes(&s.student).await.unwrap();
    assert_eq!(stored[0].score, 40.0);
    assert_eq!(stored[0].revision, 2);
}

#[tokio::test]
async fn test_grade_change_updates_stored_score() {
    let s = basic_scenario().await.unwrap();
    let engine = engine(&s.db.pool);

    engine
        .compute_and_save_student_program_outcomes(&s.student)
        .await
        .unwrap();

    s.db.grade(s.enrollment, s.midterm, Some(100.0)).await.unwrap();
    engine
        .compute_and_save_student_program_outcomes(&s.student)
        .await
        .unwrap();

    let stored = engine.stored_program_outcomes(&s.student).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].score, 50.0);
}

#[tokio::test]
async fn test_stale_snapshot_is_rejected_without_writing() {
    let s = basic_scenario().await.unwrap();
    let engine = engine(&s.db.pool);

    // Snapshot taken before anyone wrote
    let stale = engine.store().score_revisions(s.student.id).await.unwrap();
    assert!(stale.is_empty());

    engine
        .compute_and_save_student_program_outcomes(&s.student)
        .await
        .unwrap();

    let rows = vec![ScoreWrite {
        program_outcome_id: s.po1,
        score: 99.0,
        coverage: 99.0,
    }];
    let err = engine
        .store()
        .write_scores(s.student.id, &stale, &rows)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Conflict(_)));
    assert!(err.is_retryable());

    let stored = engine.stored_program_outcomes(&s.student).await.unwrap();
    assert_eq!(stored[0].score, 40.0);
    assert_eq!(stored[0].revision, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_saves_for_distinct_students_all_succeed() {
    let s = basic_scenario().await.unwrap();

    let mut students = vec![s.student.clone()];
    for n in 0..15 {
        let student = s
            .db
            .student(&format!("P{:03}", n), &[s.department])
            .await
            .unwrap();
        let enrollment = s.db.enroll(student.id, s.offering.id, "ENROLLED").await.unwrap();
        s.db.grade(enrollment, s.midterm, Some(50.0 + n as f64)).await.unwrap();
        students.push(student);
    }

    let engine = Arc::new(engine(&s.db.pool));

    for _round in 0..5 {
        let mut handles = Vec::new();
        for student in &students {
            let engine = Arc::clone(&engine);
            let student = student.clone();
            handles.push(tokio::spawn(async move {
                engine.compute_and_save_student_program_outcomes(&student).await
            }));
        }

        for handle in handles {
            let saved = handle.await.unwrap();
            assert!(saved.is_ok(), "parallel save failed: {:?}", saved.err());
        }
    }

    for student in &students {
        let stored = engine.stored_program_outcomes(student).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].revision, 5);
    }
}

#[tokio::test]
async fn test_current_snapshot_is_accepted() {
    let s = basic_scenario().await.unwrap();
    let store = SqliteOutcomeStore::new(s.db.pool.clone());

    let rows = vec![ScoreWrite {
        program_outcome_id: s.po1,
        score: 12.5,
        coverage: 25.0,
    }];
    let written = store
        .write_scores(s.student.id, &RevisionSnapshot::new(), &rows)
        .await
        .unwrap();
    assert_eq!(written, 1);

    let snapshot = store.score_revisions(s.student.id).await.unwrap();
    assert_eq!(snapshot.get(&s.po1), Some(&1));
}

// =============================================================================
// Offering-level operations
// =============================================================================

#[tokio::test]
async fn test_recompute_offering_covers_enrolled_students_only() {
    let s = basic_scenario().await.unwrap();

    let dropped = s.db.student("S002", &[s.department]).await.unwrap();
    let enrollment = s.db.enroll(dropped.id, s.offering.id, "DROPPED").await.unwrap();
    s.db.grade(enrollment, s.midterm, Some(50.0)).await.unwrap();

    let enrolled = s.db.student("S003", &[s.department]).await.unwrap();
    let enrollment = s.db.enroll(enrolled.id, s.offering.id, "ENROLLED").await.unwrap();
    s.db.grade(enrollment, s.midterm, Some(60.0)).await.unwrap();

    let summary = engine(&s.db.pool)
        .recompute_offering(s.offering.id)
        .await
        .unwrap();

    assert_eq!(summary.offering_id, s.offering.id);
    assert_eq!(summary.students, 2);
    assert_eq!(summary.rows_written, 2);
    assert!(summary.failed_students.is_empty());
    assert_eq!(s.db.score_row_count(s.student.id).await.unwrap(), 1);
    assert_eq!(s.db.score_row_count(enrolled.id).await.unwrap(), 1);
    assert_eq!(s.db.score_row_count(dropped.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let db = create_test_db().await.unwrap();
    let engine = engine(&db.pool);

    let err = engine.student(StudentId(42)).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let err = engine.recompute_offering(OfferingId(42)).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let err = engine.audit_offering_weights(OfferingId(42)).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_weight_audit_classifies_components() {
    let s = basic_scenario().await.unwrap();
    let final_exam = s.db.component(s.offering.id, "Final", Some(60.0)).await.unwrap();
    let project = s.db.component(s.offering.id, "Project", None).await.unwrap();
    let lo2 = s.db.learning_outcome(&s.offering, "LO2").await.unwrap();
    s.db.component_relation(project, s.lo1, 80.0).await.unwrap();
    s.db.component_relation(project, lo2, 70.0).await.unwrap();

    let audit = engine(&s.db.pool)
        .audit_offering_weights(s.offering.id)
        .await
        .unwrap();

    // Midterm 40 + Final 60
    assert_eq!(audit.component_weight_total, 100.0);
    assert_eq!(audit.component_weight_status, WeightStatus::Complete);

    let by_id = |id| audit.components.iter().find(|c| c.component_id == id).unwrap();
    assert_eq!(by_id(s.midterm).status, WeightStatus::Complete);
    assert_eq!(by_id(final_exam).status, WeightStatus::Unassigned);
    assert_eq!(by_id(project).status, WeightStatus::OverSpecified);
    assert_eq!(by_id(project).outcome_weight_total, 150.0);
    assert!(!audit.is_clean());
}

#[tokio::test]
async fn test_nominal_weight_of_one_counts_as_one_percent() {
    let s = basic_scenario().await.unwrap();
    s.db.component(s.offering.id, "Attendance", Some(1.0)).await.unwrap();

    let audit = engine(&s.db.pool)
        .audit_offering_weights(s.offering.id)
        .await
        .unwrap();

    // Midterm 40 + Attendance 1
    assert_eq!(audit.component_weight_total, 41.0);
    assert_eq!(audit.component_weight_status, WeightStatus::UnderSpecified);
}

/// Store that fails every score write for one student with a conflict
struct ConflictingStore {
    inner: SqliteOutcomeStore,
    conflicting: StudentId,
}

#[async_trait]
impl OutcomeStore for ConflictingStore {
    async fn find_student(&self, id: StudentId) -> Result<Option<Student>> {
        self.inner.find_student(id).await
    }

    async fn find_offering(&self, id: OfferingId) -> Result<Option<CourseOffering>> {
        self.inner.find_offering(id).await
    }

    async fn enrollments_for(
        &self,
        student: StudentId,
        status: EnrollmentStatus,
    ) -> Result<Vec<Enrollment>> {
        self.inner.enrollments_for(student, status).await
    }

    async fn students_in_offering(
        &self,
        offering: OfferingId,
        status: EnrollmentStatus,
    ) -> Result<Vec<StudentId>> {
        self.inner.students_in_offering(offering, status).await
    }

    async fn grades_for(&self, enrollments: &[EnrollmentId]) -> Result<GradeMap> {
        self.inner.grades_for(enrollments).await
    }

    async fn components_for_offering(&self, offering: OfferingId) -> Result<Vec<AssessmentComponent>> {
        self.inner.components_for_offering(offering).await
    }

    async fn component_edges(&self, component: ComponentId) -> Result<Vec<EdgeLookup<ComponentEdge>>> {
        self.inner.component_edges(component).await
    }

    async fn outcome_edges(
        &self,
        learning_outcome: LearningOutcomeId,
        departments: &[DepartmentId],
    ) -> Result<Vec<EdgeLookup<OutcomeEdge>>> {
        self.inner.outcome_edges(learning_outcome, departments).await
    }

    async fn student_departments(&self, student: StudentId) -> Result<Vec<DepartmentId>> {
        self.inner.student_departments(student).await
    }

    async fn program_outcomes_for(&self, departments: &[DepartmentId]) -> Result<Vec<ProgramOutcome>> {
        self.inner.program_outcomes_for(departments).await
    }

    async fn stored_scores(&self, student: StudentId) -> Result<Vec<StudentProgramOutcomeScore>> {
        self.inner.stored_scores(student).await
    }

    async fn score_revisions(&self, student: StudentId) -> Result<RevisionSnapshot> {
        self.inner.score_revisions(student).await
    }

    async fn write_scores(
        &self,
        student: StudentId,
        snapshot: &RevisionSnapshot,
        rows: &[ScoreWrite],
    ) -> Result<usize> {
        if student == self.conflicting {
            return Err(Error::Conflict(format!("student {} busy", student)));
        }
        self.inner.write_scores(student, snapshot, rows).await
    }
}

#[tokio::test]
async fn test_recompute_offering_continues_past_retryable_failure() {
    let s = basic_scenario().await.unwrap();
    let other = s.db.student("S002", &[s.department]).await.unwrap();
    let enrollment = s.db.enroll(other.id, s.offering.id, "ENROLLED").await.unwrap();
    s.db.grade(enrollment, s.midterm, Some(70.0)).await.unwrap();

    let engine = OutcomeEngine::new(ConflictingStore {
        inner: SqliteOutcomeStore::new(s.db.pool.clone()),
        conflicting: s.student.id,
    });

    let summary = engine.recompute_offering(s.offering.id).await.unwrap();

    assert_eq!(summary.students, 1);
    assert_eq!(summary.rows_written, 1);
    assert_eq!(summary.failed_students, vec![s.student.id]);
    assert_eq!(s.db.score_row_count(s.student.id).await.unwrap(), 0);
    assert_eq!(s.db.score_row_count(other.id).await.unwrap(), 1);
}
