//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
            sqlx::Type,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// `departments.id`
    DepartmentId
);
id_type!(
    /// `students.id`
    StudentId
);
id_type!(
    /// `courses.id`
    CourseId
);
id_type!(
    /// `course_offerings.id`
    OfferingId
);
id_type!(
    /// `enrollments.id`
    EnrollmentId
);
id_type!(
    /// `assessment_components.id`
    ComponentId
);
id_type!(
    /// `learning_outcomes.id`
    LearningOutcomeId
);
id_type!(
    /// `program_outcomes.id`
    ProgramOutcomeId
);
id_type!(
    /// Primary key of either relation table
    RelationId
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Student {
    pub id: StudentId,
    pub student_no: String,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CourseOffering {
    pub id: OfferingId,
    pub course_id: CourseId,
    pub year: i64,
    pub semester: String,
    pub is_active: bool,
}

/// Enrollment lifecycle; only `Enrolled` rows feed the aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    Enrolled,
    Dropped,
    Completed,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Enrolled => "ENROLLED",
            EnrollmentStatus::Dropped => "DROPPED",
            EnrollmentStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ENROLLED" => Some(EnrollmentStatus::Enrolled),
            "DROPPED" => Some(EnrollmentStatus::Dropped),
            "COMPLETED" => Some(EnrollmentStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub student_id: StudentId,
    pub offering_id: OfferingId,
    pub status: EnrollmentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AssessmentComponent {
    pub id: ComponentId,
    pub offering_id: OfferingId,
    pub name: String,
    /// Nominal share of the course grade; informational only
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProgramOutcome {
    pub id: ProgramOutcomeId,
    pub department_id: DepartmentId,
    pub code: String,
    pub description: String,
}

/// Persisted `(student, program outcome)` aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProgramOutcomeScore {
    pub student_id: StudentId,
    pub program_outcome_id: ProgramOutcomeId,
    pub code: String,
    pub description: String,
    pub score: f64,
    pub coverage: f64,
    pub revision: i64,
    pub updated_at: DateTime<Utc>,
}
