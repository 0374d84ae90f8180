//! Learning-outcome aggregation
//!
//! Every graded component pushes `grade * weight` into each learning
//! outcome it is related to. Learning outcomes fed by more than 100% of
//! weight are rescaled; the rest keep their raw weighted sum.

use outcomes_common::db::{EnrollmentStatus, LearningOutcomeId, RelationId, Student};
use outcomes_common::Result;
use std::collections::BTreeMap;
use tracing::debug;

use crate::store::{ComponentEdge, EdgeLookup, OutcomeStore};
use crate::weight::WeightedFold;

/// Aggregated learning outcome scores of one student
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LearningOutcomeScores {
    /// Score per learning outcome; outcomes with zero total weight are absent
    pub scores: BTreeMap<LearningOutcomeId, f64>,
    /// Relations skipped because their learning outcome no longer exists
    pub skipped_relations: Vec<RelationId>,
    /// Number of ENROLLED enrollments the scores were derived from
    pub enrollment_count: usize,
}

impl LearningOutcomeScores {
    pub fn get(&self, id: LearningOutcomeId) -> Option<f64> {
        self.scores.get(&id).copied()
    }
}

/// Fold graded components through their outgoing edges
///
/// Each item is a component grade with the component's edge lookups.
pub fn fold_learning_outcomes<'a, I>(graded: I) -> LearningOutcomeScores
where
    I: IntoIterator<Item = (f64, &'a [EdgeLookup<ComponentEdge>])>,
{
    let mut fold = WeightedFold::new();
    let mut skipped_relations = Vec::new();

    for (grade, edges) in graded {
        for edge in edges {
            match edge {
                EdgeLookup::Found(edge) => fold.add(edge.learning_outcome_id, grade, edge.weight),
                EdgeLookup::Missing { relation_id } => skipped_relations.push(*relation_id),
            }
        }
    }

    LearningOutcomeScores {
        scores: fold
            .finish()
            .into_iter()
            .map(|(id, folded)| (id, folded.score))
            .collect(),
        skipped_relations,
        enrollment_count: 0,
    }
}

/// Compute learning outcome scores for a student from the store
pub async fn aggregate_learning_outcomes<S>(store: &S, student: &Student) -> Result<LearningOutcomeScores>
where
    S: OutcomeStore + ?Sized,
{
    let enrollments = store
        .enrollments_for(student.id, EnrollmentStatus::Enrolled)
        .await?;

    if enrollments.is_empty() {
        debug!(student_id = %student.id, "No active enrollments");
        return Ok(LearningOutcomeScores::default());
    }

    let enrollment_ids: Vec<_> = enrollments.iter().map(|e| e.id).collect();
    let grades = store.grades_for(&enrollment_ids).await?;

    let mut graded = Vec::with_capacity(grades.len());
    for ((_, component), grade) in &grades {
        let edges = store.component_edges(*component).await?;
        graded.push((*grade, edges));
    }

    let mut scores = fold_learning_outcomes(
        graded
            .iter()
            .map(|(grade, edges)| (*grade, edges.as_slice())),
    );
    scores.enrollment_count = enrollments.len();

    debug!(
        student_id = %student.id,
        enrollments = enrollments.len(),
        graded_components = grades.len(),
        learning_outcomes = scores.scores.len(),
        skipped_relations = scores.skipped_relations.len(),
        "Learning outcomes aggregated"
    );

    Ok(scores)
}
