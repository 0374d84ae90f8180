//! Program-outcome aggregation
//!
//! Same fold as the learning-outcome level, one step up: learning outcome
//! scores flow through LO -> PO edges. The report lists every program
//! outcome of the student's departments, including ones nothing feeds.

use outcomes_common::db::{
    LearningOutcomeId, ProgramOutcome, ProgramOutcomeId, RelationId, Student,
};
use outcomes_common::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use super::learning::LearningOutcomeScores;
use crate::store::{EdgeLookup, OutcomeEdge, OutcomeStore};
use crate::weight::{round2, WeightedFold};

/// Reported values of one program outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramOutcomeResult {
    pub code: String,
    pub description: String,
    /// Total incoming weight as a percentage, rounded to 2 decimals
    pub coverage: f64,
    /// Aggregated score, rounded to 2 decimals
    pub score: f64,
}

/// Program outcome results of one student, in program outcome id order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramOutcomeReport {
    pub outcomes: BTreeMap<ProgramOutcomeId, ProgramOutcomeResult>,
    /// Relations skipped because their program outcome no longer exists
    pub skipped_relations: Vec<RelationId>,
}

impl ProgramOutcomeReport {
    pub fn get(&self, id: ProgramOutcomeId) -> Option<&ProgramOutcomeResult> {
        self.outcomes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Fold learning outcome scores into the given program outcomes
///
/// `edges` holds each learning outcome's outgoing edges, already scoped
/// to the student's departments. Every entry of `outcomes` appears in the
/// report; unfed ones carry zero score and coverage.
pub fn fold_program_outcomes(
    lo_scores: &BTreeMap<LearningOutcomeId, f64>,
    edges: &BTreeMap<LearningOutcomeId, Vec<EdgeLookup<OutcomeEdge>>>,
    outcomes: &[ProgramOutcome],
) -> ProgramOutcomeReport {
    let mut fold = WeightedFold::new();
    let mut skipped_relations = Vec::new();

    for (lo_id, lo_score) in lo_scores {
        let Some(lo_edges) = edges.get(lo_id) else {
            continue;
        };

        for edge in lo_edges {
            match edge {
                EdgeLookup::Found(edge) => fold.add(edge.program_outcome_id, *lo_score, edge.weight),
                EdgeLookup::Missing { relation_id } => skipped_relations.push(*relation_id),
            }
        }
    }

    let folded = fold.finish();

    let outcomes = outcomes
        .iter()
        .map(|po| {
            let (score, coverage) = folded
                .get(&po.id)
                .map(|f| (round2(f.score), round2(f.coverage)))
                .unwrap_or((0.0, 0.0));

            (
                po.id,
                ProgramOutcomeResult {
                    code: po.code.clone(),
                    description: po.description.clone(),
                    coverage,
                    score,
                },
            )
        })
        .collect();

    ProgramOutcomeReport {
        outcomes,
        skipped_relations,
    }
}

/// Compute program outcome results for a student from the store
///
/// A student without enrollments or without departments gets an empty
/// report.
pub async fn aggregate_program_outcomes<S>(
    store: &S,
    student: &Student,
    learning: &LearningOutcomeScores,
) -> Result<ProgramOutcomeReport>
where
    S: OutcomeStore + ?Sized,
{
    if learning.enrollment_count == 0 {
        return Ok(ProgramOutcomeReport::default());
    }

    let departments = store.student_departments(student.id).await?;
    if departments.is_empty() {
        debug!(student_id = %student.id, "Student has no departments");
        return Ok(ProgramOutcomeReport::default());
    }

    let outcomes = store.program_outcomes_for(&departments).await?;

    let mut edges = BTreeMap::new();
    for lo_id in learning.scores.keys() {
        edges.insert(*lo_id, store.outcome_edges(*lo_id, &departments).await?);
    }

    let report = fold_program_outcomes(&learning.scores, &edges, &outcomes);

    debug!(
        student_id = %student.id,
        departments = departments.len(),
        program_outcomes = report.len(),
        skipped_relations = report.skipped_relations.len(),
        "Program outcomes aggregated"
    );

    Ok(report)
}
