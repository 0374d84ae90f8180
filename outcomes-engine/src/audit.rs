//! Weight configuration audit for one offering
//!
//! The aggregation silently tolerates badly configured weights. This
//! report makes those configurations visible to the people who enter
//! them: nominal component weights that do not total 100, and components
//! whose learning outcome edges are unassigned, partial or over-full.

use outcomes_common::db::{ComponentId, CourseOffering, OfferingId};
use outcomes_common::Result;
use serde::Serialize;

use crate::store::{EdgeLookup, OutcomeStore};
use crate::weight::{round2, FULL_PERCENT};

const EPSILON: f64 = 1e-9;

/// How a weight total compares to 100%
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeightStatus {
    /// Nothing assigned
    Unassigned,
    /// Below 100%; contributions stay proportionally smaller
    UnderSpecified,
    /// Exactly 100%
    Complete,
    /// Above 100%; contributions get rescaled
    OverSpecified,
}

impl WeightStatus {
    pub fn classify(total_percent: f64) -> Self {
        if total_percent <= EPSILON {
            WeightStatus::Unassigned
        } else if (total_percent - FULL_PERCENT).abs() <= EPSILON {
            WeightStatus::Complete
        } else if total_percent < FULL_PERCENT {
            WeightStatus::UnderSpecified
        } else {
            WeightStatus::OverSpecified
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentWeightAudit {
    pub component_id: ComponentId,
    pub name: String,
    /// Nominal share of the course grade as entered
    pub nominal_weight: Option<f64>,
    /// Sum of the component's learning outcome edge weights, in percent
    pub outcome_weight_total: f64,
    pub status: WeightStatus,
    /// Edges pointing at deleted learning outcomes
    pub missing_relations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferingWeightAudit {
    pub offering_id: OfferingId,
    /// Sum of nominal component weights, in percent
    pub component_weight_total: f64,
    pub component_weight_status: WeightStatus,
    pub components: Vec<ComponentWeightAudit>,
}

impl OfferingWeightAudit {
    /// True when every total is exactly 100% and no relation dangles
    pub fn is_clean(&self) -> bool {
        self.component_weight_status == WeightStatus::Complete
            && self
                .components
                .iter()
                .all(|c| c.status == WeightStatus::Complete && c.missing_relations == 0)
    }
}

/// Nominal component weight as a percentage
///
/// Nominal weights are always entered as percentages, so 1 means 1%.
/// Missing, negative or non-finite values contribute nothing.
pub fn nominal_percent(weight: Option<f64>) -> f64 {
    match weight {
        Some(w) if w.is_finite() && w > 0.0 => w,
        _ => 0.0,
    }
}

/// Build the audit report of one offering
pub async fn audit_offering_weights<S>(store: &S, offering: &CourseOffering) -> Result<OfferingWeightAudit>
where
    S: OutcomeStore + ?Sized,
{
    let components = store.components_for_offering(offering.id).await?;

    let mut component_weight_total = 0.0;
    let mut audits = Vec::with_capacity(components.len());

    for component in components {
        component_weight_total += nominal_percent(component.weight);

        let mut outcome_weight_total = 0.0;
        let mut missing_relations = 0;
        for edge in store.component_edges(component.id).await? {
            match edge {
                EdgeLookup::Found(edge) => outcome_weight_total += edge.weight.percent(),
                EdgeLookup::Missing { .. } => missing_relations += 1,
            }
        }

        audits.push(ComponentWeightAudit {
            component_id: component.id,
            name: component.name,
            nominal_weight: component.weight,
            outcome_weight_total: round2(outcome_weight_total),
            status: WeightStatus::classify(outcome_weight_total),
            missing_relations,
        });
    }

    Ok(OfferingWeightAudit {
        offering_id: offering.id,
        component_weight_total: round2(component_weight_total),
        component_weight_status: WeightStatus::classify(component_weight_total),
        components: audits,
    })
}
