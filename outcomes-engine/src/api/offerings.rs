//! Per-offering endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use outcomes_common::db::OfferingId;

use super::ApiError;
use crate::audit::OfferingWeightAudit;
use crate::{AppState, OfferingRecompute};

/// POST /api/offerings/:id/recompute
///
/// Recomputes and persists every ENROLLED student of the offering, as
/// after a grade sheet has been saved.
pub async fn recompute_offering(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<OfferingRecompute>, ApiError> {
    let summary = state.engine.recompute_offering(OfferingId(id)).await?;
    Ok(Json(summary))
}

/// GET /api/offerings/:id/weight-audit
pub async fn get_weight_audit(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<OfferingWeightAudit>, ApiError> {
    let audit = state.engine.audit_offering_weights(OfferingId(id)).await?;
    Ok(Json(audit))
}
