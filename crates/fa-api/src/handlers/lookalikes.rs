use axum::{Json, extract::State};

use fa_common::api::{LookalikeRequest, LookalikeResponse};
use fa_common::embedding::normalize;

use crate::SharedState;
use crate::error::ApiError;

const MAX_LOOKALIKES: usize = 20;

pub async fn find_lookalikes(
    State(state): State<SharedState>,
    Json(req): Json<LookalikeRequest>,
) -> Result<Json<LookalikeResponse>, ApiError> {
    let dimension = state.store.dimension();
    if req.face.len() != dimension {
        return Err(ApiError::BadRequest(format!(
            "face embedding must have {dimension} components, got {}",
            req.face.len()
        )));
    }

    let probe = normalize(&req.face)?;
    let k = req
        .k
        .unwrap_or(state.recognition.lookalike_k)
        .min(MAX_LOOKALIKES);
    let exclude = req
        .exclude_identity_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty());

    let outcome = state.ranker.top_lookalikes_excluding(&probe, k, exclude)?;
    fa_metrics::record_lookalike(outcome.status());

    Ok(Json(outcome.into()))
}
