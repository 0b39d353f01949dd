use axum::{Json, extract::State, http::StatusCode};
use tracing::{info, instrument};

use fa_common::api::{MarkAttendanceRequest, MarkAttendanceResponse};
use fa_common::attendance::{RecognitionMode, RecognitionOutcome};
use fa_common::run_id;

use crate::SharedState;
use crate::error::{ApiError, current_request_id};

type MarkResult = Result<(StatusCode, Json<MarkAttendanceResponse>), ApiError>;

/// `mode` 省略時は multi
pub async fn mark(State(state): State<SharedState>, Json(req): Json<MarkAttendanceRequest>) -> MarkResult {
    let mode = req.mode.unwrap_or_default();
    recognize(&state, &req.faces, mode).await
}

/// 1 人ずつの打刻端末
pub async fn mark_face(
    State(state): State<SharedState>,
    Json(req): Json<MarkAttendanceRequest>,
) -> MarkResult {
    recognize(&state, &req.faces, RecognitionMode::Single).await
}

/// ジェスチャーで起動される一括打刻
pub async fn wave_mark(
    State(state): State<SharedState>,
    Json(req): Json<MarkAttendanceRequest>,
) -> MarkResult {
    recognize(&state, &req.faces, RecognitionMode::Multi).await
}

fn status_for(outcome: &RecognitionOutcome) -> StatusCode {
    match outcome {
        RecognitionOutcome::NoFacesDetected => StatusCode::BAD_REQUEST,
        RecognitionOutcome::NotRecognized { .. } => StatusCode::NOT_FOUND,
        RecognitionOutcome::Recognized { .. } => StatusCode::OK,
    }
}

#[instrument(skip(state, faces), fields(faces = faces.len(), request_id = tracing::field::Empty))]
async fn recognize(state: &SharedState, faces: &[Vec<f32>], mode: RecognitionMode) -> MarkResult {
    let request_id = current_request_id().unwrap_or_else(run_id::generate);
    tracing::Span::current().record("request_id", request_id.as_str());

    let outcome = state.coordinator.process_raw(faces, mode).await?;

    fa_metrics::record_recognition(outcome.label());
    if let RecognitionOutcome::Recognized { entries } = &outcome {
        for entry in entries {
            fa_metrics::record_attendance(entry.direction.as_str());
        }
    }
    info!(outcome = outcome.label(), "recognition finished");

    Ok((
        status_for(&outcome),
        Json(MarkAttendanceResponse::from_outcome(request_id, &outcome)),
    ))
}
