use axum::{Json, extract::State, http::StatusCode};
use tracing::{info, warn};

use fa_common::api::{EnrollIdentityRequest, EnrollIdentityResponse};
use fa_common::{IdentityRegistry, OrganizationRegistry, RegisterOutcome, run_id};

use crate::SharedState;
use crate::error::ApiError;

/// 人物を登録し、使える埋め込みがあればキャッシュにも載せる
///
/// 顔が無い、あるいはゼロノルムの埋め込みでも登録自体は行う（照合対象にはならない）。
pub async fn enroll_identity(
    State(state): State<SharedState>,
    Json(req): Json<EnrollIdentityRequest>,
) -> Result<(StatusCode, Json<EnrollIdentityResponse>), ApiError> {
    if req.first_name.trim().is_empty() {
        return Err(ApiError::BadRequest("first_name is required".into()));
    }

    let dimension = state.store.dimension();
    if let Some(face) = req.faces.first() {
        if face.len() != dimension {
            return Err(ApiError::BadRequest(format!(
                "face embedding must have {dimension} components, got {}",
                face.len()
            )));
        }
    }

    let identity =
        req.into_new_identity(run_id::generate(), state.config.host_organization.as_deref());

    let profile = match state.backend.register_identity(&identity).await? {
        RegisterOutcome::Registered(profile) => profile,
        RegisterOutcome::DuplicatePhone => {
            return Err(ApiError::Conflict("phone number is already registered".into()));
        }
    };

    // 登録が通った場合のみ組織を作る
    if let Some(organization) = profile.organization.as_deref() {
        state.backend.ensure_organization(organization).await?;
    }

    let searchable = match identity.embedding.as_deref() {
        Some(raw) => match state.store.upsert(
            profile.identity_key.as_str(),
            raw,
            profile.display_name.as_str(),
            profile.organization.clone(),
        ) {
            Ok(()) => true,
            Err(err) => {
                warn!(identity_key = %profile.identity_key, error = %err, "enrolled without a usable embedding");
                false
            }
        },
        None => false,
    };
    fa_metrics::set_cached_identities(state.store.len());

    info!(
        identity_key = %profile.identity_key,
        is_vendor = profile.is_vendor,
        searchable,
        "identity enrolled"
    );
    Ok((
        StatusCode::CREATED,
        Json(EnrollIdentityResponse::new(profile, searchable)),
    ))
}
