use axum::{Json, extract::State, http::StatusCode};

use fa_common::OrganizationRegistry;
use fa_common::api::{CreateOrganizationRequest, OrganizationListResponse, OrganizationResponse};

use crate::SharedState;
use crate::error::ApiError;

pub async fn list_organizations(
    State(state): State<SharedState>,
) -> Result<Json<OrganizationListResponse>, ApiError> {
    let organizations = state.backend.list_organizations().await?;
    Ok(Json(OrganizationListResponse { organizations }))
}

/// 既存なら 200、新規作成なら 201
pub async fn create_organization(
    State(state): State<SharedState>,
    Json(req): Json<CreateOrganizationRequest>,
) -> Result<(StatusCode, Json<OrganizationResponse>), ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("organization name is required".into()));
    }

    let (organization, created) = state.backend.ensure_organization(name).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(OrganizationResponse { organization, created })))
}
