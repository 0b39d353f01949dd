use tokio_postgres::Row;
use tracing::{info, instrument};

use crate::db::util::TimedClientExt;
use crate::db::PgPool;
use crate::directory::{
    display_name, EnrolledIdentity, IdentityProfile, NewIdentity, RegisterOutcome,
};

db_error!(IdentityStorageError {
    #[error("first name is required")]
    MissingFirstName,
});

fn display_name_from_row(row: &Row) -> String {
    let first: String = row.get("first_name");
    let last: Option<String> = row.get("last_name");
    display_name(&first, last.as_deref())
}

/// 埋め込みを持つ人物を全件取得（起動時のキャッシュ読み込み用）
#[instrument(skip(pool))]
pub async fn fetch_enrolled_identities(
    pool: &PgPool,
) -> Result<Vec<EnrolledIdentity>, IdentityStorageError> {
    let client = pool.get().await?;
    let rows = client
        .timed_query_cached(
            "SELECT identity_key, first_name, last_name, organization, embedding
             FROM fa.identities
             WHERE embedding IS NOT NULL
             ORDER BY identity_key",
            &[],
            "fetch_enrolled_identities",
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| EnrolledIdentity {
            identity_key: row.get("identity_key"),
            embedding: row.get("embedding"),
            display_name: display_name_from_row(row),
            organization: row.get("organization"),
        })
        .collect())
}

#[instrument(skip(pool))]
pub async fn fetch_identity_profile(
    pool: &PgPool,
    identity_key: &str,
) -> Result<Option<IdentityProfile>, IdentityStorageError> {
    let client = pool.get().await?;
    let row = client
        .timed_query_opt_cached(
            "SELECT identity_key, first_name, last_name, organization, is_vendor
             FROM fa.identities
             WHERE identity_key = $1",
            &[&identity_key],
            "fetch_identity_profile",
        )
        .await?;

    Ok(row.map(|row| IdentityProfile {
        identity_key: row.get("identity_key"),
        display_name: display_name_from_row(&row),
        organization: row.get("organization"),
        is_vendor: row.get("is_vendor"),
    }))
}

/// 電話番号が既に使われていれば `DuplicatePhone`（NULL は重複扱いしない）
#[instrument(skip(pool, identity), fields(identity_key = %identity.identity_key))]
pub async fn insert_identity(
    pool: &PgPool,
    identity: &NewIdentity,
) -> Result<RegisterOutcome, IdentityStorageError> {
    if identity.first_name.trim().is_empty() {
        return Err(IdentityStorageError::MissingFirstName);
    }

    let client = pool.get().await?;
    let inserted = client
        .timed_query_opt_cached(
            "INSERT INTO fa.identities (
                identity_key, first_name, last_name, phone, email,
                organization, is_vendor, embedding
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (phone) DO NOTHING
             RETURNING identity_key",
            &[
                &identity.identity_key,
                &identity.first_name.trim(),
                &identity.last_name,
                &identity.phone,
                &identity.email,
                &identity.organization,
                &identity.is_vendor,
                &identity.embedding,
            ],
            "insert_identity",
        )
        .await?;

    if inserted.is_none() {
        return Ok(RegisterOutcome::DuplicatePhone);
    }

    info!(has_embedding = identity.embedding.is_some(), "identity stored");
    Ok(RegisterOutcome::Registered(IdentityProfile {
        identity_key: identity.identity_key.clone(),
        display_name: identity.display_name(),
        organization: identity.organization.clone(),
        is_vendor: identity.is_vendor,
    }))
}
