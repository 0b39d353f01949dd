use tokio_postgres::Row;
use tracing::instrument;

use crate::db::util::TimedClientExt;
use crate::db::PgPool;
use crate::directory::Organization;

db_error!(OrganizationStorageError {
    #[error("organization name is required")]
    MissingName,
    #[error("organization vanished during get-or-create: {0}")]
    Vanished(String),
});

fn organization_from_row(row: &Row) -> Organization {
    Organization {
        id: row.get("id"),
        name: row.get("name"),
        created_at: row.get("created_at"),
    }
}

/// get-or-create。2 つ目の値は今回作成されたかどうか
#[instrument(skip(pool))]
pub async fn ensure_organization(
    pool: &PgPool,
    name: &str,
) -> Result<(Organization, bool), OrganizationStorageError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(OrganizationStorageError::MissingName);
    }

    let client = pool.get().await?;
    if let Some(row) = client
        .timed_query_opt_cached(
            "INSERT INTO fa.organizations (name) VALUES ($1)
             ON CONFLICT (name) DO NOTHING
             RETURNING id, name, created_at",
            &[&name],
            "insert_organization",
        )
        .await?
    {
        return Ok((organization_from_row(&row), true));
    }

    let row = client
        .timed_query_opt_cached(
            "SELECT id, name, created_at FROM fa.organizations WHERE name = $1",
            &[&name],
            "fetch_organization",
        )
        .await?;

    match row {
        Some(row) => Ok((organization_from_row(&row), false)),
        None => Err(OrganizationStorageError::Vanished(name.to_string())),
    }
}

#[instrument(skip(pool))]
pub async fn list_organizations(
    pool: &PgPool,
) -> Result<Vec<Organization>, OrganizationStorageError> {
    let client = pool.get().await?;
    let rows = client
        .timed_query_cached(
            "SELECT id, name, created_at FROM fa.organizations ORDER BY name",
            &[],
            "list_organizations",
        )
        .await?;
    Ok(rows.iter().map(organization_from_row).collect())
}
