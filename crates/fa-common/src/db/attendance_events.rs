use chrono::{DateTime, Utc};
use deadpool_postgres::GenericClient;
use tokio_postgres::Row;
use tracing::instrument;

use crate::attendance::{AttendanceDay, AttendanceEvent, AttendanceState, Direction};
use crate::db::PgPool;
use crate::db::util::TimedClientExt;

db_error!(AttendanceEventStorageError {
    #[error("unknown attendance direction stored: {0}")]
    UnknownDirection(String),
});

fn parse_direction(row: Option<Row>) -> Result<Option<Direction>, AttendanceEventStorageError> {
    let Some(row) = row else {
        return Ok(None);
    };
    let raw: String = row.get("direction");
    Direction::parse(&raw)
        .map(Some)
        .ok_or(AttendanceEventStorageError::UnknownDirection(raw))
}

async fn last_direction(
    client: &impl GenericClient,
    identity_key: &str,
    day: &AttendanceDay,
) -> Result<Option<Direction>, AttendanceEventStorageError> {
    let row = client
        .timed_query_opt_cached(
            "SELECT direction
             FROM fa.attendance_events
             WHERE identity_key = $1
               AND recorded_at >= $2
               AND recorded_at < $3
             ORDER BY recorded_at DESC, id DESC
             LIMIT 1",
            &[&identity_key, &day.starts_at, &day.ends_at],
            "fetch_last_direction",
        )
        .await?;
    parse_direction(row)
}

/// `day` の [starts_at, ends_at) 内で最新の打刻の向き
#[instrument(skip(pool, day), fields(date = %day.date))]
pub async fn fetch_last_direction(
    pool: &PgPool,
    identity_key: &str,
    day: &AttendanceDay,
) -> Result<Option<Direction>, AttendanceEventStorageError> {
    let client = pool.get().await?;
    last_direction(&client, identity_key, day).await
}

/// 本日の最終打刻を反転させた打刻を 1 トランザクションで追加する。
///
/// 人物ごとの advisory lock をトランザクション終了まで保持するので、
/// 同じ人物への同時打刻は直列化され、向きが重複しない。
#[instrument(skip(pool, day), fields(date = %day.date))]
pub async fn insert_toggled_event(
    pool: &PgPool,
    identity_key: &str,
    day: &AttendanceDay,
    recorded_at: DateTime<Utc>,
) -> Result<AttendanceEvent, AttendanceEventStorageError> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    tx.timed_execute_cached(
        "SELECT pg_advisory_xact_lock(hashtext($1))",
        &[&identity_key],
        "lock_attendance_identity",
    )
    .await?;

    let last = last_direction(&tx, identity_key, day).await?;
    let direction = AttendanceState::from_last_event(last).next_direction();

    tx.timed_execute_cached(
        "INSERT INTO fa.attendance_events (identity_key, direction, recorded_at)
         VALUES ($1, $2, $3)",
        &[&identity_key, &direction.as_str(), &recorded_at],
        "insert_attendance_event",
    )
    .await?;
    tx.commit().await?;

    Ok(AttendanceEvent {
        identity_key: identity_key.to_string(),
        direction,
        recorded_at,
    })
}
