use chrono::{DateTime, Utc};

use crate::attendance::{AttendanceDay, AttendanceEvent, Direction};
use crate::db::{
    attendance_events, identities, migrations, organizations, pool, MigrationError, PgPool,
};
use crate::directory::{
    AttendanceHistory, BackendError, EnrolledIdentity, EnrolledIdentitySource, IdentityDirectory,
    IdentityProfile, IdentityRegistry, NewIdentity, Organization, OrganizationRegistry,
    RegisterOutcome,
};

/// Postgres 実装。全ての trait を 1 つのプールで提供する
#[derive(Clone)]
pub struct PgAttendanceRepository {
    pool: PgPool,
}

impl PgAttendanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), MigrationError> {
        migrations::run_migrations(&self.pool).await
    }

    pub async fn ping(&self) -> Result<(), BackendError> {
        pool::ping(&self.pool).await.map_err(BackendError::from)
    }
}

impl EnrolledIdentitySource for PgAttendanceRepository {
    async fn load_enrolled_identities(&self) -> Result<Vec<EnrolledIdentity>, BackendError> {
        Ok(identities::fetch_enrolled_identities(&self.pool).await?)
    }
}

impl IdentityDirectory for PgAttendanceRepository {
    async fn lookup_identity(
        &self,
        identity_key: &str,
    ) -> Result<Option<IdentityProfile>, BackendError> {
        Ok(identities::fetch_identity_profile(&self.pool, identity_key).await?)
    }
}

impl AttendanceHistory for PgAttendanceRepository {
    async fn last_event_today(
        &self,
        identity_key: &str,
        day: &AttendanceDay,
    ) -> Result<Option<Direction>, BackendError> {
        Ok(attendance_events::fetch_last_direction(&self.pool, identity_key, day).await?)
    }

    async fn record_toggled_event(
        &self,
        identity_key: &str,
        day: &AttendanceDay,
        recorded_at: DateTime<Utc>,
    ) -> Result<AttendanceEvent, BackendError> {
        Ok(
            attendance_events::insert_toggled_event(&self.pool, identity_key, day, recorded_at)
                .await?,
        )
    }
}

impl IdentityRegistry for PgAttendanceRepository {
    async fn register_identity(
        &self,
        identity: &NewIdentity,
    ) -> Result<RegisterOutcome, BackendError> {
        Ok(identities::insert_identity(&self.pool, identity).await?)
    }
}

impl OrganizationRegistry for PgAttendanceRepository {
    async fn ensure_organization(&self, name: &str) -> Result<(Organization, bool), BackendError> {
        Ok(organizations::ensure_organization(&self.pool, name).await?)
    }

    async fn list_organizations(&self) -> Result<Vec<Organization>, BackendError> {
        Ok(organizations::list_organizations(&self.pool).await?)
    }
}
