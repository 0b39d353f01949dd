use chrono::{DateTime, Utc};
use fa_common::attendance::{AttendanceDay, AttendanceEvent, Direction, InMemoryAttendanceLog};
use fa_common::db::PgAttendanceRepository;
use fa_common::{
    AttendanceHistory, BackendError, EnrolledIdentity, EnrolledIdentitySource, IdentityDirectory,
    IdentityProfile, IdentityRegistry, NewIdentity, Organization, OrganizationRegistry,
    RegisterOutcome,
};

/// 起動時に選ばれる永続化先。`DATABASE_URL` が無ければメモリ
pub enum AttendanceBackend {
    Postgres(PgAttendanceRepository),
    Memory(InMemoryAttendanceLog),
}

impl AttendanceBackend {
    pub fn kind(&self) -> &'static str {
        match self {
            AttendanceBackend::Postgres(_) => "postgres",
            AttendanceBackend::Memory(_) => "memory",
        }
    }

    pub async fn ping(&self) -> Result<(), BackendError> {
        match self {
            AttendanceBackend::Postgres(repo) => repo.ping().await,
            AttendanceBackend::Memory(_) => Ok(()),
        }
    }
}

impl EnrolledIdentitySource for AttendanceBackend {
    async fn load_enrolled_identities(&self) -> Result<Vec<EnrolledIdentity>, BackendError> {
        match self {
            AttendanceBackend::Postgres(repo) => repo.load_enrolled_identities().await,
            AttendanceBackend::Memory(log) => log.load_enrolled_identities().await,
        }
    }
}

impl IdentityDirectory for AttendanceBackend {
    async fn lookup_identity(
        &self,
        identity_key: &str,
    ) -> Result<Option<IdentityProfile>, BackendError> {
        match self {
            AttendanceBackend::Postgres(repo) => repo.lookup_identity(identity_key).await,
            AttendanceBackend::Memory(log) => log.lookup_identity(identity_key).await,
        }
    }
}

impl AttendanceHistory for AttendanceBackend {
    async fn last_event_today(
        &self,
        identity_key: &str,
        day: &AttendanceDay,
    ) -> Result<Option<Direction>, BackendError> {
        match self {
            AttendanceBackend::Postgres(repo) => repo.last_event_today(identity_key, day).await,
            AttendanceBackend::Memory(log) => log.last_event_today(identity_key, day).await,
        }
    }

    async fn record_toggled_event(
        &self,
        identity_key: &str,
        day: &AttendanceDay,
        recorded_at: DateTime<Utc>,
    ) -> Result<AttendanceEvent, BackendError> {
        match self {
            AttendanceBackend::Postgres(repo) => {
                repo.record_toggled_event(identity_key, day, recorded_at)
                    .await
            }
            AttendanceBackend::Memory(log) => {
                log.record_toggled_event(identity_key, day, recorded_at)
                    .await
            }
        }
    }
}

impl IdentityRegistry for AttendanceBackend {
    async fn register_identity(
        &self,
        identity: &NewIdentity,
    ) -> Result<RegisterOutcome, BackendError> {
        match self {
            AttendanceBackend::Postgres(repo) => repo.register_identity(identity).await,
            AttendanceBackend::Memory(log) => log.register_identity(identity).await,
        }
    }
}

impl OrganizationRegistry for AttendanceBackend {
    async fn ensure_organization(&self, name: &str) -> Result<(Organization, bool), BackendError> {
        match self {
            AttendanceBackend::Postgres(repo) => repo.ensure_organization(name).await,
            AttendanceBackend::Memory(log) => log.ensure_organization(name).await,
        }
    }

    async fn list_organizations(&self) -> Result<Vec<Organization>, BackendError> {
        match self {
            AttendanceBackend::Postgres(repo) => repo.list_organizations().await,
            AttendanceBackend::Memory(log) => log.list_organizations().await,
        }
    }
}
