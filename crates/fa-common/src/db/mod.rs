//! PostgreSQL adapters for the collaborator traits (schema `fa`).

/// Storage error enum with the `Pool` / `Postgres` variants every adapter shares,
/// plus a conversion into [`crate::directory::BackendError`].
macro_rules! db_error {
    ($name:ident { $($variants:tt)* }) => {
        #[derive(Debug, thiserror::Error)]
        pub enum $name {
            #[error("failed to get postgres connection: {0}")]
            Pool(#[from] deadpool_postgres::PoolError),
            #[error("postgres query failed: {0}")]
            Postgres(#[from] tokio_postgres::Error),
            $($variants)*
        }

        impl From<$name> for crate::directory::BackendError {
            fn from(err: $name) -> Self {
                match err {
                    $name::Pool(inner) => crate::directory::BackendError::Unavailable(inner.to_string()),
                    other => crate::directory::BackendError::Query(other.to_string()),
                }
            }
        }
    };
    ($name:ident) => {
        $crate::db::db_error!($name {});
    };
}
pub(crate) use db_error;

pub mod attendance_events;
pub mod identities;
pub mod migrations;
pub mod organizations;
pub mod pool;
pub mod repository;
pub mod util;

pub use attendance_events::{
    fetch_last_direction, insert_toggled_event, AttendanceEventStorageError,
};
pub use identities::{
    fetch_enrolled_identities, fetch_identity_profile, insert_identity, IdentityStorageError,
};
pub use migrations::{run_migrations, MigrationError};
pub use organizations::{ensure_organization, list_organizations, OrganizationStorageError};
pub use pool::{create_pool_from_url, ping, DbPoolError, PgPool, PingError};
pub use repository::PgAttendanceRepository;
