pub mod api;
pub mod attendance;
pub mod db;
pub mod directory;
pub mod embedding;
pub mod logging;
pub mod matching;
pub mod run_id;
pub mod timezone;

pub use directory::{
    AttendanceHistory, BackendError, EnrolledIdentity, EnrolledIdentitySource, IdentityDirectory,
    IdentityProfile, IdentityRegistry, NewIdentity, Organization, OrganizationRegistry,
    RegisterOutcome,
};
