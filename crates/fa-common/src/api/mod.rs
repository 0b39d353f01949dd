pub mod attendance;
pub mod enrollment;
pub mod lookalike;
pub mod organization;

pub use attendance::{MarkAttendanceRequest, MarkAttendanceResponse, RecognizedEntry};
pub use enrollment::{is_vendor, EnrollIdentityRequest, EnrollIdentityResponse};
pub use lookalike::{LookalikeMatch, LookalikeRequest, LookalikeResponse};
pub use organization::{
    CreateOrganizationRequest, OrganizationListResponse, OrganizationResponse,
};
