pub mod clock;
pub mod coordinator;
pub mod ledger;
pub mod memory;

pub use clock::{Clock, FixedClock, SystemClock};
pub use coordinator::{
    AttendanceCoordinator, RecognitionError, RecognitionMode, RecognitionOutcome,
    RecognizedAttendance,
};
pub use ledger::{AttendanceDay, AttendanceEvent, AttendanceLedger, AttendanceState, Direction};
pub use memory::InMemoryAttendanceLog;
