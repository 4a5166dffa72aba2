//! Types shared between the database and API models.

pub mod clock;
pub mod day;
pub mod window;

pub use clock::{Clock, FixedClock, SystemClock};
pub use day::VotingDay;
pub use window::{VotingStatus, VotingWindow, DEFAULT_UTC_OFFSET_MINUTES};
