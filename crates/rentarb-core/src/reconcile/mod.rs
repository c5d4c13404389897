pub mod base_counter;
pub mod clock;
pub mod engine;
pub mod manual_extra;
pub mod scheduler;
pub mod session;

pub use base_counter::{BaseCounter, FetchOutcome, SkipReason};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{FetchTicket, ReconciliationEngine};
pub use manual_extra::manual_extra;
pub use scheduler::{Scheduler, TimerAction};
pub use session::SessionContext;
