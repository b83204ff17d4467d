pub mod clock;
pub mod session_timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use session_timer::{format_clock, SessionGoal, SessionTimer, TickOutcome, TimerSnapshot, TimerState};
