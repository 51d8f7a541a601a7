pub mod scheduler;
pub mod timer;

pub use scheduler::{DeadlineScheduler, Scheduler, TimerId};
pub use timer::{HighPrecisionTimer, ManualTimer, Timer};
