pub mod policy;
pub mod scheduler;

pub use policy::{ChargeWindow, PolicyError, SchedulePolicy};
pub use scheduler::{Scheduler, TickReport};
