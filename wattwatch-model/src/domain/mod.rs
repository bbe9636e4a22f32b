mod event;
mod report;

pub use event::{Item, UsageEvent};
pub use report::{Meter, UsageIntervalRow, UsageReport};
