mod reconciler;
mod scheduler;

pub use reconciler::{reconcile, WakeReport};
pub use scheduler::{next_wake, Wake, WakeScheduler};
