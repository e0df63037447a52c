//! Schedule evaluation: loads the schedule document, decides which program
//! should be on air and publishes that declaration on the signal bus.

pub mod config;
pub mod evaluator;
pub mod model;
pub mod service;
pub mod store;
pub mod timing;
pub mod watcher;

pub use config::{DefaultSource, SchedulerConfig};
pub use evaluator::evaluate;
pub use model::{Behavior, General, Recurrence, Schedule, ScheduledProgram, Source, Timing};
pub use service::Scheduler;
pub use store::{CommitError, ScheduleStore, StoreError};
pub use timing::{ActiveMatch, UpcomingStart, Window, find_active_program, find_next_program_after};
pub use watcher::{FileWatch, ScheduleFileChanged, WatchError};
