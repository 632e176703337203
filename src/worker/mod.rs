//! Worker / Scheduler (spec §4.I): a single long-running dispatcher task
//! that polls for pending jobs and drives each through phases 0-2.

pub mod dispatcher;

pub use dispatcher::{Dispatcher, ShouldStop};
