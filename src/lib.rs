// pulp-tasks: cooperative delayed-call scheduler for single-context firmware

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod kernel;

pub use kernel::{
    Callable, Callback, Clock, Context, Deadline, Loopable, ManualClock, ScheduleError, Scheduler,
    SystemClock, Tick,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
