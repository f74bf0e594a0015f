// Delayed-call kernel: tick source, callbacks, scheduler
// Single core, no preemption. The caller polls Scheduler::dispatch()
// from its main loop; each poll runs at most one due callback or the
// idle hook, then returns.

pub mod callback;
pub mod scheduler;
pub mod tick;

pub use callback::{Callable, Callback, Context, IdleHook, Loopable, Param};
pub use scheduler::{ScheduleError, Scheduler};
pub use tick::{Clock, Deadline, ManualClock, SystemClock, Tick};
