// Tick source and wraparound-safe deadlines
//
// The timer ISR bumps a free-running u32 uptime counter; everything
// else only reads it. Deadlines are absolute ticks compared through
// signed differences, so the counter may overflow at any time as long
// as no single delay exceeds half the tick domain.
// Critical section guards riscv32imc (no atomic RMW).

use core::cell::Cell;

use critical_section::Mutex;

/// One unit of the wrapping time base.
pub type Tick = u32;

/// Milliseconds per tick at the default timer period.
pub const TICK_MS: u32 = 10;

/// Longest delay that still orders correctly against other pending
/// deadlines. Longer delays are accepted but may fire early.
pub const MAX_DELAY: Tick = i32::MAX as Tick;

static UPTIME_TICKS: Mutex<Cell<Tick>> = Mutex::new(Cell::new(0));

/// Absolute tick at which a pending entry becomes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Tick);

impl Deadline {
    pub const fn at(tick: Tick) -> Self {
        Self(tick)
    }

    pub const fn after(now: Tick, delay: Tick) -> Self {
        Self(now.wrapping_add(delay))
    }

    pub const fn tick(self) -> Tick {
        self.0
    }

    /// Strictly later than `other`, modulo wraparound.
    #[inline]
    pub const fn is_later_than(self, other: Deadline) -> bool {
        (self.0.wrapping_sub(other.0) as i32) > 0
    }

    /// Due at `now`: the deadline is not later than the current tick.
    #[inline]
    pub const fn is_reached(self, now: Tick) -> bool {
        (now.wrapping_sub(self.0) as i32) >= 0
    }
}

/// Source of the current tick.
pub trait Clock {
    fn now(&self) -> Tick;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Tick {
        (**self).now()
    }
}

/// Reads the process-wide uptime counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Tick {
        uptime_ticks()
    }
}

/// Hand-driven clock for host simulation and tests.
#[derive(Debug)]
pub struct ManualClock {
    ticks: Mutex<Cell<Tick>>,
}

impl ManualClock {
    pub const fn new(start: Tick) -> Self {
        Self {
            ticks: Mutex::new(Cell::new(start)),
        }
    }

    pub fn set(&self, tick: Tick) {
        critical_section::with(|cs| self.ticks.borrow(cs).set(tick));
    }

    pub fn advance(&self, ticks: Tick) {
        critical_section::with(|cs| {
            let cell = self.ticks.borrow(cs);
            cell.set(cell.get().wrapping_add(ticks));
        });
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Tick {
        critical_section::with(|cs| self.ticks.borrow(cs).get())
    }
}

// called from the timer ISR; `weight` is base ticks per interrupt
#[inline]
pub fn advance_ticks(weight: Tick) {
    critical_section::with(|cs| {
        let ticks = UPTIME_TICKS.borrow(cs);
        ticks.set(ticks.get().wrapping_add(weight));
    });
}

#[inline]
pub fn on_timer_tick() {
    advance_ticks(1);
}

pub fn uptime_ticks() -> Tick {
    critical_section::with(|cs| UPTIME_TICKS.borrow(cs).get())
}

pub fn uptime_ms() -> u32 {
    uptime_ticks().wrapping_mul(TICK_MS)
}

#[inline]
pub fn wait_for_interrupt() {
    #[cfg(target_arch = "riscv32")]
    unsafe {
        core::arch::asm!("wfi", options(nomem, nostack));
    }

    #[cfg(not(target_arch = "riscv32"))]
    {
        core::hint::spin_loop();
    }
}
