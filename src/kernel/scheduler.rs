// Delayed-call scheduler for a single cooperative execution context
//
// Pending entries live in a slot arena linked by index into one list,
// ascending by deadline, FIFO among equal deadlines. The head is always
// the next entry due, so dispatch() only ever looks at the head.
//
// dispatch() detaches the head *before* invoking it; the list is free
// again while the callback runs, which is what lets a callback call
// schedule() on the same scheduler. Critical sections cover list
// splicing and hook reads only, never an invocation.

use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt;

use critical_section::Mutex;
use log::{debug, trace, warn};

use super::callback::{Callable, Callback, Context, IdleHook, Loopable, Param};
use super::tick::{Clock, Deadline, MAX_DELAY, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    /// No room for another pending entry: heap exhausted or the
    /// configured limit reached. The pending list is unchanged.
    NoMem,
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::NoMem => write!(f, "out of memory for pending entry"),
        }
    }
}

impl core::error::Error for ScheduleError {}

struct Entry<'a> {
    deadline: Deadline,
    callback: Callback<'a>,
    next: Option<usize>,
}

enum Slot<'a> {
    Occupied(Entry<'a>),
    Vacant { next_free: Option<usize> },
}

// ordered singly linked list over a slot arena
struct PendingList<'a> {
    slots: Vec<Slot<'a>>,
    head: Option<usize>,
    free: Option<usize>, // vacant slots, LIFO
    len: usize,
    limit: Option<usize>,
}

impl<'a> PendingList<'a> {
    const fn new(limit: Option<usize>) -> Self {
        Self {
            slots: Vec::new(),
            head: None,
            free: None,
            len: 0,
            limit,
        }
    }

    fn entry(&self, idx: usize) -> Option<&Entry<'a>> {
        match self.slots.get(idx) {
            Some(Slot::Occupied(entry)) => Some(entry),
            _ => None,
        }
    }

    fn entry_mut(&mut self, idx: usize) -> Option<&mut Entry<'a>> {
        match self.slots.get_mut(idx) {
            Some(Slot::Occupied(entry)) => Some(entry),
            _ => None,
        }
    }

    // claim a slot without touching the list; hands the entry back on failure
    fn alloc(&mut self, entry: Entry<'a>) -> Result<usize, Entry<'a>> {
        if self.limit.is_some_and(|limit| self.len >= limit) {
            return Err(entry);
        }

        if let Some(idx) = self.free {
            let Some(Slot::Vacant { next_free }) = self.slots.get(idx) else {
                return Err(entry);
            };
            self.free = *next_free;
            self.slots[idx] = Slot::Occupied(entry);
            return Ok(idx);
        }

        if self.slots.try_reserve(1).is_err() {
            return Err(entry);
        }
        self.slots.push(Slot::Occupied(entry));
        Ok(self.slots.len() - 1)
    }

    fn release(&mut self, idx: usize) -> Option<Entry<'a>> {
        let slot = self.slots.get_mut(idx)?;
        let vacant = Slot::Vacant {
            next_free: self.free,
        };
        match core::mem::replace(slot, vacant) {
            Slot::Occupied(entry) => {
                self.free = Some(idx);
                self.len -= 1;
                Some(entry)
            }
            other => {
                *slot = other;
                None
            }
        }
    }

    // insert before the first entry strictly later than the new one
    fn insert(&mut self, deadline: Deadline, callback: Callback<'a>) -> Result<(), ScheduleError> {
        let entry = Entry {
            deadline,
            callback,
            next: None,
        };
        let idx = self.alloc(entry).map_err(|_| ScheduleError::NoMem)?;
        self.len += 1;

        let mut prev: Option<usize> = None;
        let mut cur = self.head;
        while let Some(c) = cur {
            let Some(existing) = self.entry(c) else { break };
            if existing.deadline.is_later_than(deadline) {
                break;
            }
            prev = Some(c);
            cur = existing.next;
        }

        if let Some(new) = self.entry_mut(idx) {
            new.next = cur;
        }
        match prev.and_then(|p| self.entry_mut(p)) {
            Some(before) => before.next = Some(idx),
            None => self.head = Some(idx),
        }
        Ok(())
    }

    fn head_deadline(&self) -> Option<Deadline> {
        self.head.and_then(|h| self.entry(h)).map(|e| e.deadline)
    }

    // detach the head if due; the caller invokes it after the list is released
    fn pop_due(&mut self, now: Tick) -> Option<(Deadline, Callback<'a>)> {
        let head = self.head?;
        if !self.entry(head)?.deadline.is_reached(now) {
            return None;
        }
        let entry = self.release(head)?;
        self.head = entry.next;
        Some((entry.deadline, entry.callback))
    }
}

/// Cooperative delayed-call scheduler.
///
/// Register work with the `schedule*` family, then poll [`dispatch`]
/// from the main loop. Each poll runs at most one due entry, or the
/// idle hook when nothing is due.
///
/// All methods take `&self` so the scheduler can sit in a `static` and
/// be reached from inside a running callback.
///
/// [`dispatch`]: Scheduler::dispatch
pub struct Scheduler<'a, C> {
    clock: C,
    pending: Mutex<RefCell<PendingList<'a>>>,
    idle: Mutex<Cell<Option<IdleHook<'a>>>>,
}

impl<'a, C: Clock> Scheduler<'a, C> {
    pub const fn new(clock: C) -> Self {
        Self {
            clock,
            pending: Mutex::new(RefCell::new(PendingList::new(None))),
            idle: Mutex::new(Cell::new(None)),
        }
    }

    /// Scheduler that refuses more than `max_pending` outstanding entries.
    pub const fn with_limit(clock: C, max_pending: usize) -> Self {
        Self {
            clock,
            pending: Mutex::new(RefCell::new(PendingList::new(Some(max_pending)))),
            idle: Mutex::new(Cell::new(None)),
        }
    }

    #[inline]
    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    /// Queue `callback` to run once, `delay` ticks from now.
    ///
    /// Delays above [`MAX_DELAY`] are accepted but can misorder against
    /// other pending entries. On error nothing is queued and the
    /// callback (with any owned parameter) is dropped.
    pub fn schedule(&self, delay: Tick, callback: Callback<'a>) -> Result<(), ScheduleError> {
        if delay > MAX_DELAY {
            warn!("sched: delay {} exceeds half the tick range", delay);
        }
        let deadline = Deadline::after(self.clock.now(), delay);
        let shape = callback.shape();

        let result = critical_section::with(|cs| {
            self.pending.borrow_ref_mut(cs).insert(deadline, callback)
        });

        match result {
            Ok(()) => trace!("sched: {} due at {}", shape, deadline.tick()),
            Err(e) => warn!("sched: {} rejected: {}", shape, e),
        }
        result
    }

    pub fn schedule_fn(&self, f: fn(), delay: Tick) -> Result<(), ScheduleError> {
        self.schedule(delay, Callback::Plain(f))
    }

    /// Queue `f(value)`. Works for every shape implementing [`Param`].
    pub fn schedule_with<T: Param<'a>>(
        &self,
        f: fn(T),
        delay: Tick,
        value: T,
    ) -> Result<(), ScheduleError> {
        self.schedule(delay, T::bind(f, value))
    }

    pub fn schedule_method(
        &self,
        listener: &'a dyn Callable,
        delay: Tick,
        ctx: Context,
    ) -> Result<(), ScheduleError> {
        self.schedule(delay, Callback::Method(listener, ctx))
    }

    // method callback with a null context
    pub fn schedule_listener(
        &self,
        listener: &'a dyn Callable,
        delay: Tick,
    ) -> Result<(), ScheduleError> {
        self.schedule_method(listener, delay, Context::NULL)
    }

    pub fn set_loop_function(&self, f: fn()) {
        self.set_idle(Some(IdleHook::Function(f)));
    }

    pub fn set_loop_method_instance(&self, looper: &'a dyn Loopable) {
        self.set_idle(Some(IdleHook::Method(looper)));
    }

    pub fn clear_loop(&self) {
        self.set_idle(None);
    }

    fn set_idle(&self, hook: Option<IdleHook<'a>>) {
        critical_section::with(|cs| self.idle.borrow(cs).set(hook));
    }

    /// One poll. Runs the head entry if its deadline has been reached
    /// and returns `true`; otherwise runs the idle hook (if any) and
    /// returns `false`. Never runs more than one entry per call.
    pub fn dispatch(&self) -> bool {
        let now = self.clock.now();
        let due = critical_section::with(|cs| self.pending.borrow_ref_mut(cs).pop_due(now));

        if let Some((deadline, callback)) = due {
            debug!(
                "sched: firing {} (due {}, now {})",
                callback.shape(),
                deadline.tick(),
                now
            );
            callback.invoke();
            return true;
        }

        let hook = critical_section::with(|cs| self.idle.borrow(cs).get());
        if let Some(hook) = hook {
            hook.run();
        }
        false
    }

    pub fn pending(&self) -> usize {
        critical_section::with(|cs| self.pending.borrow_ref(cs).len)
    }

    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    /// Deadline of the entry the next successful dispatch() will run.
    pub fn next_deadline(&self) -> Option<Deadline> {
        critical_section::with(|cs| self.pending.borrow_ref(cs).head_deadline())
    }

    /// Drop every pending entry without running it.
    pub fn clear(&self) {
        let dropped = critical_section::with(|cs| {
            let mut list = self.pending.borrow_ref_mut(cs);
            let limit = list.limit;
            core::mem::replace(&mut *list, PendingList::new(limit))
        });
        // owned parameters are freed here, outside the critical section
        if dropped.len > 0 {
            debug!("sched: cleared {} pending", dropped.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::tick::ManualClock;
    use core::sync::atomic::{AtomicU32, Ordering};

    fn noop() {}

    #[test]
    fn insert_keeps_ascending_order_and_fifo_ties() {
        let mut list = PendingList::new(None);
        for tick in [30, 10, 20, 10, 40, 20] {
            list.insert(Deadline::at(tick), Callback::U32(|_| {}, tick)).unwrap();
        }

        let mut ticks = Vec::new();
        while let Some((deadline, _)) = list.pop_due(100) {
            ticks.push(deadline.tick());
        }
        assert_eq!(ticks, [10, 10, 20, 20, 30, 40]);
        assert_eq!(list.len, 0);
        assert!(list.head.is_none());
    }

    #[test]
    fn equal_deadlines_keep_arrival_order() {
        let mut list = PendingList::new(None);
        list.insert(Deadline::at(5), Callback::U8(|_| {}, 1)).unwrap();
        list.insert(Deadline::at(5), Callback::U8(|_| {}, 2)).unwrap();
        list.insert(Deadline::at(5), Callback::U8(|_| {}, 3)).unwrap();

        let mut seen = Vec::new();
        while let Some((_, cb)) = list.pop_due(5) {
            if let Callback::U8(_, v) = cb {
                seen.push(v);
            }
        }
        assert_eq!(seen, [1, 2, 3]);
    }

    #[test]
    fn pop_due_respects_deadline() {
        let mut list = PendingList::new(None);
        list.insert(Deadline::at(50), Callback::Plain(noop)).unwrap();

        assert!(list.pop_due(49).is_none());
        assert_eq!(list.len, 1);
        assert!(list.pop_due(50).is_some());
        assert!(list.pop_due(50).is_none());
    }

    #[test]
    fn released_slots_are_reused() {
        let mut list = PendingList::new(None);
        list.insert(Deadline::at(1), Callback::Plain(noop)).unwrap();
        list.insert(Deadline::at(2), Callback::Plain(noop)).unwrap();
        assert!(list.pop_due(1).is_some());

        list.insert(Deadline::at(3), Callback::Plain(noop)).unwrap();
        assert_eq!(list.slots.len(), 2);
        assert_eq!(list.len, 2);
        assert_eq!(list.head_deadline(), Some(Deadline::at(2)));
    }

    #[test]
    fn limit_rejects_without_touching_the_list() {
        let mut list = PendingList::new(Some(2));
        list.insert(Deadline::at(10), Callback::Plain(noop)).unwrap();
        list.insert(Deadline::at(20), Callback::Plain(noop)).unwrap();

        let err = list.insert(Deadline::at(5), Callback::Plain(noop));
        assert_eq!(err, Err(ScheduleError::NoMem));
        assert_eq!(list.len, 2);
        assert_eq!(list.head_deadline(), Some(Deadline::at(10)));
    }

    #[test]
    fn insert_orders_across_wraparound() {
        let mut list = PendingList::new(None);
        // scheduled just after the wrap, then just before it
        list.insert(Deadline::after(u32::MAX - 2, 10), Callback::Plain(noop)).unwrap();
        list.insert(Deadline::after(u32::MAX - 2, 1), Callback::Plain(noop)).unwrap();

        assert_eq!(list.head_deadline(), Some(Deadline::at(u32::MAX - 1)));
        assert!(list.pop_due(u32::MAX - 1).is_some());
        assert!(list.pop_due(u32::MAX).is_none());
        assert!(list.pop_due(7).is_some());
    }

    #[test]
    fn clear_keeps_the_limit() {
        let sched = Scheduler::with_limit(ManualClock::new(0), 1);
        sched.schedule_fn(noop, 5).unwrap();
        assert_eq!(sched.schedule_fn(noop, 5), Err(ScheduleError::NoMem));

        sched.clear();
        assert!(sched.is_empty());
        assert!(sched.schedule_fn(noop, 5).is_ok());
        assert_eq!(sched.schedule_fn(noop, 5), Err(ScheduleError::NoMem));
    }

    #[test]
    fn error_displays() {
        assert_eq!(
            ScheduleError::NoMem.to_string(),
            "out of memory for pending entry"
        );
    }

    #[test]
    fn next_deadline_tracks_head() {
        static HITS: AtomicU32 = AtomicU32::new(0);
        fn hit() {
            HITS.fetch_add(1, Ordering::Relaxed);
        }

        let clock = ManualClock::new(1000);
        let sched = Scheduler::new(&clock);
        assert_eq!(sched.next_deadline(), None);

        sched.schedule_fn(hit, 30).unwrap();
        sched.schedule_fn(hit, 10).unwrap();
        assert_eq!(sched.next_deadline(), Some(Deadline::at(1010)));
        assert_eq!(sched.now(), 1000);

        clock.advance(10);
        assert!(sched.dispatch());
        assert_eq!(sched.next_deadline(), Some(Deadline::at(1030)));
        assert_eq!(HITS.load(Ordering::Relaxed), 1);
    }
}
