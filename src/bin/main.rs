// pulp-tasks demo firmware for the ESP32-C3
//
// Boot sequence: logger -> heap -> 10ms tick timer -> register tasks
// Main loop: dispatch() forever. The idle hook parks the CPU with WFI
// until the next timer interrupt, so an idle board spins once per tick.
//
// The heartbeat re-schedules itself from inside its own callback.

#![no_std]
#![no_main]

use esp_backtrace as _;
use esp_hal::clock::CpuClock;
use esp_hal::time::Duration;
use esp_hal::timer::PeriodicTimer;
use esp_hal::timer::timg::TimerGroup;
use log::{info, warn};

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};
use critical_section::Mutex;

use pulp_tasks::kernel::tick::{self, TICK_MS, Tick};
use pulp_tasks::{Callable, Context, Loopable, Scheduler, SystemClock};

extern crate alloc;

esp_bootloader_esp_idf::esp_app_desc!();

const MAX_PENDING: usize = 16;
const HEARTBEAT_TICKS: Tick = 1000 / TICK_MS; // 1 second
const IDLE_REPORT_POLLS: u32 = 6000;

static TASKS: Scheduler<'static, SystemClock> = Scheduler::with_limit(SystemClock, MAX_PENDING);

static TIMER0: Mutex<RefCell<Option<PeriodicTimer<'static, esp_hal::Blocking>>>> =
    Mutex::new(RefCell::new(None));

#[esp_hal::handler(priority = esp_hal::interrupt::Priority::Priority1)]
fn timer0_handler() {
    critical_section::with(|cs| {
        if let Some(timer) = TIMER0.borrow_ref_mut(cs).as_mut() {
            timer.clear_interrupt();
        }
    });
    tick::on_timer_tick();
}

struct Heartbeat {
    beats: AtomicU32,
}

impl Callable for Heartbeat {
    fn callback(&self, _ctx: Context) {
        let beats = self.beats.fetch_add(1, Ordering::Relaxed) + 1;
        info!("heartbeat {} at {}ms", beats, tick::uptime_ms());
        if TASKS.schedule_listener(&HEARTBEAT, HEARTBEAT_TICKS).is_err() {
            warn!("heartbeat stopped: scheduler full");
        }
    }
}

static HEARTBEAT: Heartbeat = Heartbeat {
    beats: AtomicU32::new(0),
};

// counts idle polls and sleeps until the next tick
struct IdleSleeper {
    polls: AtomicU32,
}

impl Loopable for IdleSleeper {
    fn run_loop(&self) {
        let polls = self.polls.fetch_add(1, Ordering::Relaxed) + 1;
        if polls % IDLE_REPORT_POLLS == 0 {
            info!("idle polls: {}, pending: {}", polls, TASKS.pending());
        }
        tick::wait_for_interrupt();
    }
}

static IDLE: IdleSleeper = IdleSleeper {
    polls: AtomicU32::new(0),
};

fn announce(msg: &'static str) {
    info!("{}", msg);
}

fn report_boot_ms(ms: u32) {
    info!("boot took {}ms", ms);
}

#[esp_hal::main]
fn main() -> ! {
    esp_println::logger::init_logger_from_env();
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);
    esp_alloc::heap_allocator!(size: 32 * 1024);

    info!("booting pulp-tasks {}...", pulp_tasks::VERSION);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let mut timer0 = PeriodicTimer::new(timg0.timer0);
    critical_section::with(|cs| {
        timer0.set_interrupt_handler(timer0_handler);
        if timer0.start(Duration::from_millis(TICK_MS as u64)).is_err() {
            warn!("tick timer failed to start");
        }
        timer0.listen();
        TIMER0.borrow_ref_mut(cs).replace(timer0);
    });
    info!("timer initialized.");

    TASKS.set_loop_method_instance(&IDLE);

    let registered = [
        TASKS.schedule_with(report_boot_ms, 0, tick::uptime_ms()),
        TASKS.schedule_with(announce, 250 / TICK_MS, "tasks are running"),
        TASKS.schedule_listener(&HEARTBEAT, HEARTBEAT_TICKS),
    ];
    if let Some(Err(e)) = registered.iter().find(|r| r.is_err()) {
        warn!("initial schedule failed: {}", e);
    }
    info!("kernel ready.");

    loop {
        TASKS.dispatch();
    }
}
