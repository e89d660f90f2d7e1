//! Background thread that fires periodic pairs.
//!
//! The scheduler wakes on a fixed tick grid (`start + n * tick`), runs
//! [`Emulator::tick`] and goes back to sleep until the next boundary.  It
//! never blocks on a registry lock: a busy kind is skipped for that tick.
//!
//! # Lifecycle (for beginners)
//!
//! [`spawn`] starts the thread and returns a [`SchedulerHandle`].  The thread
//! runs until the handle's [`shutdown`](SchedulerHandle::shutdown) is called
//! or the handle is dropped; both stop the loop and join the thread.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::emulator::Emulator;

/// Default tick period.
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// Shortest tick period accepted; smaller values are raised to this.
pub const MIN_TICK: Duration = Duration::from_millis(1);

/// Owns the scheduler thread.
#[derive(Debug)]
pub struct SchedulerHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    tick: Duration,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Tick period in effect.
    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Stops the loop and waits for the thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            if thread.join().is_err() {
                error!("scheduler thread panicked");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Starts the scheduler thread over `emulator` with the given tick period.
///
/// # Errors
///
/// Returns the OS error if the thread cannot be spawned.
pub fn spawn(emulator: Arc<Emulator>, tick: Duration) -> io::Result<SchedulerHandle> {
    let tick = tick.max(MIN_TICK);
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);

    let thread = thread::Builder::new()
        .name("hwemu-async".to_string())
        .spawn(move || run(&emulator, tick, &flag))?;

    info!("async scheduler started, tick {} ms", tick.as_millis());
    Ok(SchedulerHandle {
        running,
        thread: Some(thread),
        tick,
    })
}

fn run(emulator: &Emulator, tick: Duration, running: &AtomicBool) {
    let start = Instant::now();
    let mut next = start + tick;

    while running.load(Ordering::Acquire) {
        let now = Instant::now();
        if now < next {
            // Woken early by shutdown or spuriously; the loop re-checks both.
            thread::park_timeout(next - now);
            continue;
        }

        let report = emulator.tick(now);
        if report.fired > 0 || !report.skipped.is_empty() {
            debug!(
                "tick: {} response(s) fired, {} kind(s) skipped",
                report.fired,
                report.skipped.len()
            );
        }
        next = next_boundary(start, tick, Instant::now());
    }
    debug!("async scheduler stopped");
}

/// First grid point `start + n * tick` strictly after `now`.
fn next_boundary(start: Instant, tick: Duration, now: Instant) -> Instant {
    let elapsed = now.saturating_duration_since(start).as_nanos();
    let step = tick.as_nanos().max(1);
    let n = elapsed / step + 1;
    u64::try_from(n * step)
        .map(|nanos| start + Duration::from_nanos(nanos))
        .unwrap_or(now + tick)
}
