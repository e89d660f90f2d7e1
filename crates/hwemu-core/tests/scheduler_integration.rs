//! Integration tests for periodic pairs.
//!
//! Most tests drive [`Emulator::tick`] with synthetic instants so timing is
//! deterministic; one test runs the real scheduler thread.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use hwemu_core::scheduler;
use hwemu_core::{Adapter, AdapterError, AdapterHandle, DeviceLink, Emulator, InterfaceKind};

/// Adapter that records every async response with its device.
#[derive(Default)]
struct FrameSink {
    frames: Mutex<Vec<(u64, Vec<u8>)>>,
}

impl FrameSink {
    fn count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

impl Adapter for FrameSink {
    fn create(&self, link: &DeviceLink) -> Result<AdapterHandle, AdapterError> {
        Ok(AdapterHandle::new(link.index() as u64))
    }

    fn destroy(&self, _handle: AdapterHandle) {}

    fn async_receive(&self, handle: AdapterHandle, response: &[u8]) {
        self.frames
            .lock()
            .unwrap()
            .push((handle.raw(), response.to_vec()));
    }
}

fn setup(spec: &str) -> (Emulator, Arc<FrameSink>) {
    let sink = Arc::new(FrameSink::default());
    let emu = Emulator::builder()
        .adapter(InterfaceKind::Tty, Arc::clone(&sink) as Arc<dyn Adapter>)
        .build();
    let dev = emu.add_device(InterfaceKind::Tty).unwrap();
    emu.add_pair(InterfaceKind::Tty, dev, spec).unwrap();
    (emu, sink)
}

/// Ticks every `tick` plus a deterministic jitter below `max_jitter`, for
/// `span`.  Returns the offsets from `t0` of every tick and of the ticks at
/// which the pair fired.
fn run_ticks(
    emu: &Emulator,
    sink: &FrameSink,
    t0: Instant,
    tick: Duration,
    max_jitter: Duration,
    span: Duration,
) -> (Vec<Duration>, Vec<Duration>) {
    let jitter_ns = u64::try_from(max_jitter.as_nanos()).unwrap().max(1);
    let mut ticks = Vec::new();
    let mut fired_at = Vec::new();
    let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
    let mut grid = Duration::ZERO;
    while grid <= span {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        let offset = grid + Duration::from_nanos(seed % jitter_ns);

        let before = sink.count();
        emu.tick(t0 + offset);
        ticks.push(offset);
        if sink.count() > before {
            fired_at.push(offset);
        }
        grid += tick;
    }
    (ticks, fired_at)
}

#[test]
fn test_two_second_timer_fires_with_expected_response() {
    // Arrange
    let (emu, sink) = setup("timer:2s=01");
    let t0 = Instant::now();

    // Act
    let (_, fired) = run_ticks(
        &emu,
        &sink,
        t0,
        Duration::from_millis(100),
        Duration::from_nanos(1),
        Duration::from_secs(10),
    );

    // Assert: baseline at 0s, then exactly on every 2s boundary
    let secs: Vec<u64> = fired.iter().map(Duration::as_secs).collect();
    assert_eq!(secs, vec![2, 4, 6, 8, 10]);
    for pair in fired.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_secs(2));
    }
    assert!(sink
        .frames
        .lock()
        .unwrap()
        .iter()
        .all(|(handle, bytes)| *handle == 0 && bytes == &[0x01]));
}

#[test]
fn test_jittered_ticks_fire_once_per_period_window() {
    // Arrange
    let (emu, sink) = setup("timer:2s=01");
    let t0 = Instant::now();
    let tick = Duration::from_millis(100);
    let jitter = Duration::from_millis(60);

    // Act
    let (ticks, fired) = run_ticks(&emu, &sink, t0, tick, jitter, Duration::from_secs(30));

    // Assert: the first tick is the baseline, so windows are [b + 2k, b + 2k + 2)
    let baseline = ticks[0];
    let windows: Vec<u128> = fired
        .iter()
        .map(|offset| (*offset - baseline).as_millis() / 2000)
        .collect();
    let mut distinct = windows.clone();
    distinct.dedup();
    assert_eq!(windows, distinct, "two firings in one period window");
    assert!(fired.len() >= 14, "fired {} time(s)", fired.len());
    for pair in fired.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= Duration::from_secs(2), "gap {gap:?} shorter than the period");
        assert!(gap <= Duration::from_secs(2) + tick + jitter, "gap {gap:?}");
    }
}

#[test]
fn test_late_tick_does_not_shorten_the_next_gap() {
    // Arrange
    let (emu, sink) = setup("timer:2s=01");
    let t0 = Instant::now();
    let offsets_ms = [0, 2_060, 3_900, 4_000, 4_100];

    // Act
    let mut fired_ms = Vec::new();
    for ms in offsets_ms {
        let before = sink.count();
        emu.tick(t0 + Duration::from_millis(ms));
        if sink.count() > before {
            fired_ms.push(ms);
        }
    }

    // Assert: the on-time 4000ms tick is held back until 2s after 2060ms
    assert_eq!(fired_ms, vec![2_060, 4_100]);
}

#[test]
fn test_stalled_scheduler_coalesces_missed_periods() {
    // Arrange
    let (emu, sink) = setup("timer:1s=aa");
    let t0 = Instant::now();
    emu.tick(t0);

    // Act: nothing runs for 5.5 periods
    let stalled = emu.tick(t0 + Duration::from_millis(5_500));
    let same_window = emu.tick(t0 + Duration::from_millis(5_900));
    let next_grid_point = emu.tick(t0 + Duration::from_millis(6_000));
    let one_period_later = emu.tick(t0 + Duration::from_millis(6_500));

    // Assert: one firing for the stall, the next one period after it
    assert_eq!(stalled.fired, 1);
    assert_eq!(same_window.fired, 0);
    assert_eq!(next_grid_point.fired, 0);
    assert_eq!(one_period_later.fired, 1);
    assert_eq!(sink.count(), 2);
}

#[test]
fn test_busy_kind_is_skipped_without_blocking() {
    // Arrange
    let (emu, sink) = setup("timer:10ms=01");
    let t0 = Instant::now();
    emu.tick(t0);

    // Act: tick while the tty lock is held by this very thread
    let report = emu
        .registry(InterfaceKind::Tty)
        .unwrap()
        .with_device(0, |_| emu.tick(t0 + Duration::from_millis(10)))
        .unwrap();
    let retry = emu.tick(t0 + Duration::from_millis(20));

    // Assert
    assert_eq!(report.skipped, vec![InterfaceKind::Tty]);
    assert_eq!(report.fired, 0);
    assert_eq!(retry.fired, 1);
    assert_eq!(sink.count(), 1);
}

#[test]
fn test_deleted_pair_stops_firing() {
    let (emu, sink) = setup("timer:10ms=01");
    let t0 = Instant::now();
    emu.tick(t0);
    emu.tick(t0 + Duration::from_millis(10));

    emu.delete_pair(InterfaceKind::Tty, 0, 0).unwrap();
    emu.tick(t0 + Duration::from_millis(100));

    assert_eq!(sink.count(), 1);
}

#[test]
fn test_background_thread_delivers_and_stops() {
    // Arrange
    let (emu, sink) = setup("timer:10ms=01");
    let emu = Arc::new(emu);

    // Act
    let handle = scheduler::spawn(Arc::clone(&emu), Duration::from_millis(2)).unwrap();
    std::thread::sleep(Duration::from_millis(120));
    drop(handle);
    let stopped_at = sink.count();
    std::thread::sleep(Duration::from_millis(50));

    // Assert
    assert!(stopped_at >= 2, "fired {stopped_at} time(s)");
    assert_eq!(sink.count(), stopped_at);
}
