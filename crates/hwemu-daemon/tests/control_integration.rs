//! Integration tests for the control server and client over loopback TCP.
//!
//! # Purpose
//!
//! These tests start a real [`ControlServer`] on `127.0.0.1:0` and talk to it
//! with [`ControlClient`], the same way `hwemu-ctl` does.  They verify:
//!
//! - A full device/pair session over one connection.
//! - Error replies keep the connection usable.
//! - Over-long command lines are rejected without dropping the connection.
//! - Several connections share the same emulator state.
//! - Periodic pairs keep firing through the scheduler while commands run.
//! - The accept loop stops once the shutdown flag is cleared.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;

use hwemu_core::{scheduler, Emulator, InterfaceKind, TraceOptions};
use hwemu_daemon::application::control::{Reply, MAX_LINE};
use hwemu_daemon::application::provision::{provision, DeviceSpec};
use hwemu_daemon::infrastructure::adapters::channel_emulator;
use hwemu_daemon::infrastructure::client::{send_command, ControlClient};
use hwemu_daemon::infrastructure::control_server::ControlServer;

struct Harness {
    addr: String,
    emulator: Arc<Emulator>,
    running: Arc<AtomicBool>,
    server: JoinHandle<()>,
}

async fn start(emulator: Emulator) -> Harness {
    let emulator = Arc::new(emulator);
    let server = ControlServer::bind("127.0.0.1:0", Arc::clone(&emulator))
        .await
        .expect("bind");
    let addr = server.local_addr().expect("local addr").to_string();
    let running = Arc::new(AtomicBool::new(true));
    let server = tokio::spawn(server.serve(Arc::clone(&running)));
    Harness {
        addr,
        emulator,
        running,
        server,
    }
}

fn ok(value: &str) -> Reply {
    Reply::Ok(Some(value.to_string()))
}

// ── Sessions ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_device_and_pair_session_over_tcp() {
    // Arrange
    let (emu, _frames) = channel_emulator(TraceOptions::default(), 16);
    let h = start(emu).await;
    let mut client = ControlClient::connect(&h.addr).await.expect("connect");

    // Act / Assert
    assert_eq!(client.send("add-device tty").await.unwrap(), ok("0"));
    assert_eq!(
        client.send("add-pair tty tty0 deadbeef=cafe").await.unwrap(),
        ok("0")
    );
    assert_eq!(client.send("transfer tty 0 deadbeef").await.unwrap(), ok("cafe"));
    assert_eq!(client.send("transfer tty 0 00").await.unwrap(), Reply::Ok(None));
    assert_eq!(client.send("get-pair tty 0 0").await.unwrap(), ok("deadbeef=cafe"));
    assert_eq!(client.send("delete-device tty 0").await.unwrap(), Reply::Ok(None));
    assert_eq!(client.send("list tty").await.unwrap(), Reply::Ok(None));
}

#[tokio::test]
async fn test_error_reply_keeps_connection_open() {
    let (emu, _frames) = channel_emulator(TraceOptions::default(), 16);
    let h = start(emu).await;
    let mut client = ControlClient::connect(&h.addr).await.expect("connect");

    let bad = client.send("add-pair tty 0 01=02").await.unwrap();
    let unknown = client.send("reboot").await.unwrap();
    let good = client.send("add-device i2c").await.unwrap();

    assert_eq!(
        bad,
        Reply::Err {
            code: 2,
            message: "tty0 not found".to_string()
        }
    );
    assert!(matches!(unknown, Reply::Err { code: 22, .. }));
    assert_eq!(good, ok("0"));
}

#[tokio::test]
async fn test_overlong_line_is_rejected_and_connection_recovers() {
    // Arrange
    let (emu, _frames) = channel_emulator(TraceOptions::default(), 16);
    let h = start(emu).await;
    let mut client = ControlClient::connect(&h.addr).await.expect("connect");
    let huge = format!("transfer tty 0 {}", "ab".repeat(MAX_LINE));

    // Act
    let rejected = client.send(&huge).await.unwrap();
    let next = client.send("add-device tty").await.unwrap();

    // Assert
    assert_eq!(
        rejected,
        Reply::Err {
            code: 22,
            message: format!("line too long (max {MAX_LINE} bytes)")
        }
    );
    assert_eq!(next, ok("0"));
}

#[tokio::test]
async fn test_full_size_transfer_line_is_accepted() {
    let (emu, _frames) = channel_emulator(TraceOptions::default(), 16);
    let h = start(emu).await;
    let mut client = ControlClient::connect(&h.addr).await.expect("connect");
    let request = "ab".repeat(hwemu_core::MAX_REQUEST);
    let response = "cd".repeat(hwemu_core::MAX_RESPONSE);
    client.send("add-device tty").await.unwrap();

    let added = client
        .send(&format!("add-pair tty tty0 {request}={response}"))
        .await
        .unwrap();
    let reply = client.send(&format!("transfer tty tty0 {request}")).await.unwrap();

    assert_eq!(added, ok("0"));
    assert_eq!(reply, ok(&response));
}

#[tokio::test]
async fn test_connections_share_emulator_state() {
    let (emu, _frames) = channel_emulator(TraceOptions::default(), 16);
    let h = start(emu).await;

    send_command(&h.addr, "add-device spi").await.unwrap();
    send_command(&h.addr, "add-device spi").await.unwrap();
    send_command(&h.addr, "add-pair spi spi1 aa=bb").await.unwrap();

    assert_eq!(send_command(&h.addr, "list spi").await.unwrap(), ok("spi0 spi1"));
    assert_eq!(send_command(&h.addr, "count spi 1").await.unwrap(), ok("1"));
    assert_eq!(h.emulator.pair_count(InterfaceKind::Spi, 1), Ok(1));
}

#[tokio::test]
async fn test_provisioned_devices_are_visible() {
    // Arrange
    let (emu, _frames) = channel_emulator(TraceOptions::default(), 16);
    provision(
        &emu,
        &[DeviceSpec {
            kind: InterfaceKind::Net,
            pairs: vec!["0800=0801".to_string(), "timer:1h=ff".to_string()],
        }],
    )
    .expect("provision");
    let h = start(emu).await;

    // Act
    let pairs = send_command(&h.addr, "pairs NET net0").await.unwrap();

    // Assert
    assert_eq!(pairs, ok("0:0800=0801 1:timer:1h=ff"));
}

// ── Scheduler alongside the server ────────────────────────────────────────────

#[tokio::test]
async fn test_periodic_frames_arrive_while_serving() {
    // Arrange
    let (emu, mut frames) = channel_emulator(TraceOptions::default(), 64);
    let h = start(emu).await;
    send_command(&h.addr, "add-device i2c").await.unwrap();
    send_command(&h.addr, "add-pair i2c 0 timer:20ms=5a").await.unwrap();
    let sched = scheduler::spawn(Arc::clone(&h.emulator), Duration::from_millis(5)).unwrap();

    // Act
    let frame = timeout(Duration::from_secs(2), frames.recv())
        .await
        .expect("frame within 2s")
        .expect("channel open");
    sched.shutdown();

    // Assert
    assert_eq!(frame.kind, InterfaceKind::I2c);
    assert_eq!(frame.index, 0);
    assert_eq!(frame.bytes, vec![0x5A]);
}

// ── Shutdown ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_accept_loop_stops_when_flag_cleared() {
    let (emu, _frames) = channel_emulator(TraceOptions::default(), 16);
    let h = start(emu).await;

    h.running.store(false, Ordering::Relaxed);
    let finished = timeout(Duration::from_secs(2), h.server).await;

    assert!(finished.is_ok(), "accept loop did not stop");
}

#[tokio::test]
async fn test_connect_to_closed_port_fails() {
    // Bind then drop a listener to get a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let result = send_command(&addr, "list tty").await;

    assert!(result.is_err());
}
