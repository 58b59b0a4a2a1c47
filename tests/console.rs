mod common;

use std::future;
use std::sync::Arc;
use tokio::time::{sleep, Duration, Instant};

use blinky::console::application::{reconnect, Reconnect, RECONNECT_DELAY};
use blinky::device::logged::LoggedSession;
use blinky::device::session::DeviceSession;
use blinky::device::types::{BlinkyState, ConnectOptions};
use blinky::error::DeviceError;
use common::MockTransport;

fn logged(transport: &Arc<MockTransport>) -> LoggedSession<MockTransport> {
    LoggedSession::new(DeviceSession::new(transport.clone(), ConnectOptions::default()), "AA:BB:CC:DD:EE:FF Nordic_Blinky")
}

#[tokio::test(start_paused = true)]
async fn reconnect_waits_then_connects() {
    let transport = Arc::new(MockTransport::blinky());
    let session = logged(&transport);
    let started = Instant::now();

    let outcome = reconnect(&session, future::pending::<()>()).await;

    assert!(matches!(outcome, Reconnect::Connected));
    assert!(started.elapsed() >= Duration::from_millis(RECONNECT_DELAY));
    assert_eq!(*session.state().borrow(), BlinkyState::Ready);
}

#[tokio::test(start_paused = true)]
async fn reconnect_keeps_trying_after_failures() {
    let transport = Arc::new(MockTransport::blinky());
    // the first connect() uses up four attempts
    transport.state().connect_failures = 5;
    let session = logged(&transport);

    let outcome = reconnect(&session, future::pending::<()>()).await;

    assert!(matches!(outcome, Reconnect::Connected));
    assert_eq!(transport.state().connect_attempts, 6);
}

#[tokio::test(start_paused = true)]
async fn stop_interrupts_a_device_that_never_comes_back() {
    let transport = Arc::new(MockTransport::blinky());
    transport.state().connect_failures = u32::MAX;
    let session = logged(&transport);
    let started = Instant::now();

    let outcome = reconnect(&session, sleep(Duration::from_secs(30))).await;

    assert!(matches!(outcome, Reconnect::Stopped));
    assert!(started.elapsed() < Duration::from_secs(31));
    assert!(transport.state().connect_attempts > 4);
}

#[tokio::test(start_paused = true)]
async fn stop_interrupts_a_pending_attempt() {
    let transport = Arc::new(MockTransport::blinky());
    transport.state().connect_delay = Some(Duration::from_secs(60));
    let session = logged(&transport);
    let started = Instant::now();

    let stop_after = Duration::from_millis(RECONNECT_DELAY + 500);
    let outcome = reconnect(&session, sleep(stop_after)).await;

    assert!(matches!(outcome, Reconnect::Stopped));
    assert!(started.elapsed() >= stop_after);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(transport.state().connect_attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn unsupported_device_ends_reconnecting() {
    let transport = Arc::new(MockTransport::new(Vec::new()));
    let session = logged(&transport);

    let outcome = reconnect(&session, future::pending::<()>()).await;

    assert!(matches!(outcome, Reconnect::Failed(DeviceError::Unsupported)));
    assert_eq!(transport.state().connect_attempts, 1);
}
