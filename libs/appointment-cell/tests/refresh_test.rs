// libs/appointment-cell/tests/refresh_test.rs
use std::sync::Arc;
use std::time::Duration;

use appointment_cell::services::refresh::RefreshCoordinator;

#[tokio::test]
async fn signal_bumps_generation_and_wakes_subscribers() {
    let coordinator = RefreshCoordinator::new();
    let mut rx = coordinator.subscribe();

    assert_eq!(coordinator.generation(), 0);

    coordinator.signal();
    coordinator.signal();

    rx.changed().await.expect("sender alive");
    assert_eq!(*rx.borrow(), 2);
}

#[tokio::test]
async fn poll_loop_ticks_while_not_suppressed() {
    let coordinator = Arc::new(RefreshCoordinator::new());
    let handle = RefreshCoordinator::spawn_poll_loop(coordinator.clone(), Duration::from_millis(10));

    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.abort();

    assert!(coordinator.generation() > 0);
}

#[tokio::test]
async fn poll_loop_skips_ticks_while_suppressed() {
    let coordinator = Arc::new(RefreshCoordinator::new());
    coordinator.set_suppressed(true);

    let handle = RefreshCoordinator::spawn_poll_loop(coordinator.clone(), Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.abort();

    assert_eq!(coordinator.generation(), 0);

    // Blur releases the flag and ticks resume.
    coordinator.set_suppressed(false);
    let handle = RefreshCoordinator::spawn_poll_loop(coordinator.clone(), Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.abort();

    assert!(coordinator.generation() > 0);
}
