//! Tests for the shutdown channel

use super::shutdown::*;
use std::time::Duration;

#[tokio::test]
async fn test_channel_starts_not_shutdown() {
    let (_controller, signal) = shutdown_channel();
    assert!(!signal.is_shutdown());
}

#[tokio::test]
async fn test_trigger_is_visible_to_all_clones() {
    let (controller, signal) = shutdown_channel();
    let second = signal.clone();

    controller.shutdown();

    assert!(signal.is_shutdown());
    assert!(second.is_shutdown());
}

/// wait() must return once shutdown is triggered from another task
#[tokio::test]
async fn test_wait_completes_on_trigger() {
    let (controller, mut signal) = shutdown_channel();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.shutdown();
    });

    let result = tokio::time::timeout(Duration::from_secs(1), signal.wait()).await;
    assert!(result.is_ok(), "wait() should complete after trigger");
    assert!(signal.is_shutdown());
}

/// A dropped controller counts as shutdown so components never hang
#[tokio::test]
async fn test_wait_completes_when_sender_dropped() {
    let (controller, mut signal) = shutdown_channel();
    drop(controller);

    let result = tokio::time::timeout(Duration::from_secs(1), signal.wait()).await;
    assert!(result.is_ok(), "wait() should complete after sender drop");
}
