use std::time::Duration;

use chrono::Duration as ChronoDuration;
use docshield::DeliveryConfig;

use crate::helpers::{client, deploy, DOC_ID};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn background_sweep_expires_old_nonces() {
    let dir = tempfile::tempdir().unwrap();
    let d = deploy(dir.path(), DeliveryConfig::default());
    let visitor = client("192.0.2.50");

    let stale = d.delivery.mint_session(DOC_ID, &visitor).unwrap();
    d.clock.advance(ChronoDuration::days(8));
    let fresh = d.delivery.mint_session(DOC_ID, &visitor).unwrap();

    let handle = d.delivery.maintenance().spawn(Duration::from_millis(20));
    let mut swept = false;
    for _ in 0..100 {
        if d.delivery.nonces().peek(&stale.nonce).unwrap().is_none() {
            swept = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    handle.shutdown().await;

    assert!(swept, "stale nonce was never swept");
    assert!(d.delivery.nonces().peek(&fresh.nonce).unwrap().is_some());
    // A swept nonce is simply unknown.
    assert!(d
        .delivery
        .open_document(DOC_ID, &stale.nonce, &visitor)
        .is_err());
}

#[tokio::test]
async fn dropping_the_handle_stops_the_task() {
    let dir = tempfile::tempdir().unwrap();
    let d = deploy(dir.path(), DeliveryConfig::default());
    let handle = d.delivery.maintenance().spawn(Duration::from_millis(5));
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(handle);

    let report = d.delivery.maintenance().run_once().unwrap();
    assert_eq!(report.nonces_deleted, 0);
}
