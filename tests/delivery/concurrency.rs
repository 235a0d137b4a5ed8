use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use chrono::Utc;
use docshield::nonce::{MemoryNonceBackend, NonceBackend, SqliteNonceBackend};
use docshield::{DeliveryConfig, DeliveryError, ManualClock, NonceStore};

use crate::helpers::{client, deploy, DOC_ID};

const RACERS: usize = 16;

/// Present the same nonce from `RACERS` threads released at once.
fn race_consume(store: &NonceStore, nonce: &str) -> (usize, usize) {
    let barrier = Barrier::new(RACERS);
    let wins = AtomicUsize::new(0);
    let misses = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for _ in 0..RACERS {
            s.spawn(|| {
                barrier.wait();
                match store.validate_and_consume(DOC_ID, nonce) {
                    Ok(_) => wins.fetch_add(1, Ordering::SeqCst),
                    Err(DeliveryError::NotFound) => misses.fetch_add(1, Ordering::SeqCst),
                    Err(e) => panic!("unexpected error: {e}"),
                };
            });
        }
    });
    (wins.into_inner(), misses.into_inner())
}

fn store_over(backend: Arc<dyn NonceBackend>) -> NonceStore {
    NonceStore::new(backend, Arc::new(ManualClock::new(Utc::now())))
}

#[test]
fn memory_backend_admits_exactly_one_concurrent_consumer() {
    let store = store_over(Arc::new(MemoryNonceBackend::new()));
    for _ in 0..20 {
        let minted = store.mint(DOC_ID).unwrap();
        assert_eq!(race_consume(&store, &minted.nonce), (1, RACERS - 1));
    }
}

#[test]
fn sqlite_backend_admits_exactly_one_concurrent_consumer() {
    let dir = tempfile::tempdir().unwrap();
    let db = docshield::SqliteDatabase::open(dir.path().join("race.db")).unwrap();
    let store = store_over(Arc::new(SqliteNonceBackend::new(Arc::new(db))));
    for _ in 0..20 {
        let minted = store.mint(DOC_ID).unwrap();
        assert_eq!(race_consume(&store, &minted.nonce), (1, RACERS - 1));
    }
}

#[test]
fn concurrent_page_requests_with_one_nonce_deliver_once() {
    let dir = tempfile::tempdir().unwrap();
    let d = deploy(dir.path(), DeliveryConfig::default());
    let visitor = client("198.51.100.77");
    let minted = d.delivery.mint_session(DOC_ID, &visitor).unwrap();

    let barrier = Barrier::new(8);
    let delivered = AtomicUsize::new(0);
    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                barrier.wait();
                if d
                    .delivery
                    .deliver_page(DOC_ID, &minted.nonce, 1, &visitor)
                    .is_ok()
                {
                    delivered.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });
    assert_eq!(delivered.into_inner(), 1);

    let rejected: u64 = d
        .delivery
        .audit()
        .suspicious_clients(60, 1)
        .unwrap()
        .into_iter()
        .map(|c| c.count)
        .sum();
    assert_eq!(rejected, 7);
    assert_eq!(d.delivery.audit().failed_writes(), 0);
}
