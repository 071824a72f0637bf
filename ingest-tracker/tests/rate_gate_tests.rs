//! Token-bucket admission against the shared database

mod helpers;

use helpers::*;
use std::time::Duration;

use ingest_tracker::services::{Admission, RateGate};

const START_MS: i64 = 1_700_000_000_000;

#[tokio::test]
async fn five_per_minute_then_rejected() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let gate = RateGate::new(pool, 5, Duration::from_secs(60));

    let mut remaining = Vec::new();
    for n in 0..5 {
        match gate.try_acquire_at("10.0.0.1", START_MS + n * 100).await.unwrap() {
            Admission::Allowed { remaining: left } => remaining.push(left),
            other => panic!("request {} rejected: {:?}", n, other),
        }
    }
    assert_eq!(remaining, vec![4, 3, 2, 1, 0]);

    let sixth = gate.try_acquire_at("10.0.0.1", START_MS + 1_000).await.unwrap();
    let Admission::Rejected { retry_after } = sixth else {
        panic!("sixth request admitted");
    };
    assert!(retry_after <= Duration::from_secs(60));
    assert_eq!(retry_after, Duration::from_secs(59));
}

#[tokio::test]
async fn bucket_refills_after_interval() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let gate = RateGate::new(pool, 2, Duration::from_secs(60));

    gate.try_acquire_at("client", START_MS).await.unwrap();
    gate.try_acquire_at("client", START_MS + 10).await.unwrap();
    assert!(matches!(
        gate.try_acquire_at("client", START_MS + 59_999).await.unwrap(),
        Admission::Rejected { .. }
    ));

    assert_eq!(
        gate.try_acquire_at("client", START_MS + 60_000).await.unwrap(),
        Admission::Allowed { remaining: 1 }
    );

    // Refill points stay on the original cadence
    assert_eq!(
        gate.try_acquire_at("client", START_MS + 185_000).await.unwrap(),
        Admission::Allowed { remaining: 1 }
    );
    gate.try_acquire_at("client", START_MS + 185_001).await.unwrap();
    assert_eq!(
        gate.try_acquire_at("client", START_MS + 190_000).await.unwrap(),
        Admission::Rejected {
            retry_after: Duration::from_secs(50)
        }
    );
}

#[tokio::test]
async fn identities_have_separate_buckets() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let gate = RateGate::new(pool, 1, Duration::from_secs(60));

    assert_eq!(
        gate.try_acquire_at("a", START_MS).await.unwrap(),
        Admission::Allowed { remaining: 0 }
    );
    assert_eq!(
        gate.try_acquire_at("b", START_MS).await.unwrap(),
        Admission::Allowed { remaining: 0 }
    );
    assert!(matches!(
        gate.try_acquire_at("a", START_MS + 1).await.unwrap(),
        Admission::Rejected { .. }
    ));
}

#[tokio::test]
async fn instances_share_one_budget() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let first = RateGate::new(pool.clone(), 3, Duration::from_secs(60));
    let second = RateGate::new(pool, 3, Duration::from_secs(60));

    let mut tasks = Vec::new();
    for n in 0..6 {
        let gate = if n % 2 == 0 { first.clone() } else { second.clone() };
        tasks.push(tokio::spawn(async move {
            gate.try_acquire_at("shared", START_MS + n).await.unwrap()
        }));
    }

    let mut admitted = 0;
    for task in tasks {
        if matches!(task.await.unwrap(), Admission::Allowed { .. }) {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 3);
}
