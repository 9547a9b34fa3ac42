/// Integration tests for the aggregate publish/subscribe hub.
#[path = "../src/hub.rs"]
mod hub;

#[path = "../src/models.rs"]
mod models;

use hub::AggregationHub;
use models::AggregateSnapshot;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn snap(pl: f64, n: usize) -> AggregateSnapshot {
    AggregateSnapshot {
        unrealized_pl: pl,
        open_positions: n,
        daily_pl: pl * 2.0,
        daily_target: 100.0,
    }
}

#[tokio::test]
async fn sibling_subscribers_never_diverge() {
    let hub = AggregationHub::new();
    let mut header = hub.subscribe();
    let mut sidebar = hub.subscribe();
    assert_eq!(hub.subscriber_count(), 2);

    for i in 0..10 {
        let s = snap(i as f64 * 0.5, i);
        hub.publish(s);
        let a = header.changed().await.unwrap();
        let b = sidebar.changed().await.unwrap();
        assert_eq!(a, s);
        assert_eq!(a, b);
        assert_eq!(header.current(), sidebar.current());
    }
}

#[tokio::test]
async fn late_subscriber_sees_latest_snapshot() {
    let hub = AggregationHub::new();
    hub.publish(snap(3.0, 2));
    let late = hub.subscribe();
    assert_eq!(late.current(), snap(3.0, 2));
    assert_eq!(hub.latest(), snap(3.0, 2));
}

#[tokio::test]
async fn changed_ends_when_hub_dropped() {
    let hub = AggregationHub::new();
    let mut sub = hub.subscribe();
    drop(hub);
    assert!(sub.changed().await.is_none());
    assert_eq!(sub.current(), AggregateSnapshot::default());
}

#[tokio::test]
async fn callback_subscription_receives_publishes() {
    let hub = AggregationHub::new();
    let seen: Arc<Mutex<Vec<AggregateSnapshot>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handle = hub.on_publish(move |s| sink.lock().unwrap().push(s));

    hub.publish(snap(1.25, 1));
    tokio::time::timeout(Duration::from_secs(2), async {
        while seen.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("callback never fired");
    assert_eq!(seen.lock().unwrap().last().copied(), Some(snap(1.25, 1)));

    drop(hub);
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("callback task did not stop")
        .unwrap();
}
