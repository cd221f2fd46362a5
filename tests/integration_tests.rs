use std::sync::Arc;
use std::time::Duration;

use masq_engine::aggregate::bucket::Granularity;
use masq_engine::engine::EngineHandle;
use masq_engine::mirror::MirrorHandle;
use masq_engine::record::ObservationRecord;
use masq_engine::store::MemoryStore;

fn record(ts: &str, using: u64, not_using: u64, total: u64) -> ObservationRecord {
    ObservationRecord {
        observed_at: ts.parse().expect("test timestamp"),
        using_mask_count: using,
        not_using_mask_count: not_using,
        totals_series: vec![total],
    }
}

#[tokio::test]
async fn test_store_to_chart_pipeline() {
    let store = Arc::new(MemoryStore::with_records(vec![
        record("2024-03-01T09:05:00Z", 4, 1, 5),
        record("2024-03-01T09:40:00Z", 2, 2, 9),
    ]));

    let mirror = MirrorHandle::spawn(store.clone()).await.expect("mirror");
    let engine = EngineHandle::spawn(mirror.subscribe(), Granularity::Hourly);
    let mut chart_rx = engine.subscribe();

    // Initial snapshot: both readings land in the 9:00 bucket; total is the
    // newest record's cumulative value, not a sum.
    let chart = chart_rx.borrow_and_update().clone();
    assert_eq!(chart.buckets.len(), 1);
    assert_eq!(chart.buckets[0].key, "2024-3-1 9:00");
    assert_eq!(chart.buckets[0].using, 6);
    assert_eq!(chart.buckets[0].not_using, 3);
    assert_eq!(chart.buckets[0].total, 9);
    assert_eq!(chart.totals.total, "9");

    // A pushed record reaches the chart without any polling on our side.
    store.push(record("2024-03-01T10:02:00Z", 1, 0, 10));
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            chart_rx.changed().await.expect("engine alive");
            if chart_rx.borrow_and_update().buckets.len() == 2 {
                break;
            }
        }
    })
    .await
    .expect("chart never saw the pushed record");

    let chart = engine.chart_data();
    assert_eq!(chart.totals.using, "7");
    assert_eq!(chart.totals.total, "19");

    // Switching granularity re-derives from the same mirror.
    engine.set_granularity(Granularity::Monthly);
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            chart_rx.changed().await.expect("engine alive");
            if chart_rx.borrow_and_update().buckets.len() == 1 {
                break;
            }
        }
    })
    .await
    .expect("granularity change never took effect");

    let chart = engine.chart_data();
    assert_eq!(chart.buckets[0].key, "2024-3");
    assert_eq!(chart.buckets[0].using, 7);
    assert_eq!(chart.buckets[0].total, 10);

    engine.shutdown().await.expect("engine shutdown");
    mirror.shutdown().await.expect("mirror shutdown");
}

#[tokio::test]
async fn test_deletes_propagate_to_chart() {
    let store = Arc::new(MemoryStore::with_records(vec![
        record("2024-03-01T09:05:00Z", 4, 1, 5),
        record("2024-03-01T10:10:00Z", 2, 2, 9),
    ]));

    let mirror = MirrorHandle::spawn(store.clone()).await.expect("mirror");
    let engine = EngineHandle::spawn(mirror.subscribe(), Granularity::Daily);
    let mut chart_rx = engine.subscribe();

    assert_eq!(engine.chart_data().buckets[0].using, 6);

    store.remove_last();
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            chart_rx.changed().await.expect("engine alive");
            if chart_rx.borrow_and_update().buckets[0].using == 4 {
                break;
            }
        }
    })
    .await
    .expect("chart never saw the delete");

    let chart = engine.chart_data();
    assert_eq!(chart.buckets[0].key, "3/1/2024");
    assert_eq!(chart.totals.using, "4");

    engine.shutdown().await.expect("engine shutdown");
    mirror.shutdown().await.expect("mirror shutdown");
}
