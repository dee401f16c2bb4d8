//! End-to-end pipeline runtime tests.

use bytes::Bytes;
use sluice::elements::{CollectSink, MapFilter, Queue, TestSrc};
use sluice::pipeline::Pipeline;
use sluice::schema::{Child, Group};
use sluice::Error;
use std::sync::Arc;
use std::time::Duration;

/// Opt-in log output: `RUST_LOG=debug cargo test -- --nocapture`.
fn init_logging() {
    let _ = tracing_subscriber::fmt::try_init();
}

#[tokio::test]
async fn test_empty_pipeline() {
    init_logging();
    let pipeline = Pipeline::new();

    let status = pipeline.status().await;
    assert_eq!(status.child_count, 0);
    assert_eq!(status.active_connections, 0);
    assert!(status.groups.is_empty());

    pipeline.stop().await;
}

#[tokio::test]
async fn test_linear_source_to_sink() {
    init_logging();
    let src = Arc::new(
        TestSrc::new("src")
            .with_interval(Duration::from_millis(10))
            .run_for(Duration::from_millis(100)),
    );
    let sink: Arc<CollectSink<Bytes>> = Arc::new(CollectSink::new("sink"));

    let pipeline = Pipeline::new();
    pipeline
        .build_linear(vec![Child::source(src.clone()), Child::sink(sink.clone())])
        .await
        .unwrap();

    let status = pipeline.status().await;
    assert_eq!(status.child_count, 2);
    assert_eq!(status.active_connections, 1);
    assert_eq!(status.groups, vec!["main".to_string()]);

    pipeline.wait_for_completion().await;

    let collected = sink.len();
    assert!(
        (1..=12).contains(&collected),
        "collected {collected} buffers"
    );

    pipeline.stop().await;
}

#[tokio::test]
async fn test_rebuild_replaces_schema() {
    let src = Arc::new(TestSrc::new("src").with_num_buffers(1_000_000));
    let sink: Arc<CollectSink<Bytes>> = Arc::new(CollectSink::new("sink"));

    let pipeline = Pipeline::new();
    pipeline
        .build_linear(vec![Child::source(src.clone()), Child::sink(sink.clone())])
        .await
        .unwrap();
    assert_eq!(pipeline.status().await.active_connections, 1);

    let filter: Arc<MapFilter<Bytes, Bytes>> = Arc::new(MapFilter::new("filter", |b| b));
    pipeline
        .build_linear(vec![
            Child::source(src.clone()),
            Child::filter(filter),
            Child::sink(sink.clone()),
        ])
        .await
        .unwrap();

    let status = pipeline.status().await;
    assert_eq!(status.child_count, 3);
    assert_eq!(status.active_connections, 2);

    pipeline.stop().await;
}

#[tokio::test]
async fn test_duplicate_id_fails_spec() {
    let pipeline = Pipeline::new();
    let err = pipeline
        .spec(vec![
            Group::new(
                "g1",
                vec![
                    Child::source(Arc::new(TestSrc::new("dup"))),
                    Child::sink(Arc::new(CollectSink::<Bytes>::new("s1"))),
                ],
            ),
            Group::new(
                "g2",
                vec![
                    Child::source(Arc::new(TestSrc::new("dup"))),
                    Child::sink(Arc::new(CollectSink::<Bytes>::new("s2"))),
                ],
            ),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateId(id) if id == "dup"));

    // The failed call left the pipeline unchanged.
    let status = pipeline.status().await;
    assert_eq!(status.child_count, 0);
    assert_eq!(status.active_connections, 0);
}

#[tokio::test]
async fn test_type_mismatch_rejects_edge_but_not_siblings() {
    // src (Bytes) -> u64 sink is rejected; the Bytes sibling still runs.
    let src = Arc::new(
        TestSrc::new("src")
            .with_interval(Duration::from_millis(1))
            .with_num_buffers(3),
    );
    let wrong: Arc<CollectSink<u64>> = Arc::new(CollectSink::new("wrong"));
    let right: Arc<CollectSink<Bytes>> = Arc::new(CollectSink::new("right"));

    let pipeline = Pipeline::new();
    pipeline
        .spec(vec![
            Group::new("bad", vec![Child::source(src.clone()), Child::sink(wrong.clone())]),
            Group::new("good", vec![Child::source_ref("src"), Child::sink(right.clone())]),
        ])
        .await
        .unwrap();

    assert_eq!(pipeline.status().await.active_connections, 1);
    pipeline.wait_for_completion().await;

    assert_eq!(right.len(), 3);
    assert!(wrong.is_empty());

    pipeline.stop().await;
}

#[tokio::test]
async fn test_remove_child_cancels_edges_and_notifies_source() {
    let src = Arc::new(TestSrc::new("src").with_num_buffers(1_000_000));
    let sink: Arc<CollectSink<Bytes>> = Arc::new(CollectSink::new("sink"));

    let pipeline = Pipeline::new();
    pipeline
        .build_linear(vec![Child::source(src.clone()), Child::sink(sink.clone())])
        .await
        .unwrap();
    assert_eq!(pipeline.status().await.active_connections, 1);

    pipeline.remove_child("sink").await;

    let status = pipeline.status().await;
    assert_eq!(status.active_connections, 0);
    assert_eq!(status.child_count, 1);

    let cancelled = src.cancelled_edges();
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].sink, "sink");

    pipeline.stop().await;
}

#[tokio::test]
async fn test_remove_child_drops_emptied_groups() {
    let src = Arc::new(TestSrc::new("only").with_num_buffers(1));
    let sink: Arc<CollectSink<Bytes>> = Arc::new(CollectSink::new("sink"));

    let pipeline = Pipeline::new();
    pipeline
        .spec(vec![
            Group::new("a", vec![Child::source(src)]),
            Group::new("b", vec![Child::source_ref("only"), Child::sink(sink)]),
        ])
        .await
        .unwrap();

    pipeline.remove_child("only").await;
    let status = pipeline.status().await;
    assert_eq!(status.groups, vec!["b".to_string()]);
    assert_eq!(status.child_count, 1);

    pipeline.stop().await;
}

#[tokio::test]
async fn test_queue_buffers_between_stages() {
    let src = Arc::new(
        TestSrc::new("src")
            .with_interval(Duration::from_millis(1))
            .with_num_buffers(20),
    );
    let queue: Arc<Queue<Bytes>> = Arc::new(Queue::new("q").with_capacity(32));
    let sink: Arc<CollectSink<Bytes>> = Arc::new(CollectSink::new("sink"));

    let pipeline = Pipeline::new();
    pipeline
        .build_linear(vec![
            Child::source(src),
            Child::filter(queue.clone()),
            Child::sink(sink.clone()),
        ])
        .await
        .unwrap();

    // The src->queue edge finishes once the source is exhausted; the
    // queue->sink edge drains until finish() closes the queue's output.
    tokio::time::sleep(Duration::from_millis(200)).await;
    queue.finish();
    pipeline.wait_for_completion().await;

    assert_eq!(sink.len(), 20);
    pipeline.stop().await;
}

#[tokio::test]
async fn test_map_filter_transforms_payloads() {
    let src = Arc::new(
        TestSrc::new("src")
            .with_interval(Duration::from_millis(1))
            .with_num_buffers(4),
    );
    let to_len: Arc<MapFilter<Bytes, usize>> = Arc::new(MapFilter::new("len", |b: Bytes| b.len()));
    let sink: Arc<CollectSink<usize>> = Arc::new(CollectSink::new("sink"));

    let pipeline = Pipeline::new();
    pipeline
        .build_linear(vec![
            Child::source(src),
            Child::filter(to_len.clone()),
            Child::sink(sink.clone()),
        ])
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    to_len.finish();
    pipeline.wait_for_completion().await;

    assert_eq!(sink.collected(), vec![32, 32, 32, 32]);
    pipeline.stop().await;
}

#[tokio::test]
async fn test_fan_out_via_references() {
    use sluice::elements::Tee;

    let src = Arc::new(
        TestSrc::new("src")
            .with_interval(Duration::from_millis(1))
            .with_num_buffers(5),
    );
    let tee: Arc<Tee<Bytes>> = Arc::new(Tee::new("tee"));
    let a: Arc<CollectSink<Bytes>> = Arc::new(CollectSink::new("a"));
    let b: Arc<CollectSink<Bytes>> = Arc::new(CollectSink::new("b"));

    let pipeline = Pipeline::new();
    pipeline
        .spec(vec![
            Group::new("feed", vec![Child::source(src), Child::filter(tee.clone())]),
            Group::new("left", vec![Child::filter_ref("tee"), Child::sink(a.clone())]),
            Group::new("right", vec![Child::filter_ref("tee"), Child::sink(b.clone())]),
        ])
        .await
        .unwrap();

    assert_eq!(pipeline.status().await.active_connections, 3);

    tokio::time::sleep(Duration::from_millis(100)).await;
    tee.finish();
    pipeline.wait_for_completion().await;

    assert_eq!(a.len(), 5);
    assert_eq!(b.len(), 5);
    // Both consumers observed the same emissions in order.
    assert_eq!(a.collected(), b.collected());

    pipeline.stop().await;
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let pipeline = Pipeline::new();
    pipeline
        .build_linear(vec![
            Child::source(Arc::new(TestSrc::new("src").with_num_buffers(1_000_000))),
            Child::sink(Arc::new(CollectSink::<Bytes>::new("sink"))),
        ])
        .await
        .unwrap();

    pipeline.stop().await;
    pipeline.stop().await;
    assert_eq!(pipeline.status().await.active_connections, 0);
}
