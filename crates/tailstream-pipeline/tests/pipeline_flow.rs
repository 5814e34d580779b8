//! End-to-end pipeline tests: epoch ordering through fan-out and
//! reorder, recovery replay equivalence, and worker failure policies.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use tailstream_core::{
    EpochBatch, EpochId, EventLogStore, MutationEvent, RawMutation, StoreError, TaggedResult,
};
use tailstream_pipeline::{
    BulkPublisher, Enrichment, EnrichmentError, FailurePolicy, Pipeline, PipelineConfig,
    PipelineError, PublishError, SequencedBatch, SinkTaskHandle,
};

/// Opt-in log output for debugging: `RUST_LOG=trace cargo test`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn raw(inode_id: i64, epoch: EpochId) -> RawMutation {
    RawMutation {
        inode_id,
        op_code: 0,
        epoch,
        created_at_ms: inode_id,
        arrived_at_ms: inode_id,
    }
}

/// Enrichment that sleeps a fixed delay (to skew completion order) and
/// echoes the batch's inode ids.
struct SleepyEnricher {
    delay: Duration,
}

#[async_trait::async_trait]
impl Enrichment for SleepyEnricher {
    type Payload = Vec<i64>;

    async fn enrich(&mut self, batch: &SequencedBatch) -> Result<Vec<i64>, EnrichmentError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(batch.events.iter().map(|e| e.inode_id).collect())
    }
}

/// Enrichment that fails whenever the batch contains a given inode.
struct FailOnInode {
    poison: i64,
}

#[async_trait::async_trait]
impl Enrichment for FailOnInode {
    type Payload = Vec<i64>;

    async fn enrich(&mut self, batch: &SequencedBatch) -> Result<Vec<i64>, EnrichmentError> {
        if batch.events.iter().any(|e| e.inode_id == self.poison) {
            return Err(EnrichmentError(format!("poisoned inode {}", self.poison)));
        }
        Ok(batch.events.iter().map(|e| e.inode_id).collect())
    }
}

struct FixedStore {
    epochs: Vec<EpochBatch>,
}

#[async_trait::async_trait]
impl EventLogStore for FixedStore {
    async fn pending_by_epoch(&self) -> Result<Vec<EpochBatch>, StoreError> {
        Ok(self.epochs.clone())
    }
}

/// Collects released results until `expected_events` inode ids have
/// flowed out, checking sequence contiguity along the way.
async fn collect_released(
    rx: &mut mpsc::UnboundedReceiver<TaggedResult<Vec<i64>>>,
    expected_events: usize,
) -> Vec<i64> {
    let mut inodes = Vec::with_capacity(expected_events);
    let mut next_seq = 1u64;
    tokio::time::timeout(Duration::from_secs(10), async {
        while inodes.len() < expected_events {
            let result = rx.recv().await.expect("sink closed early");
            assert_eq!(result.seq, next_seq, "release out of order");
            next_seq += 1;
            inodes.extend(result.payload);
        }
    })
    .await
    .expect("timed out waiting for releases");
    inodes
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_strict_order_survives_worker_skew() {
    init_tracing();
    let config = PipelineConfig {
        batch_size: 4,
        batch_window: Duration::from_millis(20),
        ..PipelineConfig::default()
    };
    // Deliberately skewed latencies so completion order differs from
    // dispatch order.
    let enrichers: Vec<Box<dyn Enrichment<Payload = Vec<i64>>>> = vec![
        Box::new(SleepyEnricher {
            delay: Duration::from_millis(15),
        }),
        Box::new(SleepyEnricher {
            delay: Duration::from_millis(1),
        }),
        Box::new(SleepyEnricher {
            delay: Duration::from_millis(5),
        }),
    ];

    let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
    let mut pipeline = Pipeline::start(config, enrichers, sink_tx, None)
        .await
        .unwrap();
    let orderer = pipeline.orderer();

    // Six epochs, events observed in scrambled order inside each.
    let mut expected = Vec::new();
    let mut total = 0usize;
    for epoch in 1..=6u64 {
        let base = epoch as i64 * 100;
        for inode in [base + 3, base + 1, base + 4, base + 2] {
            orderer.observe(raw(inode, epoch));
        }
        // A malformed row: dropped, never occupies a sequence number.
        orderer.observe(RawMutation {
            op_code: 77,
            ..raw(base + 9, epoch)
        });
        orderer.on_barrier().await.unwrap();

        expected.extend([base + 1, base + 2, base + 3, base + 4]);
        total += 4;
    }

    let inodes = collect_released(&mut sink_rx, total).await;
    assert_eq!(inodes, expected);

    let metrics = pipeline.metrics();
    assert_eq!(metrics.events, total as u64);
    assert_eq!(metrics.worker_failures, 0);

    pipeline.shutdown().await;
    assert!(matches!(pipeline.fault().await, None));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_recovery_replay_matches_live_delivery() {
    let epoch1 = vec![raw(12, 1), raw(11, 1), raw(13, 1)];
    let epoch2 = vec![raw(22, 2), raw(21, 2)];
    let epoch3 = vec![raw(31, 3), raw(33, 3), raw(32, 3)];

    let config = PipelineConfig {
        batch_size: 3,
        batch_window: Duration::from_millis(10),
        ..PipelineConfig::default()
    };
    let make_enrichers = || -> Vec<Box<dyn Enrichment<Payload = Vec<i64>>>> {
        vec![
            Box::new(SleepyEnricher {
                delay: Duration::ZERO,
            }),
            Box::new(SleepyEnricher {
                delay: Duration::from_millis(3),
            }),
        ]
    };

    // Run 1: epochs 1 and 2 replayed from the persisted log, epoch 3
    // delivered live afterwards.
    let store = FixedStore {
        epochs: vec![
            EpochBatch {
                epoch: 1,
                rows: epoch1.clone(),
            },
            EpochBatch {
                epoch: 2,
                rows: epoch2.clone(),
            },
        ],
    };
    let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
    let mut recovered = Pipeline::start(config.clone(), make_enrichers(), sink_tx, Some(&store))
        .await
        .unwrap();
    let orderer = recovered.orderer();
    for &r in &epoch3 {
        orderer.observe(r);
    }
    orderer.on_barrier().await.unwrap();
    let recovered_out = collect_released(&mut sink_rx, 8).await;
    recovered.shutdown().await;

    // Run 2: all three epochs delivered live.
    let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
    let mut live = Pipeline::start(config, make_enrichers(), sink_tx, None)
        .await
        .unwrap();
    let orderer = live.orderer();
    for rows in [&epoch1, &epoch2, &epoch3] {
        for &r in rows {
            orderer.observe(r);
        }
        orderer.on_barrier().await.unwrap();
    }
    let live_out = collect_released(&mut sink_rx, 8).await;
    live.shutdown().await;

    assert_eq!(recovered_out, live_out);
    assert_eq!(live_out, vec![11, 12, 13, 21, 22, 31, 32, 33]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_recovery_failure_aborts_startup() {
    let store = FixedStore {
        epochs: vec![
            EpochBatch {
                epoch: 9,
                rows: vec![raw(1, 9)],
            },
            EpochBatch {
                epoch: 8,
                rows: vec![raw(2, 8)],
            },
        ],
    };
    let enrichers: Vec<Box<dyn Enrichment<Payload = Vec<i64>>>> = vec![Box::new(SleepyEnricher {
        delay: Duration::ZERO,
    })];
    let (sink_tx, _sink_rx) = mpsc::unbounded_channel();

    match Pipeline::start(PipelineConfig::default(), enrichers, sink_tx, Some(&store)).await {
        Err(PipelineError::Recovery(_)) => {}
        other => panic!("expected recovery failure, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fatal_worker_failure_halts_with_gap() {
    let config = PipelineConfig {
        batch_size: 1,
        batch_window: Duration::from_millis(5),
        failure_policy: FailurePolicy::Fatal,
        ..PipelineConfig::default()
    };
    let enrichers: Vec<Box<dyn Enrichment<Payload = Vec<i64>>>> = vec![
        Box::new(FailOnInode { poison: 42 }),
        Box::new(FailOnInode { poison: 42 }),
    ];

    let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
    let mut pipeline = Pipeline::start(config, enrichers, sink_tx, None)
        .await
        .unwrap();
    let orderer = pipeline.orderer();

    // One event per epoch, batch_size 1: sequence n carries inode n's
    // event. Inode 42 is batch 3.
    for (epoch, inode) in [(1, 1), (2, 2), (3, 42), (4, 4), (5, 5)] {
        orderer.observe(raw(inode, epoch));
        orderer.on_barrier().await.unwrap();
    }

    let fault = tokio::time::timeout(Duration::from_secs(10), pipeline.fault())
        .await
        .expect("no fault surfaced")
        .expect("workers exited without fault");
    match fault {
        PipelineError::Worker { seq, .. } => assert_eq!(seq, 3),
        other => panic!("expected worker failure, got {other:?}"),
    }

    pipeline.shutdown().await;

    // Releases stop strictly before the gap.
    let released = collect_released(&mut sink_rx, 2).await;
    assert_eq!(released, vec![1, 2]);
    assert!(sink_rx.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_skip_policy_releases_across_gap() {
    let config = PipelineConfig {
        batch_size: 1,
        batch_window: Duration::from_millis(5),
        failure_policy: FailurePolicy::Skip,
        ..PipelineConfig::default()
    };
    let enrichers: Vec<Box<dyn Enrichment<Payload = Vec<i64>>>> = vec![
        Box::new(FailOnInode { poison: 42 }),
        Box::new(FailOnInode { poison: 42 }),
    ];

    let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
    let mut pipeline = Pipeline::start(config, enrichers, sink_tx, None)
        .await
        .unwrap();
    let orderer = pipeline.orderer();

    for (epoch, inode) in [(1, 1), (2, 2), (3, 42), (4, 4), (5, 5)] {
        orderer.observe(raw(inode, epoch));
        orderer.on_barrier().await.unwrap();
    }

    // Sequence 3 is skipped; everything else flows out in order.
    let mut inodes = Vec::new();
    let mut seqs = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        while inodes.len() < 4 {
            let result = sink_rx.recv().await.expect("sink closed early");
            seqs.push(result.seq);
            inodes.extend(result.payload);
        }
    })
    .await
    .expect("timed out waiting for releases");

    assert_eq!(seqs, vec![1, 2, 4, 5]);
    assert_eq!(inodes, vec![1, 2, 4, 5]);
    assert_eq!(pipeline.metrics().worker_failures, 1);

    pipeline.shutdown().await;
    // Skip policy is non-fatal: workers exit cleanly.
    assert!(pipeline.fault().await.is_none());
}

/// Publisher that appends every bulk's inode ids to a shared log and
/// signals how many events it has seen.
struct CollectingPublisher {
    inodes: Arc<parking_lot::Mutex<Vec<i64>>>,
    notify: Arc<tokio::sync::Notify>,
}

#[async_trait::async_trait]
impl BulkPublisher<Vec<i64>> for CollectingPublisher {
    async fn publish(&mut self, results: Vec<TaggedResult<Vec<i64>>>) -> Result<(), PublishError> {
        let mut inodes = self.inodes.lock();
        for result in results {
            inodes.extend(result.payload);
        }
        drop(inodes);
        self.notify.notify_one();
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bulk_sink_task_receives_ordered_stream() {
    let inodes = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let notify = Arc::new(tokio::sync::Notify::new());
    let publisher = Box::new(CollectingPublisher {
        inodes: Arc::clone(&inodes),
        notify: Arc::clone(&notify),
    });
    let sink_task = SinkTaskHandle::spawn_with_options(
        "bulk".into(),
        publisher,
        5,
        Duration::from_millis(50),
    );

    let config = PipelineConfig {
        batch_size: 2,
        batch_window: Duration::from_millis(10),
        ..PipelineConfig::default()
    };
    let enrichers: Vec<Box<dyn Enrichment<Payload = Vec<i64>>>> = vec![
        Box::new(SleepyEnricher {
            delay: Duration::from_millis(4),
        }),
        Box::new(SleepyEnricher {
            delay: Duration::ZERO,
        }),
    ];
    let mut pipeline = Pipeline::start(config, enrichers, sink_task.sink(), None)
        .await
        .unwrap();
    let orderer = pipeline.orderer();

    let mut expected = Vec::new();
    for epoch in 1..=4u64 {
        let base = epoch as i64 * 10;
        for inode in [base + 2, base + 1, base + 3] {
            orderer.observe(raw(inode, epoch));
        }
        orderer.on_barrier().await.unwrap();
        expected.extend([base + 1, base + 2, base + 3]);
    }

    tokio::time::timeout(Duration::from_secs(10), async {
        while inodes.lock().len() < expected.len() {
            notify.notified().await;
        }
    })
    .await
    .expect("timed out waiting for bulk publishes");

    assert_eq!(*inodes.lock(), expected);

    pipeline.shutdown().await;
    sink_task.close().await;
}

#[tokio::test]
async fn test_empty_worker_pool_rejected() {
    let enrichers: Vec<Box<dyn Enrichment<Payload = Vec<i64>>>> = Vec::new();
    let (sink_tx, _sink_rx) = mpsc::unbounded_channel();

    match Pipeline::start(PipelineConfig::default(), enrichers, sink_tx, None).await {
        Err(PipelineError::Config(msg)) => assert!(msg.contains("worker pool")),
        other => panic!("expected config error, got {:?}", other.map(|_| ())),
    }
}
