use super::*;
use core::time::Duration;
use std::{
    collections::HashSet,
    sync::atomic::{AtomicUsize, Ordering},
};
use tokio::time::Instant;

const TOTAL_ITEMS: usize = 10;

/// Counts handler invocations and tracks how many run at once.
#[derive(Default)]
struct Probe {
    attempts: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
    seen: parking_lot::Mutex<Vec<usize>>,
}

impl Probe {
    fn enter(&self, item: usize) {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.seen.lock().push(item);
    }

    fn exit(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

/// A handler that sleeps briefly and fails on every item in `failing`.
fn failing_on(
    probe: &Arc<Probe>,
    failing: &'static [usize],
    delay: Duration,
) -> impl Handler<usize, Error = String> {
    let probe = Arc::clone(probe);
    move |_ctx: CancellationToken, item: usize| {
        let probe = Arc::clone(&probe);
        async move {
            probe.enter(item);
            tokio::time::sleep(delay).await;
            probe.exit();
            if failing.contains(&item) {
                Err(format!("item {item} rejected"))
            } else {
                Ok(())
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn empty_input_returns_immediately() {
    let probe = Arc::new(Probe::default());
    let executor = BatchExecutor::new(BatchConfig::default().with_rate_limit(1));

    let start = Instant::now();
    let result = executor
        .execute(
            &CancellationToken::new(),
            Vec::<usize>::new(),
            failing_on(&probe, &[], Duration::ZERO),
        )
        .await;

    assert_eq!(result, Ok(()));
    assert_eq!(probe.attempts(), 0);
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn runs_every_item_once_on_success() {
    let probe = Arc::new(Probe::default());
    let executor = BatchExecutor::new(BatchConfig::default().with_concurrency(4));

    let result = executor
        .execute(
            &CancellationToken::new(),
            0..100,
            failing_on(&probe, &[], Duration::from_millis(1)),
        )
        .await;

    assert_eq!(result, Ok(()));
    let seen: HashSet<_> = probe.seen.lock().iter().copied().collect();
    assert_eq!(seen.len(), 100);
    assert_eq!(probe.attempts(), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn never_exceeds_concurrency() {
    let probe = Arc::new(Probe::default());
    let executor = BatchExecutor::new(BatchConfig::default().with_concurrency(3));

    let result = executor
        .execute(
            &CancellationToken::new(),
            0..30,
            failing_on(&probe, &[], Duration::from_millis(5)),
        )
        .await;

    assert_eq!(result, Ok(()));
    assert!(probe.peak.load(Ordering::SeqCst) <= 3);
    // Every spawned execution has finished by the time `execute` returns.
    assert_eq!(probe.running.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn fail_fast_skips_a_suffix() {
    let probe = Arc::new(Probe::default());
    let executor = BatchExecutor::new(BatchConfig::default().with_concurrency(2));

    let result = executor
        .execute(
            &CancellationToken::new(),
            0..TOTAL_ITEMS,
            failing_on(&probe, &[3], Duration::from_millis(20)),
        )
        .await;

    assert_eq!(
        result,
        Err(BatchError::Item {
            index: 3,
            error: String::from("item 3 rejected"),
        })
    );
    assert!(probe.attempts() < TOTAL_ITEMS);
    assert!(!probe.seen.lock().contains(&(TOTAL_ITEMS - 1)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn fail_fast_does_not_cancel_the_callers_token() {
    let probe = Arc::new(Probe::default());
    let executor = BatchExecutor::new(BatchConfig::default().with_concurrency(1));
    let ctx = CancellationToken::new();

    let result = executor
        .execute(&ctx, 0..4, failing_on(&probe, &[0], Duration::ZERO))
        .await;

    assert!(matches!(result, Err(BatchError::Item { index: 0, .. })));
    assert_eq!(probe.attempts(), 1);
    assert!(!ctx.is_cancelled());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn collect_and_continue_runs_everything() {
    let probe = Arc::new(Probe::default());
    let executor = BatchExecutor::new(
        BatchConfig::default()
            .with_concurrency(3)
            .with_ignore_error(true),
    );

    let result = executor
        .execute(
            &CancellationToken::new(),
            0..TOTAL_ITEMS,
            failing_on(&probe, &[2, 5, 7], Duration::from_millis(2)),
        )
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.count(), 3);
    let BatchError::Aggregate { failures } = &err else {
        panic!("expected an aggregate, got {err:?}");
    };
    let failed: HashSet<_> = failures.iter().map(|f| f.index).collect();
    assert_eq!(failed, HashSet::from([2, 5, 7]));
    assert!(err.to_string().starts_with("batch finished with 3 error(s), first: item "));

    assert_eq!(probe.attempts(), TOTAL_ITEMS);
    let mut seen = probe.seen.lock().clone();
    seen.sort_unstable();
    assert_eq!(seen, (0..TOTAL_ITEMS).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn panic_is_isolated_and_swallowed() {
    for policy in [ErrorPolicy::FailFast, ErrorPolicy::CollectAndContinue] {
        let done = Arc::new(parking_lot::Mutex::new(HashSet::new()));
        let sink = Arc::clone(&done);
        let executor = BatchExecutor::new(
            BatchConfig::default()
                .with_concurrency(2)
                .with_error_policy(policy),
        );

        let result = executor
            .execute(
                &CancellationToken::new(),
                1..=5_usize,
                move |_ctx: CancellationToken, item: usize| {
                    let sink = Arc::clone(&sink);
                    async move {
                        if item == 4 {
                            panic!("item {item} is poisoned");
                        }
                        sink.lock().insert(item);
                        Ok::<_, String>(())
                    }
                },
            )
            .await;

        assert_eq!(result, Ok(()), "policy {policy:?}");
        assert_eq!(*done.lock(), HashSet::from([1, 2, 3, 5]), "policy {policy:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn rate_limit_throttles_admission() {
    let probe = Arc::new(Probe::default());
    let executor = BatchExecutor::new(
        BatchConfig::default()
            .with_concurrency(10)
            .with_rate_limit(5)
            .with_burst(1),
    );

    let start = Instant::now();
    let result = executor
        .execute(
            &CancellationToken::new(),
            0..TOTAL_ITEMS,
            failing_on(&probe, &[], Duration::ZERO),
        )
        .await;

    assert_eq!(result, Ok(()));
    assert_eq!(probe.attempts(), TOTAL_ITEMS);
    assert!(start.elapsed() >= Duration::from_millis(9 * 200));
}

#[tokio::test(start_paused = true)]
async fn burst_admits_several_at_once() {
    let probe = Arc::new(Probe::default());
    let executor = BatchExecutor::new(
        BatchConfig::default()
            .with_rate_limit(5)
            .with_burst(5),
    );

    let start = Instant::now();
    let result = executor
        .execute(
            &CancellationToken::new(),
            0..TOTAL_ITEMS,
            failing_on(&probe, &[], Duration::ZERO),
        )
        .await;

    assert_eq!(result, Ok(()));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(5 * 200));
    assert!(elapsed < Duration::from_millis(9 * 200));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn cancelled_before_dispatch_runs_nothing() {
    for config in [
        BatchConfig::default(),
        BatchConfig::default().with_rate_limit(1),
    ] {
        let probe = Arc::new(Probe::default());
        let ctx = CancellationToken::new();
        ctx.cancel();

        let result = BatchExecutor::new(config)
            .execute(&ctx, 0..TOTAL_ITEMS, failing_on(&probe, &[], Duration::ZERO))
            .await;

        assert_eq!(result, Ok(()));
        assert_eq!(probe.attempts(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn cancelled_limiter_wait_reports_admission() {
    let probe = Arc::new(Probe::default());
    let executor = BatchExecutor::new(
        BatchConfig::default()
            .with_rate_limit(1)
            .with_ignore_error(true),
    );
    let ctx = CancellationToken::new();

    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        canceller.cancel();
    });

    let result = executor
        .execute(&ctx, 0..TOTAL_ITEMS, failing_on(&probe, &[], Duration::ZERO))
        .await;

    // Items 0, 1 and 2 are admitted at t = 0s, 1s and 2s.
    assert_eq!(
        result,
        Err(BatchError::Admission {
            index: 3,
            reason: crate::Cancelled,
        })
    );
    assert_eq!(probe.attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn fail_fast_error_wins_over_interrupted_limiter_wait() {
    let probe = Arc::new(Probe::default());
    let executor = BatchExecutor::new(BatchConfig::default().with_rate_limit(1));

    let result = executor
        .execute(
            &CancellationToken::new(),
            0..TOTAL_ITEMS,
            failing_on(&probe, &[0], Duration::from_millis(100)),
        )
        .await;

    assert!(matches!(result, Err(BatchError::Item { index: 0, .. })));
    assert_eq!(probe.attempts(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn handlers_observe_external_cancellation() {
    let ctx = CancellationToken::new();
    let executor = BatchExecutor::new(BatchConfig::default().with_concurrency(4));
    let observed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&observed);

    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let result = executor
        .execute(&ctx, 0..4_usize, move |ctx: CancellationToken, _item: usize| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::select! {
                    () = ctx.cancelled() => {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                    () = tokio::time::sleep(Duration::from_secs(30)) => Err("timed out"),
                }
            }
        })
        .await;

    assert_eq!(result, Ok(()));
    assert_eq!(observed.load(Ordering::SeqCst), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_executes_are_independent() {
    let fast = BatchExecutor::new(BatchConfig::default().with_concurrency(8));
    let strict = BatchExecutor::new(BatchConfig::default().with_concurrency(1));
    let (fast_probe, strict_probe) = (Arc::new(Probe::default()), Arc::new(Probe::default()));
    let ctx = CancellationToken::new();

    let (a, b) = tokio::join!(
        fast.execute(&ctx, 0..32, failing_on(&fast_probe, &[], Duration::from_millis(2))),
        strict.execute(&ctx, 0..8, failing_on(&strict_probe, &[], Duration::from_millis(2))),
    );

    assert_eq!(a, Ok(()));
    assert_eq!(b, Ok(()));
    assert_eq!(strict_probe.peak.load(Ordering::SeqCst), 1);
    assert_eq!(fast_probe.attempts(), 32);
}
