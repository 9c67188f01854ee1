use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;
use std::time::Duration;

use commander_core::{IdAllocator, ServiceError, ServiceResult};
use commander_orchestrator::{backoff_delay, predicates, Retry, Sleeper};
use commander_services::FaultQueue;

struct NoSleep;

impl Sleeper for NoSleep {
    fn sleep(&self, _: Duration) {}
}

fn pop_or_ok(faults: &FaultQueue) -> ServiceResult<()> {
    match faults.pop() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn bench_retry_fast_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("retry_fast_path");
    group.sample_size(1000);

    group.bench_function("first_attempt_succeeds", |b| {
        let faults = FaultQueue::new();
        b.iter(|| {
            let mut retry = Retry::new(
                pop_or_ok,
                |_: &(), _: &ServiceError| {},
                3,
                Duration::from_secs(30),
            )
            .retry_on(predicates::database_unavailable);
            retry.perform(black_box(&faults), &());
            black_box(retry.attempts())
        });
    });

    group.bench_function("non_retryable_short_circuit", |b| {
        let sleeper: Arc<dyn Sleeper> = Arc::new(NoSleep);
        b.iter(|| {
            let faults = FaultQueue::seeded([ServiceError::ItemUnavailable]);
            let mut handled = 0u32;
            let mut retry = Retry::new(
                pop_or_ok,
                |_: &(), _: &ServiceError| handled += 1,
                3,
                Duration::from_secs(30),
            )
            .retry_on(predicates::database_unavailable)
            .with_sleeper(sleeper.clone());
            retry.perform(&faults, &());
            drop(retry);
            black_box(handled)
        });
    });

    for failures in [1usize, 3, 10] {
        group.bench_with_input(
            BenchmarkId::new("transient_then_success", failures),
            &failures,
            |b, &failures| {
                let sleeper: Arc<dyn Sleeper> = Arc::new(NoSleep);
                b.iter(|| {
                    let faults = FaultQueue::repeated(ServiceError::DatabaseUnavailable, failures);
                    let mut retry = Retry::new(
                        pop_or_ok,
                        |_: &(), _: &ServiceError| {},
                        failures as u32,
                        Duration::from_secs(30),
                    )
                    .with_sleeper(sleeper.clone());
                    retry.perform(&faults, &());
                    black_box(retry.attempts())
                });
            },
        );
    }

    group.bench_function("backoff_delay", |b| {
        b.iter(|| backoff_delay(black_box(5), Duration::from_secs(30), black_box(417)));
    });

    group.finish();
}

fn bench_id_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("id_allocation");
    group.throughput(Throughput::Elements(1));

    group.bench_function("next_order_id", |b| {
        let allocator = IdAllocator::in_memory();
        b.iter(|| black_box(allocator.next_order_id()));
    });

    group.finish();
}

criterion_group!(benches, bench_retry_fast_path, bench_id_allocation);
criterion_main!(benches);
