use criterion::{black_box, criterion_group, criterion_main, Criterion};
use resilience_rs::{
    BulkheadPolicy, CircuitBreakerPolicy, Pipeline, PipelineBuilder, RetryPolicy, TimeoutPolicy,
};
use std::error::Error;
use std::fmt;
use std::time::Duration;
use tokio::runtime::Runtime;

// Custom error type that implements Error trait
#[derive(Debug)]
struct BenchError(String);

impl BenchError {
    fn new(msg: &str) -> Self {
        BenchError(msg.to_string())
    }
}

impl fmt::Display for BenchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Benchmark error: {}", self.0)
    }
}

impl Error for BenchError {}

fn bench_pipeline_success(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let pipeline = PipelineBuilder::<u64, BenchError>::with_defaults()
        .fallback_value(0)
        .build();
    let pipeline = &pipeline;

    c.bench_function("pipeline_full_stack_success", |b| {
        b.to_async(&rt).iter(|| async move {
            black_box(pipeline.execute(|_| async { Ok(42) }).await)
        });
    });
}

fn bench_pipeline_open_rejection(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let pipeline = Pipeline::<u64, BenchError>::builder()
        .retry(RetryPolicy::default())
        .breaker(CircuitBreakerPolicy::new(1, Duration::from_secs(3600)).unwrap())
        .timeout(TimeoutPolicy::default())
        .fallback_value(0)
        .build();

    if let Some(breaker) = pipeline.breaker() {
        breaker.force_open();
    }
    let pipeline = &pipeline;

    c.bench_function("pipeline_open_rejection", |b| {
        b.to_async(&rt).iter(|| async move {
            black_box(
                pipeline
                    .execute(|_| async { Err(BenchError::new("Simulated failure")) })
                    .await,
            )
        });
    });
}

fn bench_pipeline_concurrent(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let pipeline = Pipeline::<u64, BenchError>::builder()
        .breaker(CircuitBreakerPolicy::new(u64::MAX, Duration::from_secs(30)).unwrap())
        .bulkhead(BulkheadPolicy::new(TASK_COUNT).unwrap())
        .build();

    const TASK_COUNT: usize = 4;
    const ITERATIONS_PER_TASK: usize = 1000;

    c.bench_function("pipeline_concurrent", |b| {
        b.to_async(&rt).iter(|| {
            let pipeline = pipeline.clone();
            async move {
                let handles: Vec<_> = (0..TASK_COUNT)
                    .map(|_| {
                        let pipeline = pipeline.clone();
                        tokio::spawn(async move {
                            for _ in 0..ITERATIONS_PER_TASK {
                                let _ = black_box(pipeline.execute(|_| async { Ok(1) }).await);
                            }
                        })
                    })
                    .collect();

                for handle in handles {
                    handle.await.unwrap();
                }
            }
        });
    });
}

criterion_group!(
    benches,
    bench_pipeline_success,
    bench_pipeline_open_rejection,
    bench_pipeline_concurrent
);
criterion_main!(benches);
