//! Benchmarks for the entitlement decision hot path

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use taskflow_db::memory::MemoryStore;
use taskflow_entitlement::{EntitlementChecker, PlanCatalog, UsageLedger};
use taskflow_types::{Feature, Limit, ResourceType, UserId};

fn checker() -> EntitlementChecker {
    let repo = Arc::new(MemoryStore::seeded());
    EntitlementChecker::new(
        PlanCatalog::new(repo.clone()),
        UsageLedger::new(repo.clone()),
        repo,
    )
}

fn bench_limit_arithmetic(c: &mut Criterion) {
    let mut group = c.benchmark_group("limit");

    group.bench_function("has_room", |b| {
        let limit = Limit::Capped(50);
        b.iter(|| limit.has_room(black_box(49.0)));
    });

    group.bench_function("percentage", |b| {
        let limit = Limit::Capped(10_240);
        b.iter(|| limit.percentage(black_box(5_120.5)));
    });

    group.finish();
}

fn bench_checker(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let checker = checker();
    let user = UserId::new();

    // Warm the tier and plan caches
    rt.block_on(checker.evaluate(&user, ResourceType::Tasks));

    let mut group = c.benchmark_group("checker");

    group.bench_function("evaluate_cached", |b| {
        b.to_async(&rt)
            .iter(|| checker.evaluate(black_box(&user), ResourceType::Tasks));
    });

    group.bench_function("can_use_feature_cached", |b| {
        b.to_async(&rt)
            .iter(|| checker.can_use_feature(black_box(&user), Feature::AiTaskDecomposition));
    });

    group.finish();
}

criterion_group!(benches, bench_limit_arithmetic, bench_checker);
criterion_main!(benches);
