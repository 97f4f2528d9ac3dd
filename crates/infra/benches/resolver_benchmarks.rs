use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use botforge_auth::{ResourceType, ScopeRegistry};
use botforge_core::OwnerId;
use botforge_infra::authz_service::InMemoryAuthzService;
use botforge_infra::context::OperationContext;
use botforge_infra::entity_store::{EntityRecord, EntityStore, InMemoryEntityStore};
use botforge_infra::resolver::ResourceTypeResolver;

type Resolver = ResourceTypeResolver<Arc<InMemoryEntityStore>, InMemoryAuthzService>;

fn record(resource_type: ResourceType) -> EntityRecord {
    EntityRecord {
        id: Uuid::now_v7(),
        resource_type,
        name: "bench".to_string(),
        owner_id: OwnerId::new("bench-user").expect("valid owner"),
        public: false,
        payload: json!({}),
        created_at: Utc::now(),
    }
}

/// Store pre-filled with `rows` indexed rows per domain type.
fn populated_store(rt: &tokio::runtime::Runtime, rows: usize) -> Arc<InMemoryEntityStore> {
    let store = InMemoryEntityStore::arc();
    rt.block_on(async {
        let mut tx = store.begin().await.unwrap();
        for resource_type in ResourceType::DOMAIN_TYPES {
            for _ in 0..rows {
                tx.insert(&record(resource_type)).await.unwrap();
            }
        }
        tx.commit().await.unwrap();
    });
    store
}

fn bench_scope_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("scope_lookup");

    group.bench_function("by_type", |b| {
        b.iter(|| ScopeRegistry::scopes_for(black_box(ResourceType::Runner)).len());
    });
    group.bench_function("by_tag", |b| {
        b.iter(|| ScopeRegistry::scopes_for_tag(black_box("strategy")).len());
    });

    group.finish();
}

fn bench_resolution(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("resolution");
    let ctx = OperationContext::new();

    for rows in [100usize, 10_000] {
        let store = populated_store(&rt, rows);

        // Indexed: one index hit plus one point lookup.
        let indexed = record(ResourceType::Runner);
        rt.block_on(async {
            let mut tx = store.begin().await.unwrap();
            tx.insert(&indexed).await.unwrap();
            tx.commit().await.unwrap();
        });

        // Unindexed runner: probed last, the worst case.
        let probed = record(ResourceType::Runner);
        store.insert_unindexed(probed.clone()).unwrap();

        let resolver: Resolver = ResourceTypeResolver::new(store.clone(), InMemoryAuthzService::new());
        let indexed_id = indexed.id.to_string();
        let probed_id = probed.id.to_string();

        group.bench_with_input(BenchmarkId::new("indexed", rows), &indexed_id, |b, id| {
            b.to_async(&rt)
                .iter(|| async { resolver.resolve(&ctx, black_box(id)).await.unwrap() });
        });
        group.bench_with_input(BenchmarkId::new("probed", rows), &probed_id, |b, id| {
            b.to_async(&rt)
                .iter(|| async { resolver.resolve(&ctx, black_box(id)).await.unwrap() });
        });
        group.bench_with_input(BenchmarkId::new("group_fallback", rows), "org-bench", |b, id| {
            b.to_async(&rt)
                .iter(|| async { resolver.resolve(&ctx, black_box(id)).await.unwrap() });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_scope_lookup, bench_resolution);
criterion_main!(benches);
