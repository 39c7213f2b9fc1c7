//! UrbanLens gateway benchmarks.
//!
//! Targets on a laptop-class machine:
//!   cache_lookup_by_point_from_1000 ... < 50μs
//!   cache_lookup_by_name_from_1000 .... < 50μs
//!   cache_store_upsert ................ < 1ms (WAL, file-backed)
//!   geocode_cache_hit ................. < 100μs
//!   estimate_tokens_2kb ............... < 20μs
//!   fit_to_budget_200_messages ........ < 200μs

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use lens_core::config::CacheConfig;
use lens_core::gateway::geocoding::GoogleGeocodingGateway;
use lens_core::mock::ScriptedTransport;
use lens_core::{CacheEntry, CacheStore, Coordinates, GeocodeRequest, GeocodingCache, SqliteCacheStore};
use lens_llm::{MessageQueue, TokenBudget, estimate_tokens};

const RECORDS: u32 = 1000;

fn point(i: u32) -> Coordinates {
    Coordinates::new(42.0 + f64::from(i) * 0.001, -71.0 - f64::from(i) * 0.001)
}

fn payload(i: u32) -> String {
    serde_json::json!({
        "status": "OK",
        "results": [{
            "formatted_address": format!("{i} Main St, Danvers, MA"),
            "geometry": {"location": {"lat": point(i).latitude, "lng": point(i).longitude}}
        }]
    })
    .to_string()
}

fn populated_store(store: &SqliteCacheStore) {
    for i in 0..RECORDS {
        store
            .store(CacheEntry {
                coordinates: Some(point(i)),
                place_name: Some(format!("Location {i}")),
                raw_response: Some(payload(i)),
            })
            .expect("seed store");
    }
}

fn bench_cache_lookup(c: &mut Criterion) {
    let store = SqliteCacheStore::open_in_memory(&CacheConfig::default()).expect("store");
    populated_store(&store);

    c.bench_function("cache_lookup_by_point_from_1000", |b| {
        b.iter(|| store.lookup_by_coordinates(black_box(point(500))).expect("lookup"));
    });
    c.bench_function("cache_lookup_by_name_from_1000", |b| {
        b.iter(|| store.lookup_by_place_name(black_box("  LOCATION   500 ")).expect("lookup"));
    });
}

fn bench_cache_store(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteCacheStore::open(dir.path().join("bench.db"), &CacheConfig::default()).expect("store");
    let mut i = 0u32;

    c.bench_function("cache_store_upsert", |b| {
        b.iter(|| {
            i = (i + 1) % RECORDS;
            store
                .store(CacheEntry {
                    coordinates: Some(point(i)),
                    place_name: None,
                    raw_response: Some(payload(i)),
                })
                .expect("store")
        });
    });
}

fn bench_geocode_hit(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let store = Arc::new(SqliteCacheStore::open_in_memory(&CacheConfig::default()).expect("store"));
    populated_store(&store);
    let gateway = Arc::new(GoogleGeocodingGateway::new(Arc::new(ScriptedTransport::new()), "bench-key"));
    let cache = GeocodingCache::new(store, gateway);
    let request = GeocodeRequest::point(point(250));

    c.bench_function("geocode_cache_hit", |b| {
        b.to_async(&runtime)
            .iter(|| async { cache.geocode(black_box(&request)).await.expect("hit") });
    });
}

fn bench_token_estimation(c: &mut Criterion) {
    let text = "The old mill on the river (built 1923) closed in the '70s; roof-top access is via the east stair. "
        .repeat(20);
    c.bench_function("estimate_tokens_2kb", |b| {
        b.iter(|| estimate_tokens(black_box(&text)));
    });
}

fn bench_fit_to_budget(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit_to_budget");
    for messages in [20usize, 200] {
        let budget = TokenBudget {
            max_tokens: 1_000,
            ..TokenBudget::default()
        };
        let mut queue = MessageQueue::new(budget);
        queue.push_system("You are an assistant for urban explorers.").expect("push");
        for i in 0..messages {
            let turn = format!("Turn {i}: the building has three floors and a collapsed north wing.");
            if i % 2 == 0 {
                queue.push_user(turn).expect("push");
            } else {
                queue.push_assistant(turn).expect("push");
            }
        }

        group.bench_with_input(BenchmarkId::from_parameter(messages), &queue, |b, queue| {
            b.iter(|| {
                let mut queue = queue.clone();
                queue.fit_to_budget().expect("fits");
                black_box(queue.len())
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_cache_lookup,
    bench_cache_store,
    bench_geocode_hit,
    bench_token_estimation,
    bench_fit_to_budget,
);
criterion_main!(benches);
