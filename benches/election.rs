//! Benchmarks for the routing hot path.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use http::Request;
use rustmc::cluster::{extract_jvm_route, Balancer, NodeConfig};
use rustmc::config::ModClusterConfig;
use rustmc::health::NoopHealthChecker;
use rustmc::util::{BufferPool, CancelKey, IoThread, PeriodicTask, TaskExecutor};
use rustmc::ModClusterContainer;
use std::sync::Arc;
use std::time::Duration;

struct ManualExecutor;

impl TaskExecutor for ManualExecutor {
    fn execute_at_interval(&self, _task: Arc<dyn PeriodicTask>, _period: Duration) -> CancelKey {
        CancelKey::new(|| {})
    }
}

fn populated_container(num_nodes: usize) -> ModClusterContainer {
    let container =
        ModClusterContainer::new(&ModClusterConfig::default(), Arc::new(NoopHealthChecker));
    let executor: Arc<dyn TaskExecutor> = Arc::new(ManualExecutor);

    for i in 0..num_nodes {
        let route = format!("node{}", i);
        container
            .add_node(
                NodeConfig::builder(&route, format!("http://10.0.0.{}:8009", i + 1).parse().unwrap())
                    .balancer("web")
                    .build(),
                Balancer::builder("web"),
                IoThread::new(i % 4, Arc::clone(&executor)),
                BufferPool::default(),
            )
            .unwrap();
        container
            .enable_context("/app", &route, &["localhost".to_string()])
            .unwrap();
        container.update_load(&route, 100).unwrap();
    }
    container
}

fn benchmark_find_target(c: &mut Criterion) {
    let container = populated_container(10);
    let req = Request::builder()
        .uri("/app/index.html")
        .header("Host", "localhost")
        .body(())
        .unwrap();

    c.bench_function("find_target", |b| {
        b.iter(|| {
            black_box(container.find_target(&req));
        })
    });
}

fn benchmark_sticky_find_target(c: &mut Criterion) {
    let container = populated_container(10);
    let req = Request::builder()
        .uri("/app/index.html")
        .header("Host", "localhost")
        .header("Cookie", "JSESSIONID=abcdef.node3")
        .body(())
        .unwrap();

    c.bench_function("find_target_sticky", |b| {
        b.iter(|| {
            black_box(container.find_target(&req));
        })
    });
}

fn benchmark_election(c: &mut Criterion) {
    let mut group = c.benchmark_group("election");
    group.throughput(Throughput::Elements(1));

    for num_nodes in [2, 10, 50] {
        let container = populated_container(num_nodes);
        let req = Request::builder()
            .uri("/app")
            .header("Host", "localhost")
            .body(())
            .unwrap();
        let target = container.find_target(&req).unwrap();

        group.bench_function(format!("resolve_{}_nodes", num_nodes), |b| {
            b.iter(|| {
                black_box(target.resolve(&container));
            })
        });
    }

    group.finish();
}

fn benchmark_route_extraction(c: &mut Criterion) {
    c.bench_function("extract_jvm_route", |b| {
        b.iter(|| {
            black_box(extract_jvm_route(black_box("a8f3c2d19b.node7.v2")));
        })
    });
}

criterion_group!(
    benches,
    benchmark_find_target,
    benchmark_sticky_find_target,
    benchmark_election,
    benchmark_route_extraction,
);

criterion_main!(benches);
