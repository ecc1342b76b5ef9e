//! Benchmarks for the definition container

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use definition_injector::prelude::*;
use std::hint::black_box;
use std::thread;

#[allow(dead_code)]
struct SmallService {
    value: i32,
}

#[allow(dead_code)]
struct Layer {
    below: Option<Arc<Layer>>,
}

fn small() -> ClassDescriptor {
    ClassDescriptor::named::<SmallService, _>(
        "SmallService",
        [ParamDescriptor::new("value").builtin("i32").default_value(42i32)],
        |args| Ok(SmallService { value: args.cloned::<i32>(0)? }),
    )
}

/// `depth` layers, each depending on the one below; the top is `layer.{depth-1}`
fn layered(depth: usize, singleton: bool) -> Container {
    let container = Container::with_capacity(depth, ContainerConfig::new().with_singleton_default(singleton));
    for level in 0..depth {
        let params = if level == 0 {
            Vec::new()
        } else {
            vec![ParamDescriptor::new("below").typed(format!("layer.{}", level - 1))]
        };
        let class = ClassDescriptor::named::<Layer, _>(format!("Layer{level}"), params, move |args| {
            Ok(Layer {
                below: if level == 0 { None } else { Some(args.get::<Layer>(0)?) },
            })
        });
        container.register(format!("layer.{level}"), Definition::autowire(class)).unwrap();
    }
    container
}

fn tagged(members: usize) -> Container {
    let container = Container::new();
    for member in 0..members {
        container
            .register(
                format!("handler.{member}"),
                Definition::value(member).tag_with("handler", TagSpec::priority((member % 7) as i64)),
            )
            .unwrap();
    }
    container.register("lazy", Definition::tagged(TagQuery::new("handler"))).unwrap();
    container
        .register("eager", Definition::tagged(TagQuery::new("handler").eager()))
        .unwrap();
    container
}

fn bench_registration(c: &mut Criterion) {
    let mut group = c.benchmark_group("registration");

    group.bench_function("value", |b| {
        b.iter(|| {
            let container = Container::new();
            container.register("value", Definition::value(42i32)).unwrap();
            black_box(container)
        })
    });

    group.bench_function("autowire", |b| {
        b.iter(|| {
            let container = Container::new();
            container.register("small", Definition::autowire(small())).unwrap();
            black_box(container)
        })
    });

    group.bench_function("builder_16", |b| {
        b.iter(|| {
            let container = Container::builder()
                .add_many((0..16).map(|i| (format!("value.{i}"), Definition::value(i))))
                .build()
                .unwrap();
            black_box(container)
        })
    });

    group.finish();
}

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");
    group.throughput(Throughput::Elements(1));

    let container = Container::new();
    container.register("singleton", Definition::autowire(small()).singleton()).unwrap();
    container.register("transient", Definition::autowire(small())).unwrap();
    container.register("alias", Definition::reference("singleton")).unwrap();

    group.bench_function("get_singleton", |b| {
        b.iter(|| black_box(container.get("singleton").unwrap()))
    });

    group.bench_function("get_transient", |b| {
        b.iter(|| black_box(container.get("transient").unwrap()))
    });

    group.bench_function("get_reference", |b| {
        b.iter(|| black_box(container.get("alias").unwrap()))
    });

    group.bench_function("has_check", |b| b.iter(|| black_box(container.has("singleton"))));

    group.bench_function("get_not_found", |b| {
        b.iter(|| black_box(container.get("missing").is_err()))
    });

    group.finish();
}

fn bench_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("depth");

    for depth in [1usize, 4, 16] {
        let top = format!("layer.{}", depth - 1);

        let live = layered(depth, false);
        group.bench_with_input(BenchmarkId::new("live_transient", depth), &top, |b, top| {
            b.iter(|| black_box(live.get(top).unwrap()))
        });

        let compiled = live.compile_container().unwrap();
        group.bench_with_input(BenchmarkId::new("compiled_transient", depth), &top, |b, top| {
            b.iter(|| black_box(compiled.get(top).unwrap()))
        });
    }

    group.finish();
}

fn bench_tags(c: &mut Criterion) {
    let mut group = c.benchmark_group("tags");

    for members in [4usize, 32] {
        let container = tagged(members);

        group.bench_with_input(BenchmarkId::new("eager", members), &container, |b, container| {
            b.iter(|| black_box(container.get("eager").unwrap()))
        });

        group.bench_with_input(BenchmarkId::new("lazy_iterate", members), &container, |b, container| {
            let lazy = container.get_as::<LazyTagged>("lazy").unwrap();
            b.iter(|| {
                for entry in lazy.iter() {
                    black_box(entry.unwrap());
                }
            })
        });
    }

    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    for depth in [16usize, 128] {
        let container = layered(depth, true);
        group.bench_with_input(BenchmarkId::new("layered", depth), &container, |b, container| {
            b.iter(|| black_box(container.compile().unwrap()))
        });
    }

    group.finish();
}

fn bench_concurrent(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent");

    group.bench_function("concurrent_reads_4", |b| {
        let container = layered(8, true);

        b.iter(|| {
            thread::scope(|scope| {
                for _ in 0..4 {
                    scope.spawn(|| {
                        for _ in 0..100 {
                            let _ = container.get("layer.7").unwrap();
                        }
                    });
                }
            })
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_registration,
    bench_resolution,
    bench_depth,
    bench_tags,
    bench_compile,
    bench_concurrent,
);

criterion_main!(benches);
