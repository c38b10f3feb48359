use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use flexdb::command::make_command;
use flexdb::{CommandHandler, Database};

fn bench_exec_set_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("exec");
    group.bench_function("set_get", |b| {
        b.iter_batched(
            Database::new,
            |db| {
                for i in 0..1000u32 {
                    let k = format!("k{i}");
                    let v = format!("v{i}");
                    db.call_void(&make_command(["SET", k.as_str(), v.as_str()]))
                        .unwrap();
                    db.call_void(&make_command(["GET", k.as_str()])).unwrap();
                }
                black_box(db)
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

fn bench_exec_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("exec");
    group.bench_function("sort_1k", |b| {
        b.iter_batched(
            || {
                let db = Database::new();
                for i in 0..1000u32 {
                    let v = (1000 - i).to_string();
                    db.call_void(&make_command(["RPUSH", "l", v.as_str()]))
                        .unwrap();
                }
                db
            },
            |db| {
                black_box(db.call(&make_command(["SORT", "l"])).unwrap());
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_exec_set_get, bench_exec_sort);
criterion_main!(benches);
