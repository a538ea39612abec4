use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use quill_web::Value;
use quill_web::msgpack::{pack, unpack};
use serde_json::json;

fn document() -> Value {
    Value::from(json!({
        "id": 184_467_440,
        "name": "quill",
        "ratio": 0.75,
        "active": true,
        "tags": ["http", "msgpack", "json", "yaml"],
        "owner": {"login": "someone", "followers": 1024, "bio": null},
        "history": (0..64).map(|i| json!({"seq": i, "delta": -i * 300})).collect::<Vec<_>>(),
    }))
}

fn bench_pack(c: &mut Criterion) {
    let value = document();
    c.bench_function("msgpack_pack", |b| b.iter(|| pack(black_box(&value)).unwrap()));
}

fn bench_unpack(c: &mut Criterion) {
    let packed = pack(&document()).unwrap();
    c.bench_function("msgpack_unpack", |b| b.iter(|| unpack(black_box(&packed)).unwrap()));
}

criterion_group!(benches, bench_pack, bench_unpack);
criterion_main!(benches);
