use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::{Map, Value, json};
use std::hint::black_box;
use tabular_rag::ingestion::{ChunkMode, Table, build_chunks};

fn sample_table(rows: usize) -> Table {
    Table {
        name: "overnight_stays".to_string(),
        columns: vec![
            "year".to_string(),
            "month".to_string(),
            "region".to_string(),
            "nights".to_string(),
        ],
        rows: (0..rows)
            .map(|i| {
                let mut row = Map::new();
                row.insert("year".to_string(), json!(2000 + i / 12));
                row.insert("month".to_string(), json!(i % 12 + 1));
                row.insert("region".to_string(), Value::from(format!("NUTS-{}", i % 25)));
                row.insert("nights".to_string(), json!(i as f64 * 1.5));
                row
            })
            .collect(),
    }
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let table = sample_table(10_000);
    let description = "Monthly overnight stays in tourist accommodation per NUTS region";

    c.bench_function("chunking_batch", |b| {
        b.iter(|| build_chunks(black_box(&table), description, 25, ChunkMode::Batch))
    });
    c.bench_function("chunking_row", |b| {
        b.iter(|| build_chunks(black_box(&table), description, 25, ChunkMode::Row))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
