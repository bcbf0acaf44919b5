//! Performance benchmarks for csvdex
//!
//! Run with: cargo bench

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use csvdex::index::{IndexConfig, IndexReader, Indexer, OpenMode};
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const CITIES: [&str; 6] = ["Paris", "New York", "Lyon", "Boston", "New Orleans", "Oslo"];
const NAMES: [&str; 5] = ["Smith", "Jones", "Brown", "Adams", "Moore"];

/// Write a CSV with `rows` generated people and return its path
fn write_people_csv(dir: &TempDir, rows: usize) -> PathBuf {
    let mut content = String::from("id,name,city,note\n");
    for i in 0..rows {
        let _ = writeln!(
            content,
            "{i},Person {} {i},{},\"row {i}, batch {}\"",
            NAMES[i % NAMES.len()],
            CITIES[i % CITIES.len()],
            i / 100
        );
    }
    let path = dir.path().join("people.csv");
    fs::write(&path, content).expect("Failed to write csv");
    path
}

/// Create a test index over generated rows for query benchmarks
fn create_benchmark_index() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = write_people_csv(&temp_dir, 10_000);
    let index = temp_dir.path().join("people.idx");

    Indexer::default()
        .insert(&input, &index, OpenMode::Create)
        .expect("Failed to build index");

    (temp_dir, index)
}

fn bench_query_parsing(c: &mut Criterion) {
    let queries = vec![
        "simple",
        "name:smith",
        "city:\"new york\"",
        "city:new*",
        "*:*",
        "city:paris AND NOT name:brown",
        "(name:smith OR name:jones) -city:oslo",
    ];

    let mut group = c.benchmark_group("query_parsing");
    for query in queries {
        group.bench_with_input(BenchmarkId::from_parameter(query), &query, |b, &q| {
            b.iter(|| csvdex::query::parse_query(black_box(q)))
        });
    }
    group.finish();
}

fn bench_analyze(c: &mut Criterion) {
    let text = "Carol Smith-Jones, 42 Rue de Lyon; carol.smith@example.com";

    c.bench_function("analyze", |b| {
        b.iter(|| csvdex::utils::analyze(black_box(text)))
    });
}

fn bench_indexing(c: &mut Criterion) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = write_people_csv(&temp_dir, 2_000);

    let mut group = c.benchmark_group("indexing");
    group.sample_size(10);

    group.bench_function("create_2k_rows", |b| {
        let index = temp_dir.path().join("create.idx");
        let indexer = Indexer::default();
        b.iter(|| indexer.insert(black_box(&input), &index, OpenMode::Create))
    });

    group.bench_function("update_2k_rows_small_segments", |b| {
        let index = temp_dir.path().join("update.idx");
        let indexer = Indexer::new(IndexConfig { flush_threshold: 256 });
        b.iter(|| {
            let _ = indexer.drop_index(&index);
            indexer.update(black_box(&input), &index)
        })
    });

    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let (_temp_dir, index) = create_benchmark_index();
    let reader = IndexReader::open(&index).expect("Failed to open index");

    let mut group = c.benchmark_group("search");

    for (name, text) in [
        ("key_lookup", "id:4242"),
        ("term", "name:smith"),
        ("phrase", "city:\"new york\""),
        ("prefix", "city:new*"),
        ("boolean", "city:paris AND NOT name:brown"),
        ("match_all", "*:*"),
    ] {
        let query = csvdex::query::parse_query(text).expect("Failed to parse query");
        group.bench_function(name, |b| {
            b.iter(|| {
                let executor = csvdex::query::QueryExecutor::new(&reader);
                executor.execute(black_box(&query), Some(100))
            })
        });
    }

    group.finish();
}

fn bench_find(c: &mut Criterion) {
    let (_temp_dir, index) = create_benchmark_index();
    let fields = vec!["id".to_string(), "name".to_string(), "note".to_string()];

    c.bench_function("find_projected", |b| {
        b.iter(|| csvdex::query::find(black_box(&index), &fields, "city:lyon", None))
    });
}

criterion_group!(
    benches,
    bench_query_parsing,
    bench_analyze,
    bench_indexing,
    bench_search,
    bench_find,
);

criterion_main!(benches);
