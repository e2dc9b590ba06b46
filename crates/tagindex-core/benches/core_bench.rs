//! Criterion benchmarks for tagindex-core.
//!
//! ## Benchmark groups
//!
//! 1. **schema** : DDL init + migration overhead.
//! 2. **extraction** : Tree-sitter snippet extraction per language.
//! 3. **reconcile** : Full Compute / AddTag / Delete passes on synthetic files.
//!
//! ## Running
//!
//! ```sh
//! cargo bench --manifest-path crates/tagindex-core/Cargo.toml
//! # Run only the reconcile group:
//! cargo bench --manifest-path crates/tagindex-core/Cargo.toml -- reconcile
//! ```

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rusqlite::Connection;

use tagindex_core::indexer::filesystem::compute_content_hash;
use tagindex_core::store::schema::{create_schema, migrate_schema, SCHEMA_STATEMENTS};
use tagindex_core::{
    CompletionLog, ExtractorRegistry, MemoryContentSource, PathAndFingerprint, Reconciler,
    RefreshDiff, Scope, SnippetExtractor, SnippetStore, TreeSitterExtractor,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn synthetic_go_file(i: usize, functions: usize) -> String {
    let mut src = format!("package pkg{i}\n\ntype Service{i} struct {{\n\tid int\n}}\n\n");
    for f in 0..functions {
        src.push_str(&format!(
            "func (s *Service{i}) Handle{f}(ctx context.Context, n int) (int, error) {{\n\
             \tif n > {f} {{\n\t\treturn n - {f}, nil\n\t}}\n\treturn n, nil\n}}\n\n"
        ));
    }
    src
}

/// Fill a memory source with `n` Go files; returns their diff keys.
fn populate_source(source: &MemoryContentSource, n: usize) -> Vec<PathAndFingerprint> {
    (0..n)
        .map(|i| {
            let path = format!("pkg{i}/service.go");
            let contents = synthetic_go_file(i, 8);
            let key = PathAndFingerprint::new(&path, compute_content_hash(contents.as_bytes()));
            source.insert(path, contents);
            key
        })
        .collect()
}

fn reconciler_with(source: Arc<MemoryContentSource>) -> Reconciler {
    let store = Arc::new(SnippetStore::open_in_memory().unwrap());
    Reconciler::new(store, source, ExtractorRegistry::with_defaults())
}

// ---------------------------------------------------------------------------
// Benchmark: Schema initialization & migration
// ---------------------------------------------------------------------------

fn bench_schema_init(c: &mut Criterion) {
    c.bench_function("schema_init_and_migrate", |b| {
        b.iter(|| {
            let conn = Connection::open_in_memory().unwrap();
            conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
            create_schema(&conn).unwrap();
            black_box(&conn);
        });
    });
}

fn bench_schema_ddl_only(c: &mut Criterion) {
    c.bench_function("schema_ddl_statements_only", |b| {
        b.iter(|| {
            let conn = Connection::open_in_memory().unwrap();
            for stmt in SCHEMA_STATEMENTS {
                conn.execute_batch(stmt).unwrap();
            }
            black_box(&conn);
        });
    });
}

fn bench_schema_migration_on_existing(c: &mut Criterion) {
    c.bench_function("schema_migration_noop_on_current", |b| {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        b.iter(|| {
            migrate_schema(black_box(&conn)).unwrap();
        });
    });
}

// ---------------------------------------------------------------------------
// Benchmark: Tree-sitter extraction
// ---------------------------------------------------------------------------

fn bench_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("extraction");
    let extractor = TreeSitterExtractor::new();

    for functions in [4usize, 32, 128] {
        let src = synthetic_go_file(0, functions);
        group.bench_with_input(BenchmarkId::new("go", functions), &src, |b, src| {
            b.iter(|| extractor.extract(black_box("pkg/service.go"), black_box(src)).unwrap());
        });
    }

    let python = (0..32)
        .map(|i| format!("class Model{i}:\n    def run(self, x):\n        return x + {i}\n\n"))
        .collect::<String>();
    group.bench_function("python_32_classes", |b| {
        b.iter(|| extractor.extract(black_box("models.py"), black_box(&python)).unwrap());
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: Reconciliation
// ---------------------------------------------------------------------------

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    group.sample_size(20);
    let main = Scope::code_snippets("/bench", "main");
    let feature = Scope::code_snippets("/bench", "feature");

    for n in [50usize, 200] {
        let source = Arc::new(MemoryContentSource::new());
        let keys = populate_source(&source, n);
        let compute = RefreshDiff {
            compute: keys.clone(),
            ..Default::default()
        };

        group.bench_with_input(BenchmarkId::new("compute_fresh", n), &compute, |b, diff| {
            b.iter_batched(
                || reconciler_with(source.clone()),
                |reconciler| {
                    reconciler
                        .reconcile(&main, diff, &mut CompletionLog::new())
                        .unwrap()
                },
                BatchSize::SmallInput,
            );
        });

        // Second branch over identical contents: reuse only, no extraction.
        group.bench_with_input(BenchmarkId::new("compute_reused", n), &compute, |b, diff| {
            b.iter_batched(
                || {
                    let reconciler = reconciler_with(source.clone());
                    reconciler
                        .reconcile(&main, diff, &mut CompletionLog::new())
                        .unwrap();
                    reconciler
                },
                |reconciler| {
                    reconciler
                        .reconcile(&feature, diff, &mut CompletionLog::new())
                        .unwrap()
                },
                BatchSize::SmallInput,
            );
        });

        let delete = RefreshDiff {
            delete: keys.clone(),
            ..Default::default()
        };
        group.bench_with_input(BenchmarkId::new("delete_all", n), &delete, |b, diff| {
            b.iter_batched(
                || {
                    let reconciler = reconciler_with(source.clone());
                    reconciler
                        .reconcile(&main, &compute, &mut CompletionLog::new())
                        .unwrap();
                    reconciler
                },
                |reconciler| {
                    reconciler
                        .reconcile(&main, diff, &mut CompletionLog::new())
                        .unwrap()
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Register all benchmark groups
// ---------------------------------------------------------------------------

criterion_group!(
    benches,
    bench_schema_init,
    bench_schema_ddl_only,
    bench_schema_migration_on_existing,
    bench_extraction,
    bench_reconcile,
);
criterion_main!(benches);
