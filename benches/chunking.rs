use criterion::{Criterion, criterion_group, criterion_main};
use semantic_code_mcp::chunker::chunk_file;
use std::hint::black_box;

fn synthetic_typescript(functions: usize) -> String {
    let mut source = String::new();
    for i in 0..functions {
        source.push_str(&format!(
            r#"
/** Handler number {i} with a short doc comment. */
export function handler{i}(input: string, limit: number): string {{
    const trimmed = input.trim();
    const bounded = trimmed.slice(0, limit);
    return bounded.toUpperCase();
}}
"#
        ));
    }
    source
}

fn synthetic_rust(functions: usize) -> String {
    let mut source = String::new();
    for i in 0..functions {
        source.push_str(&format!(
            r#"
/// Handler number {i} with a short doc comment.
pub fn handler_{i}(input: &str, limit: usize) -> String {{
    let trimmed = input.trim();
    let bounded = &trimmed[..trimmed.len().min(limit)];
    bounded.to_uppercase()
}}
"#
        ));
    }
    source
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let typescript = synthetic_typescript(200);
    let rust = synthetic_rust(200);
    let plain: String = (0..2000).map(|i| format!("record {i}\n")).collect();

    c.bench_function("chunk_typescript", |b| {
        b.iter(|| chunk_file(black_box("/repo/src/big.ts"), black_box(&typescript)))
    });
    c.bench_function("chunk_rust", |b| {
        b.iter(|| chunk_file(black_box("/repo/src/big.rs"), black_box(&rust)))
    });
    c.bench_function("chunk_fallback", |b| {
        b.iter(|| chunk_file(black_box("/repo/data/records.log"), black_box(&plain)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
