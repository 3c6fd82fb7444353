use criterion::{Criterion, criterion_group, criterion_main};
use rag_router::documents::{Document, DocumentFormat};
use rag_router::embeddings::{ChunkingConfig, split};
use rag_router::index::EmbeddingIndex;
use std::hint::black_box;

const PARAGRAPH: &str = "Retrieval augmented generation pairs a search step with a language \
    model. Documents are split into overlapping segments! Each segment is embedded and stored \
    next to its vector. At query time the router decides which sources are worth asking? \
    The augmentor merges what comes back into a single prompt.";

fn sample_markdown() -> String {
    (0..200)
        .map(|i| format!("## Section {i}\n\n{PARAGRAPH}\n\n- item one\n- item two\n"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let text = DocumentFormat::Markdown.extract_text(&sample_markdown());
    let document = Document::new("bench.md", text);
    let config = ChunkingConfig::default();

    c.bench_function("chunking", |b| {
        b.iter(|| split(black_box(&document), black_box(&config)))
    });

    let segments = split(&document, &config).expect("sample splits");
    let dimension = 384;
    let vectors: Vec<Vec<f32>> = (0..segments.len())
        .map(|i| (0..dimension).map(|d| ((i * 31 + d * 7) % 97) as f32 / 97.0).collect())
        .collect();
    let mut index = EmbeddingIndex::new();
    index
        .insert_all(segments, vectors)
        .expect("vectors match segments");
    let query: Vec<f32> = (0..dimension).map(|d| (d % 13) as f32 / 13.0).collect();

    c.bench_function("index_query", |b| {
        b.iter(|| index.query(black_box(&query), black_box(2), black_box(0.5)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
