use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use voxcast::playback::{PlaybackIndexer, find_word_at};
use voxcast::transcript::{ChapterMarker, TranscriptDocument, TranscriptWord};

/// Transcript of `count` words with a short gap after every tenth word.
fn transcript(count: usize) -> Vec<TranscriptWord> {
    let mut words = Vec::with_capacity(count);
    let mut t = 0.0;
    for i in 0..count {
        let start = t;
        let end = start + 0.28;
        words.push(TranscriptWord::new(format!("w{}", i), start, end));
        t = if i % 10 == 9 { end + 0.15 } else { end };
    }
    words
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_word_at");
    for count in [1_000usize, 10_000, 100_000] {
        let words = transcript(count);
        let end = words.last().map(|w| w.end_ts).unwrap_or(0.0);
        // Positions spread over the whole timeline, including gaps
        let positions: Vec<f64> = (0..256).map(|i| end * i as f64 / 256.0).collect();

        group.bench_with_input(BenchmarkId::from_parameter(count), &words, |b, words| {
            b.iter(|| {
                for &position in &positions {
                    black_box(find_word_at(black_box(words), position));
                }
            })
        });
    }
    group.finish();

    // Play-head updates at 4 Hz through a long transcript with chapters
    let words = transcript(20_000);
    let markers: Vec<ChapterMarker> = (0..20)
        .map(|i| ChapterMarker::new(format!("Chapter {}", i), i * 5_000))
        .collect();
    let document = match TranscriptDocument::build("bench", words, &markers) {
        Ok(document) => document,
        Err(e) => panic!("failed to build transcript: {}", e),
    };
    let duration = document.duration_seconds();

    c.bench_function("playback_indexer_on_position", |b| {
        let mut indexer = PlaybackIndexer::new(document.clone());
        let mut position = 0.0;
        b.iter(|| {
            position = if position >= duration { 0.0 } else { position + 0.25 };
            black_box(indexer.on_position(black_box(position)))
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
