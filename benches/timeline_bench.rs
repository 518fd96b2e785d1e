//! Benchmarks for timeline assembly and background loop planning.
//!
//! Run with: `cargo bench --bench timeline_bench`

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use slidecast::slideshow::{
    AudioAsset, CaptionUnit, SpeechSegment, TimelineBuilder, TransitionAsset,
};
use slidecast::AudioLoopBuilder;
use tempfile::TempDir;

/// `units` captioned images, three segments each, a new group every 4 units.
///
/// Segments are returned in reverse so the builder has to sort them.
fn fixture(dir: &TempDir, units: usize) -> (Vec<CaptionUnit>, Vec<SpeechSegment>) {
    let image = dir.path().join("slide.jpg");
    std::fs::write(&image, b"x").unwrap();

    let units: Vec<CaptionUnit> = (0..units)
        .map(|i| {
            CaptionUnit::new(
                (i / 4).to_string(),
                &image,
                ["first line", "second line", "third line"],
            )
        })
        .collect();

    let mut segments = Vec::with_capacity(units.len() * 3);
    for (unit_index, unit) in units.iter().enumerate() {
        for (sequence_index, text) in unit.narrated_segments() {
            segments.push(SpeechSegment {
                unit_index,
                group_id: unit.group_id.clone(),
                sequence_index,
                audio: AudioAsset::new(
                    format!("/speech/{unit_index}_{sequence_index}.mp3"),
                    Duration::from_millis(700 + (unit_index as u64 * 37) % 900),
                ),
                source_text: text.to_string(),
            });
        }
    }
    segments.reverse();

    (units, segments)
}

fn bench_timeline_build(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let transition = dir.path().join("transition.mp4");
    std::fs::write(&transition, b"x").unwrap();
    let builder =
        TimelineBuilder::new().with_transition(TransitionAsset::new(&transition, Duration::from_secs(1)));

    let mut group = c.benchmark_group("timeline_build");
    for units in [10usize, 100, 1000] {
        let (units_vec, segments) = fixture(&dir, units);
        group.throughput(Throughput::Elements(segments.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(units), &units, |b, _| {
            b.iter(|| {
                builder
                    .build(black_box(&units_vec), black_box(segments.clone()))
                    .unwrap()
            });
        });
    }
    group.finish();
}

fn bench_loop_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("loop_plan");
    let target = Duration::from_secs(600);
    for source_ms in [250u64, 3_000, 180_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(source_ms),
            &source_ms,
            |b, &ms| {
                b.iter(|| AudioLoopBuilder::plan(black_box(Duration::from_millis(ms)), target).unwrap());
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_timeline_build, bench_loop_plan);
criterion_main!(benches);
