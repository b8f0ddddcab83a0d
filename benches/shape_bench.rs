//! Shaping performance - plan compilation and the pipeline over real text
//!
//! Runs against a metrics-only font by default so the numbers measure the
//! orchestration itself. Point `OSHAPE_BENCH_FONT` at an OpenType file to
//! include a real font's capability queries and metrics.
//!
//! ```bash
//! OSHAPE_BENCH_FONT=/path/to/NotoSans-Regular.ttf cargo bench -p oshape
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use oshape::prelude::*;
use oshape_core::types::GlyphId;
use oshape_fontdb::Face;

/// Every character has a glyph of the same id
struct BenchFont;

impl Font for BenchFont {
    fn units_per_em(&self) -> u16 {
        1000
    }

    fn nominal_glyph(&self, cp: u32) -> Option<GlyphId> {
        Some(cp)
    }

    fn h_advance(&self, _glyph: GlyphId) -> i32 {
        500
    }

    fn cache_id(&self) -> Option<u64> {
        Some(0xBE)
    }
}

fn load_font() -> Box<dyn Font> {
    match std::env::var("OSHAPE_BENCH_FONT") {
        Ok(path) => match Face::from_file(&path) {
            Ok(face) => Box::new(face),
            Err(err) => {
                eprintln!("Falling back to metrics-only font: {err}");
                Box::new(BenchFont)
            }
        },
        Err(_) => Box::new(BenchFont),
    }
}

const SAMPLES: &[(&str, &str, Direction, Script)] = &[
    ("latin", "The quick brown fox jumps over the lazy dog. ", Direction::LeftToRight, Script::LATIN),
    ("latin_marks", "Cafe\u{0301} na\u{0308}ive re\u{0301}sume\u{0301} ", Direction::LeftToRight, Script::LATIN),
    ("hebrew", "\u{05E9}\u{05B8}\u{05C1}\u{05DC}\u{05D5}\u{05B9}\u{05DD} \u{05E2}\u{05D5}\u{05B9}\u{05DC}\u{05B8}\u{05DD} ", Direction::RightToLeft, Script::HEBREW),
    ("mixed", "Total 1234\u{2044}5678 (\u{05D0}\u{05D1}) \u{1F44B}\u{1F3FD} ", Direction::LeftToRight, Script::LATIN),
];

fn bench_compile(c: &mut Criterion) {
    let font = load_font();
    let features: Vec<Feature> = ["kern", "liga", "-clig", "smcp[3:9]"]
        .iter()
        .filter_map(|f| f.parse().ok())
        .collect();

    let mut group = c.benchmark_group("compile_plan");
    for &(name, _, direction, script) in SAMPLES {
        let props = SegmentProperties::new(direction, Some(script), None);
        group.bench_with_input(BenchmarkId::from_parameter(name), &props, |b, props| {
            b.iter(|| compile_plan(font.as_ref(), black_box(props), &features))
        });
    }
    group.finish();
}

fn bench_shape(c: &mut Criterion) {
    let font = load_font();
    let mut group = c.benchmark_group("shape");

    for &(name, sample, direction, script) in SAMPLES {
        let text = sample.repeat(8);
        let props = SegmentProperties::new(direction, Some(script), None);
        let Ok(plan) = compile_plan(font.as_ref(), &props, &[]) else {
            continue;
        };

        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &text, |b, text| {
            b.iter(|| {
                let mut buffer = GlyphBuffer::new();
                buffer.add_str(black_box(text));
                buffer.set_segment_properties(&props);
                shape(&plan, font.as_ref(), &mut buffer, &[]);
                buffer
            })
        });
    }
    group.finish();
}

/// The entry point with its plan cache warm
fn bench_ot_shaper(c: &mut Criterion) {
    let font = load_font();
    let shaper = OtShaper::with_config(ShaperConfig::default());
    let text = SAMPLES[0].1.repeat(8);

    c.bench_function("ot_shaper_cached_plan", |b| {
        b.iter(|| {
            let mut buffer = GlyphBuffer::new();
            buffer.add_str(black_box(&text));
            let _ = shaper.shape(font.as_ref(), &mut buffer, &[]);
            buffer
        })
    });
}

criterion_group!(benches, bench_compile, bench_shape, bench_ot_shaper);
criterion_main!(benches);
