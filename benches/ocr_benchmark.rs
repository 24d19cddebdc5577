use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use ocrkit::{CtcDecoder, DbPostProcess, Dictionary, ScaleFactor};

/// Probability map with `rows` text lines of staggered widths, like a page of
/// body text after detection.
fn synthetic_map(width: usize, height: usize, rows: usize) -> Array2<f32> {
    let pitch = height / (rows + 1);
    Array2::from_shape_fn((height, width), |(y, x)| {
        let row = y / pitch;
        let in_band = y % pitch >= pitch / 4 && y % pitch < pitch * 3 / 4;
        let line_end = width - 16 - (row * 37) % (width / 3);
        if row >= 1 && row <= rows && in_band && x >= 16 && x < line_end {
            0.85
        } else {
            0.02
        }
    })
}

fn synthetic_logits(seq_len: usize, vocab: usize) -> Array2<f32> {
    Array2::from_shape_fn((seq_len, vocab), |(t, c)| {
        let target = if t % 3 == 0 { 0 } else { (t * 7) % vocab };
        if c == target {
            8.0
        } else {
            -1.0
        }
    })
}

fn benchmark_db_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("db_decode");
    group.sample_size(20);

    let db = DbPostProcess::default();
    for &(w, h, rows) in &[(640usize, 480usize, 12usize), (960, 960, 30)] {
        let map = synthetic_map(w, h, rows);
        group.bench_with_input(BenchmarkId::from_parameter(format!("{w}x{h}")), &map, |b, map| {
            b.iter(|| db.decode(black_box(map.view()), ScaleFactor::IDENTITY, w as u32, h as u32))
        });
    }

    group.finish();
}

fn benchmark_ctc_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("ctc_decode");

    let vocab = 6625;
    let tokens: Vec<String> = std::iter::once(String::new())
        .chain((1..vocab).map(|i| format!("t{i}")))
        .collect();
    let decoder = CtcDecoder::new(Dictionary::new(tokens));

    for &seq_len in &[40usize, 160] {
        let logits = synthetic_logits(seq_len, vocab);
        group.bench_with_input(BenchmarkId::from_parameter(seq_len), &logits, |b, logits| {
            b.iter(|| decoder.decode(black_box(logits.view())))
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_db_decode, benchmark_ctc_decode);
criterion_main!(benches);
