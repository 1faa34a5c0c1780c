use asi_frame_pipe::{
    capture::{FrameBuffer, PixelFormat},
    overlay::{draw_text, FrameStatus, OverlayStyle},
};
use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn status() -> FrameStatus {
    FrameStatus {
        timestamp: Utc.with_ymd_and_hms(2026, 10, 19, 21, 4, 5).unwrap(),
        gain: 70,
        exposure_us: 100_000,
        frame: 123_456,
        dropped: 12,
        temperature_tenths: 215,
    }
}

fn bench_overlay(c: &mut Criterion) {
    let style = OverlayStyle::default();
    let line = status().to_string();

    let mut raw8 = FrameBuffer::new(1280, 960, PixelFormat::Raw8);
    c.bench_function("draw_status_raw8", |b| {
        b.iter(|| draw_text(&mut raw8, black_box(&line), &style))
    });

    let mut raw16 = FrameBuffer::new(1280, 960, PixelFormat::Raw16);
    c.bench_function("draw_status_raw16", |b| {
        b.iter(|| draw_text(&mut raw16, black_box(&line), &style))
    });

    c.bench_function("format_status", |b| {
        let status = status();
        b.iter(|| black_box(&status).to_string())
    });
}

criterion_group!(benches, bench_overlay);
criterion_main!(benches);
