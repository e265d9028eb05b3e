use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mirror_cam::capture::{convert, PixelFormat, RawBuffer};
use mirror_cam::presenter::FrameSlot;

fn synthetic(format: PixelFormat, width: u32, height: u32) -> RawBuffer {
    let len = format.expected_len(width, height).unwrap_or_default();
    let data = (0..len).map(|i| (i % 251) as u8).collect();
    RawBuffer::new(data, width, height, format)
}

fn bench_convert(c: &mut Criterion) {
    let mut group = c.benchmark_group("convert_640x480");
    for format in [
        PixelFormat::Yuyv,
        PixelFormat::Nv12,
        PixelFormat::Gray8,
        PixelFormat::Rgb24,
        PixelFormat::Bgra32,
    ] {
        let buffer = synthetic(format, 640, 480);
        let id = BenchmarkId::from_parameter(format!("{format:?}"));
        group.bench_with_input(id, &buffer, |b, buffer| {
            b.iter(|| convert(black_box(buffer), 1))
        });
    }
    group.finish();
}

fn bench_publish(c: &mut Criterion) {
    let slot = FrameSlot::new();
    let _reader = slot.subscribe();
    let frame = convert(&synthetic(PixelFormat::Yuyv, 640, 480), 1).expect("valid buffer");

    c.bench_function("slot_publish", |b| b.iter(|| slot.publish(black_box(frame.clone()))));
}

criterion_group!(benches, bench_convert, bench_publish);
criterion_main!(benches);
