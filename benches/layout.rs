use criterion::{black_box, criterion_group, criterion_main, Criterion, BenchmarkId};
use camgrab_rs::acquisition::{
    AcquisitionConfig, CapturedFrame, FrameBuffer, PixelFormat, PixelFormatConverter,
    StandardConverter, StandardTiffWriter, TiffCompression, TiffWriter,
    simulated::render_test_pattern,
};
use std::io::Cursor;

fn mock_frame(width: usize, height: usize, format: PixelFormat) -> CapturedFrame {
    CapturedFrame {
        width,
        height,
        pixel_format: format,
        data: render_test_pattern(1, width, height, format),
        image_number: 1,
        grab_succeeded: true,
    }
}

fn benchmark_transposition(c: &mut Criterion) {
    let mut group = c.benchmark_group("transpose_by_format");

    let cases = vec![
        (PixelFormat::Mono8, "mono8"),
        (PixelFormat::Mono16, "mono16"),
        (PixelFormat::RGB8, "rgb8"),
        (PixelFormat::Mono32f, "mono32f"),
    ];

    for (format, label) in cases {
        let frame = mock_frame(640, 480, format);

        group.bench_with_input(BenchmarkId::from_parameter(label), &frame, |b, frame| {
            let mut buffer = FrameBuffer::for_format(640, 480, format, 1).unwrap();
            b.iter(|| {
                buffer.write_frame(0, black_box(frame)).unwrap();
            });
        });
    }

    group.finish();
}

fn benchmark_conversion(c: &mut Criterion) {
    let mut group = c.benchmark_group("conversion");
    let converter = StandardConverter;

    let cases = vec![
        (PixelFormat::BayerRG8, PixelFormat::RGB8, "bayer_rg8_to_rgb8"),
        (PixelFormat::Mono12p, PixelFormat::Mono16, "mono12p_to_mono16"),
        (PixelFormat::RGB8, PixelFormat::Mono8, "rgb8_to_mono8"),
    ];

    for (source, target, label) in cases {
        let frame = mock_frame(640, 480, source);
        group.bench_with_input(BenchmarkId::from_parameter(label), &frame, |b, frame| {
            b.iter(|| converter.convert(black_box(frame), target).unwrap());
        });
    }

    group.finish();
}

fn benchmark_compression_methods(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression_methods");
    let frame = mock_frame(640, 480, PixelFormat::Mono16);
    let writer = StandardTiffWriter;

    let compressions = vec![
        (TiffCompression::None, "none"),
        (TiffCompression::Lzw, "lzw"),
        (TiffCompression::DeflateFast, "deflate-fast"),
        (TiffCompression::DeflateBalanced, "deflate"),
    ];

    for (compression, label) in compressions {
        let config = AcquisitionConfig::builder().compression(compression).build();
        group.bench_with_input(BenchmarkId::from_parameter(label), &config, |b, config| {
            b.iter(|| {
                let mut output = Cursor::new(Vec::new());
                writer.write_tiff(black_box(&frame), &mut output, config).unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_transposition,
    benchmark_conversion,
    benchmark_compression_methods
);
criterion_main!(benches);
