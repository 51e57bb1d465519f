use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use inference::extract;
use inference::processing::PostProcessor;
use inference::{ClassNames, RawDetectionResult};
use ndarray::{Array, IxDyn};
use preprocess::LetterboxTransform;

const NUM_CLASSES: usize = 80;

/// Mock `[1, 84, anchors]` YOLO output with `num_objects` confident boxes,
/// each predicted by three neighboring anchors.
fn create_mock_yolo_output(num_anchors: usize, num_objects: usize) -> Array<f32, IxDyn> {
    let channels = 4 + NUM_CLASSES;
    let mut data = vec![0.0f32; channels * num_anchors];
    let mut rng = fastrand::Rng::with_seed(42);

    for object in 0..num_objects {
        let cx = rng.f32() * 900.0 + 30.0;
        let cy = rng.f32() * 900.0 + 30.0;
        let class = rng.usize(0..NUM_CLASSES);
        for duplicate in 0..3 {
            let anchor = (object * 3 + duplicate) % num_anchors;
            let jitter = duplicate as f32;
            data[anchor] = cx + jitter;
            data[num_anchors + anchor] = cy - jitter;
            data[2 * num_anchors + anchor] = 40.0;
            data[3 * num_anchors + anchor] = 40.0;
            data[(4 + class) * num_anchors + anchor] = 0.9 - 0.1 * jitter;
        }
    }

    Array::from_shape_vec(IxDyn(&[1, channels, num_anchors]), data).unwrap()
}

fn identity_transform() -> LetterboxTransform {
    LetterboxTransform {
        orig_width: 960,
        orig_height: 960,
        input_width: 960,
        input_height: 960,
        scale: 1.0,
        offset_x: 0.0,
        offset_y: 0.0,
    }
}

fn benchmark_postprocess(c: &mut Criterion) {
    let mut group = c.benchmark_group("postprocess");
    let post = PostProcessor::new(0.184, 0.7, 300);
    let transform = identity_transform();

    // 960px input produces 18900 anchors
    for num_objects in [0, 10, 100, 300] {
        let output = create_mock_yolo_output(18_900, num_objects);

        group.bench_with_input(
            BenchmarkId::new("decode_nms", num_objects),
            &output,
            |b, output| {
                b.iter(|| {
                    post.parse_detections(black_box(&output.view()), NUM_CLASSES, &transform)
                        .unwrap()
                })
            },
        );
    }

    group.finish();
}

fn benchmark_extract(c: &mut Criterion) {
    let names = ClassNames::from_labels((0..NUM_CLASSES).map(|i| format!("class_{i}"))).unwrap();
    let post = PostProcessor::new(0.184, 0.7, 300);
    let output = create_mock_yolo_output(18_900, 300);
    let records = post
        .parse_detections(&output.view(), NUM_CLASSES, &identity_transform())
        .unwrap();

    let raw = RawDetectionResult {
        source_path: "bench.png".into(),
        image: image::RgbImage::new(1, 1),
        records,
    };

    c.bench_function("extract_counts_300", |b| {
        b.iter(|| extract(black_box(&raw), &names))
    });
}

criterion_group!(benches, benchmark_postprocess, benchmark_extract);
criterion_main!(benches);
