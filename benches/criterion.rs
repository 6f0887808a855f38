use acsift::image::{gaussian_kernel, horizontal_filter, vertical_filter};
use acsift::{GrayFloatImage, RgbFloatImage, ScaleSpace, Sift, SiftConfig};
use criterion::{criterion_group, criterion_main, Criterion};
use rand::Rng;
use rand_pcg::Pcg64;

/// Smooth random blobs on a dark background.
fn load_image() -> RgbFloatImage {
    let (width, height) = (256, 192);
    let mut rng = Pcg64::new(0xcafe_f00d_d15e_a5e5, 0xa02b_dbf7_bb3c_0a7);
    let blobs: Vec<(f32, f32, f32, [f32; 3])> = (0..40)
        .map(|_| {
            (
                rng.gen_range(0.0..width as f32),
                rng.gen_range(0.0..height as f32),
                rng.gen_range(2.0..8.0),
                [rng.gen(), rng.gen(), rng.gen()],
            )
        })
        .collect();
    let mut planes = [
        GrayFloatImage::new(width, height),
        GrayFloatImage::new(width, height),
        GrayFloatImage::new(width, height),
    ];
    for y in 0..height {
        for x in 0..width {
            for (c, plane) in planes.iter_mut().enumerate() {
                let value: f32 = blobs
                    .iter()
                    .map(|&(cx, cy, s, color)| {
                        let d2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
                        color[c] * (-d2 / (2.0 * s * s)).exp()
                    })
                    .sum();
                plane.put(x, y, value.min(1.0));
            }
        }
    }
    RgbFloatImage::from_planes(planes).unwrap()
}

fn bench_scale_space(c: &mut Criterion) {
    let image = load_image();
    let config = SiftConfig::default();
    c.bench_function("compute_scale_space", |b| {
        b.iter(|| {
            let mut scale_space = ScaleSpace::new(image.clone());
            scale_space
                .compute_scale_space(config.n_scale, config.sigma_init, config.scale_ratio)
                .unwrap();
            scale_space.precompute_max_laplacian().unwrap().len()
        })
    });
}

fn bench_extract(c: &mut Criterion) {
    let image = load_image();
    c.bench_function("extract", |b| {
        b.iter(|| {
            let mut sift = Sift::new(SiftConfig::sparse());
            sift.add_image(image.clone());
            sift.run().unwrap();
            sift.keypoints(0).unwrap().len()
        })
    });
}

criterion_group!(
    name = acsift;
    config = Criterion::default().sample_size(10);
    targets = bench_scale_space, bench_extract
);

fn bench_horizontal_filter(c: &mut Criterion) {
    let image = load_image().grayscale();
    let small_kernel = gaussian_kernel(1.0, 7);
    c.bench_function("horizontal_filter_small_kernel", |b| {
        b.iter(|| horizontal_filter(&image.0, &small_kernel))
    });
    let large_kernel = gaussian_kernel(10.0, 71);
    c.bench_function("horizontal_filter_large_kernel", |b| {
        b.iter(|| horizontal_filter(&image.0, &large_kernel))
    });
}

fn bench_vertical_filter(c: &mut Criterion) {
    let image = load_image().grayscale();
    let small_kernel = gaussian_kernel(1.0, 7);
    c.bench_function("vertical_filter_small_kernel", |b| {
        b.iter(|| vertical_filter(&image.0, &small_kernel))
    });
    let large_kernel = gaussian_kernel(10.0, 71);
    c.bench_function("vertical_filter_large_kernel", |b| {
        b.iter(|| vertical_filter(&image.0, &large_kernel))
    });
}

criterion_group!(
    name = acsift_image;
    config = Criterion::default().sample_size(10);
    targets = bench_horizontal_filter, bench_vertical_filter
);

criterion_main!(acsift, acsift_image);
