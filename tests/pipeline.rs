use acsift::{
    Colorspace, Criterion, DescriptorScheme, DescriptorType, Distance, GrayFloatImage,
    OrientationAlgorithm, RgbFloatImage, ScaleSpace, SchemeOptions, Sift, SiftConfig,
};
use log::*;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

/// Coloured Gaussian blobs of random size on a dark background.
fn random_blobs(seed: u64, width: usize, height: usize, count: usize) -> RgbFloatImage {
    let mut rng = Pcg64::seed_from_u64(seed);
    let blobs: Vec<(f32, f32, f32, [f32; 3])> = (0..count)
        .map(|_| {
            (
                rng.gen_range(0.0..width as f32),
                rng.gen_range(0.0..height as f32),
                rng.gen_range(1.5..5.0),
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

fn small_config() -> SiftConfig {
    SiftConfig {
        n_scale: 6,
        laplacian_threshold: 0.0,
        harris_threshold: 0.0,
        factor_size: 3.0,
        ..SiftConfig::default()
    }
}

fn all_schemes() -> Vec<DescriptorScheme> {
    vec![
        DescriptorScheme::default(),
        DescriptorScheme::new(
            "cemd",
            SchemeOptions {
                distance: Distance::Cemd,
                n_bin: 16,
                ..Default::default()
            },
        )
        .unwrap(),
        DescriptorScheme::new(
            "hue",
            SchemeOptions {
                sectors: Some(vec![1, 6]),
                kind: DescriptorType::WeightedHistograms,
                colorspace: Colorspace::Hsv,
                channels: vec![1, 0],
                normalize: true,
                relative_orientation: false,
                ..Default::default()
            },
        )
        .unwrap(),
    ]
}

#[test]
fn identical_images_match_themselves() {
    let _ = pretty_env_logger::try_init_timed();
    let image = random_blobs(7, 128, 128, 30);
    let mut sift = Sift::new(SiftConfig {
        criterion: Criterion::NnDt,
        descriptors: all_schemes(),
        ..small_config()
    });
    let first = sift.add_image(image.clone());
    let second = sift.add_image(image);
    sift.run().unwrap();
    let keypoints = sift.keypoints(first).unwrap();
    info!("{} keypoints", keypoints.len());
    assert!(!keypoints.is_empty());
    assert_eq!(keypoints.len(), sift.keypoints(second).unwrap().len());

    let matches = sift.compute_matches(first, second).unwrap();
    assert_eq!(matches.len(), keypoints.len());
    for m in &matches {
        assert_eq!(m.distance, 0.0);
        assert_eq!((m.query.x, m.query.y), (m.candidate.x, m.candidate.y));
    }
    // Sorted by distance and all below any positive threshold.
    assert_eq!(sift.match_images(first, second).unwrap().len(), matches.len());
}

#[test]
fn identical_images_under_a_contrario_criteria() {
    let _ = pretty_env_logger::try_init_timed();
    let image = random_blobs(11, 112, 112, 25);
    let mut sift = Sift::new(SiftConfig {
        criterion: Criterion::NnAc,
        orientation: OrientationAlgorithm::AContrario,
        ..small_config()
    });
    sift.add_image(image.clone());
    sift.add_image(image);
    sift.run().unwrap();
    let matches = sift.compute_matches(0, 1).unwrap();
    assert_eq!(matches.len(), sift.keypoints(0).unwrap().len());
    for m in &matches {
        assert_eq!(m.total_distance, 0.0);
        assert_eq!((m.query.x, m.query.y), (m.candidate.x, m.candidate.y));
    }
    let ordered = matches.windows(2).all(|w| w[0].distance <= w[1].distance);
    assert!(ordered);
}

#[test]
fn shifted_image_matches_shifted_keypoints() {
    let _ = pretty_env_logger::try_init_timed();
    let image = random_blobs(3, 140, 120, 30);
    let (dx, dy) = (9, 5);
    let mut shifted = RgbFloatImage::new(image.width() - dx, image.height() - dy);
    for c in 0..3 {
        for y in 0..shifted.height() {
            for x in 0..shifted.width() {
                let value = image.plane(c).get(x + dx, y + dy);
                shifted.plane_mut(c).put(x, y, value);
            }
        }
    }
    let mut sift = Sift::new(SiftConfig {
        criterion: Criterion::NnDr,
        match_threshold: 0.6,
        ..small_config()
    });
    sift.add_image(image);
    sift.add_image(shifted);
    sift.run().unwrap();
    let matches = sift.match_images(0, 1).unwrap();
    assert!(!matches.is_empty());
    let consistent = matches
        .iter()
        .filter(|m| m.query.x == m.candidate.x + dx && m.query.y == m.candidate.y + dy)
        .count();
    info!("{}/{} matches follow the shift", consistent, matches.len());
    assert!(consistent * 2 > matches.len());
}

#[test]
fn laplacian_threshold_shrinks_keypoints() {
    let mut scale_space = ScaleSpace::new(random_blobs(5, 96, 96, 20));
    scale_space
        .compute_scale_space(6, 1.6, 2f32.powf(1.0 / 3.0))
        .unwrap();
    let detected = scale_space.precompute_max_laplacian().unwrap().to_vec();
    let mut previous = detected.len();
    for threshold in [0.0, 0.005, 0.02, 0.05, 0.1, 0.2] {
        let kept = scale_space.laplacian_threshold(&detected, threshold);
        assert!(kept.len() <= previous);
        assert!(kept.iter().all(|k| k.laplacian.abs() > threshold));
        previous = kept.len();
    }
}

#[test]
fn detection_respects_level_bounds_and_sigmas() {
    let mut scale_space = ScaleSpace::new(random_blobs(9, 80, 64, 15));
    let (n, sigma_init, ratio) = (7, 1.2, 1.3);
    scale_space.compute_scale_space(n, sigma_init, ratio).unwrap();
    for (i, level) in scale_space.levels().iter().enumerate() {
        let expected = sigma_init * ratio.powi(i as i32);
        assert!((level.sigma - expected).abs() <= 1e-5 * expected);
    }
    let keypoints = scale_space.precompute_max_laplacian().unwrap().to_vec();
    assert!(!keypoints.is_empty());
    for keypoint in keypoints {
        assert!(keypoint.level >= 1 && keypoint.level <= n - 2);
        assert_eq!(keypoint.sigma, scale_space.levels()[keypoint.level].sigma);
    }
}
