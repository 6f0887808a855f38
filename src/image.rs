use crate::{Error, Result};
use derive_more::{Deref, DerefMut};
use image::{DynamicImage, ImageBuffer, Luma};
use log::*;
use ndarray::{azip, s, Array2, ArrayView2, ArrayViewMut2};
use nshare::{MutNdarray2, RefNdarray2};
use std::f32;
use std::path::Path;
use wide::f32x4;

pub type GrayImageBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

/// A single-channel image with samples in `[0, 1]`.
///
/// The buffer is the image crate's `ImageBuffer`, so loading and saving stay
/// with the image crate, while filters work directly on the contiguous
/// storage and the ndarray views handed out by [`GrayFloatImage::ref_array2`].
#[derive(Debug, Clone, Deref, DerefMut)]
pub struct GrayFloatImage(pub GrayImageBuffer);

impl GrayFloatImage {
    pub fn from_array2(arr: Array2<f32>) -> Self {
        let arr = if arr.is_standard_layout() {
            arr
        } else {
            arr.as_standard_layout().into_owned()
        };
        let (height, width) = arr.dim();
        Self(
            ImageBuffer::from_raw(width as u32, height as u32, arr.into_raw_vec())
                .expect("raw vector didn't have enough pixels for the image"),
        )
    }

    pub fn ref_array2(&self) -> ArrayView2<f32> {
        self.0.ref_ndarray2()
    }

    pub fn mut_array2(&mut self) -> ArrayViewMut2<f32> {
        self.0.mut_ndarray2()
    }

    pub fn zero_array(&self) -> Array2<f32> {
        Array2::zeros((self.height(), self.width()))
    }

    pub fn width(&self) -> usize {
        self.0.width() as usize
    }

    pub fn height(&self) -> usize {
        self.0.height() as usize
    }

    pub fn new(width: usize, height: usize) -> Self {
        Self(ImageBuffer::from_pixel(
            width as u32,
            height as u32,
            Luma([0.0]),
        ))
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.get_pixel(x as u32, y as u32)[0]
    }

    pub fn put(&mut self, x: usize, y: usize, pixel_value: f32) {
        self.put_pixel(x as u32, y as u32, Luma([pixel_value]));
    }

    /// Copy the `width x height` window whose top left corner is `(x0, y0)`.
    ///
    /// The window must lie inside the image.
    pub fn crop(&self, x0: usize, y0: usize, width: usize, height: usize) -> Array2<f32> {
        self.ref_array2()
            .slice(s![y0..y0 + height, x0..x0 + width])
            .to_owned()
    }
}

/// An RGB image stored as three planar [`GrayFloatImage`]s.
#[derive(Debug, Clone)]
pub struct RgbFloatImage {
    planes: [GrayFloatImage; 3],
}

impl RgbFloatImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            planes: [
                GrayFloatImage::new(width, height),
                GrayFloatImage::new(width, height),
                GrayFloatImage::new(width, height),
            ],
        }
    }

    /// Build an RGB image from three planes of equal size.
    pub fn from_planes(planes: [GrayFloatImage; 3]) -> Result<Self> {
        let dim = (planes[0].width(), planes[0].height());
        for plane in &planes[1..] {
            if (plane.width(), plane.height()) != dim {
                return Err(Error::ShapeMismatch {
                    expected: vec![dim.1, dim.0],
                    found: vec![plane.height(), plane.width()],
                });
            }
        }
        Ok(Self { planes })
    }

    /// Convert any image the image crate can decode. Gray inputs are
    /// replicated into the three channels.
    pub fn from_dynamic(input_image: &DynamicImage) -> Self {
        let rgb = input_image.to_rgb32f();
        let (width, height) = (rgb.width() as usize, rgb.height() as usize);
        info!("Loaded a {} x {} RGB image", width, height);
        let mut image = Self::new(width, height);
        for (x, y, pixel) in rgb.enumerate_pixels() {
            for (plane, &value) in image.planes.iter_mut().zip(pixel.0.iter()) {
                plane.put(x as usize, y as usize, value);
            }
        }
        image
    }

    /// Open and decode an image from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_dynamic(&image::open(path)?))
    }

    pub fn width(&self) -> usize {
        self.planes[0].width()
    }

    pub fn height(&self) -> usize {
        self.planes[0].height()
    }

    pub fn plane(&self, channel: usize) -> &GrayFloatImage {
        &self.planes[channel]
    }

    pub fn plane_mut(&mut self, channel: usize) -> &mut GrayFloatImage {
        &mut self.planes[channel]
    }

    /// Blur each channel with the same isotropic Gaussian.
    pub fn gaussian_blur(&self, sigma: f32) -> Self {
        Self {
            planes: [
                gaussian_blur(&self.planes[0], sigma),
                gaussian_blur(&self.planes[1], sigma),
                gaussian_blur(&self.planes[2], sigma),
            ],
        }
    }

    /// Luma with Rec. 601 weights.
    pub fn grayscale(&self) -> GrayFloatImage {
        let mut gray = self.planes[0].zero_array();
        azip!((
            out in &mut gray,
            &r in self.planes[0].ref_array2(),
            &g in self.planes[1].ref_array2(),
            &b in self.planes[2].ref_array2(),
        ) {
            *out = 0.299 * r + 0.587 * g + 0.114 * b;
        });
        GrayFloatImage::from_array2(gray)
    }
}

/// Pack a kernel into SIMD lanes, zero padding the last lane group.
fn simd_kernel(kernel: &[f32]) -> Vec<f32x4> {
    kernel
        .chunks(4)
        .map(|chunk| {
            let mut lanes = [0f32; 4];
            lanes[..chunk.len()].copy_from_slice(chunk);
            f32x4::new(lanes)
        })
        .collect()
}

pub fn horizontal_filter(image: &GrayImageBuffer, kernel: &[f32]) -> GrayImageBuffer {
    debug_assert!(kernel.len() % 2 == 1);
    let half = kernel.len() / 2;
    let width = image.width() as usize;
    let height = image.height() as usize;
    let mut output = vec![0.0; width * height];
    if width == 0 || height == 0 {
        return GrayImageBuffer::from_raw(width as u32, height as u32, output).unwrap();
    }
    let kernel_simd = simd_kernel(kernel);
    let window = 4 * kernel_simd.len();
    // The row is padded with replicated edges on both sides, plus zeros so
    // that every window holds a whole number of lanes.
    let mut scratch = vec![0f32; width + 2 * half + (window - kernel.len())];
    for (row_in, row_out) in image
        .as_raw()
        .chunks_exact(width)
        .zip(output.chunks_exact_mut(width))
    {
        scratch[..half].fill(row_in[0]);
        scratch[half..half + width].copy_from_slice(row_in);
        scratch[half + width..2 * half + width].fill(row_in[width - 1]);
        scratch[2 * half + width..].fill(0.0);
        for (samples, out) in scratch.windows(window).zip(row_out.iter_mut()) {
            *out = samples
                .chunks_exact(4)
                .zip(kernel_simd.iter())
                .fold(f32x4::splat(0.0), |acc, (lane, k)| {
                    f32x4::new([lane[0], lane[1], lane[2], lane[3]]).mul_add(*k, acc)
                })
                .reduce_add();
        }
    }
    GrayImageBuffer::from_raw(width as u32, height as u32, output).unwrap()
}

/// Correlate every column with `kernel`, replicating the first and last rows
/// past the border. Rows are accumulated whole so the inner loop runs over
/// contiguous memory.
pub fn vertical_filter(image: &GrayImageBuffer, kernel: &[f32]) -> GrayImageBuffer {
    debug_assert!(kernel.len() % 2 == 1);
    let half = kernel.len() / 2;
    let width = image.width() as usize;
    let height = image.height() as usize;
    let mut output = vec![0.0; width * height];
    if width == 0 || height == 0 {
        return GrayImageBuffer::from_raw(width as u32, height as u32, output).unwrap();
    }
    let input = image.as_raw();
    let lanes = width / 4 * 4;
    for (y, row_out) in output.chunks_exact_mut(width).enumerate() {
        for (k, &weight) in kernel.iter().enumerate() {
            let source = (y + k).saturating_sub(half).min(height - 1);
            let row_in = &input[source * width..(source + 1) * width];
            let weight_simd = f32x4::splat(weight);
            for (out, sample) in row_out[..lanes]
                .chunks_exact_mut(4)
                .zip(row_in[..lanes].chunks_exact(4))
            {
                let acc = f32x4::new([out[0], out[1], out[2], out[3]]);
                let sample = f32x4::new([sample[0], sample[1], sample[2], sample[3]]);
                out.copy_from_slice(&sample.mul_add(weight_simd, acc).to_array());
            }
            for (out, &sample) in row_out[lanes..].iter_mut().zip(&row_in[lanes..]) {
                *out += sample * weight;
            }
        }
    }
    GrayImageBuffer::from_raw(width as u32, height as u32, output).unwrap()
}

pub fn separable_filter(
    image: &GrayImageBuffer,
    h_kernel: &[f32],
    v_kernel: &[f32],
) -> GrayImageBuffer {
    let h = horizontal_filter(image, h_kernel);
    vertical_filter(&h, v_kernel)
}

/// The Gaussian function.
fn gaussian(x: f32, r: f32) -> f32 {
    ((2.0 * f32::consts::PI).sqrt() * r).recip() * (-x.powi(2) / (2.0 * r.powi(2))).exp()
}

/// Generate a normalised Gaussian kernel of std `r` and odd length `kernel_size`.
pub fn gaussian_kernel(r: f32, kernel_size: usize) -> Vec<f32> {
    assert!(kernel_size % 2 == 1, "kernel_size must be odd");
    let half_width = (kernel_size / 2) as i32;
    let mut kernel: Vec<f32> = (-half_width..=half_width)
        .map(|i| gaussian(i as f32, r))
        .collect();
    let sum: f32 = kernel.iter().sum();
    for val in kernel.iter_mut() {
        *val /= sum;
    }
    kernel
}

/// Below this std a blur is the identity at pixel resolution.
const MIN_BLUR_SIGMA: f32 = 1e-3;

/// Perform an isotropic Gaussian blur of std `r`, truncated at three sigma.
pub fn gaussian_blur(image: &GrayFloatImage, r: f32) -> GrayFloatImage {
    assert!(r >= 0.0, "sigma must be >= 0.0");
    if r < MIN_BLUR_SIGMA {
        return image.clone();
    }
    let kernel_radius = (3.0 * r).ceil() as usize;
    let kernel = gaussian_kernel(r, kernel_radius * 2 + 1);
    GrayFloatImage(separable_filter(image, &kernel, &kernel))
}
