//! Image tensors and view transforms
//!
//! [`ImageTensor`] is the CHW image container used by vision datasets and
//! crop generation. [`ViewTransform`] is the seam between a data module and
//! whatever augmentation policy is installed on it: a transform maps one
//! raw image to either a single processed image or a multi-crop view set.

use crate::data::{DataError, Result};
use crate::transforms::MultiCropOutput;
use crate::Tensor;
use rand::rngs::StdRng;
use rand::Rng;

/// A dense CHW image of `f32` values.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageTensor {
    channels: usize,
    height: usize,
    width: usize,
    data: Vec<f32>,
}

impl ImageTensor {
    /// Create an image, validating that the buffer matches the shape.
    pub fn new(channels: usize, height: usize, width: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != channels * height * width {
            return Err(DataError::ImageShape {
                channels,
                height,
                width,
                got: data.len(),
            });
        }
        Ok(Self {
            channels,
            height,
            width,
            data,
        })
    }

    /// A zero-filled image.
    pub fn zeros(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
            data: vec![0.0; channels * height * width],
        }
    }

    /// Channel count.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Shape as `[channels, height, width]`.
    pub fn dims(&self) -> Vec<usize> {
        vec![self.channels, self.height, self.width]
    }

    /// Raw buffer, channel-major.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Pixel accessor.
    pub fn get(&self, c: usize, y: usize, x: usize) -> f32 {
        self.data[(c * self.height + y) * self.width + x]
    }

    /// Pixel mutator.
    pub fn set(&mut self, c: usize, y: usize, x: usize, value: f32) {
        self.data[(c * self.height + y) * self.width + x] = value;
    }

    /// Flatten into a grad-free tensor.
    pub fn to_tensor(&self) -> Tensor {
        Tensor::from_vec(self.data.clone(), false)
    }
}

/// Output of a view transform: one image, or a multi-crop view set.
#[derive(Clone, Debug)]
pub enum TransformedView {
    /// A single processed image.
    Image(ImageTensor),
    /// A multi-crop view set for instance-discrimination objectives.
    Views(MultiCropOutput),
}

/// A per-sample transform installed on a vision data module.
pub trait ViewTransform {
    /// Apply the transform to one raw image.
    fn apply(&self, image: &ImageTensor, rng: &mut StdRng) -> TransformedView;
}

/// Pass-through transform.
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl ViewTransform for Identity {
    fn apply(&self, image: &ImageTensor, _rng: &mut StdRng) -> TransformedView {
        TransformedView::Image(image.clone())
    }
}

/// Deterministic central crop to a fixed size, the usual evaluation-time
/// geometry. Requested sizes are clamped to the source dimensions.
#[derive(Clone, Copy, Debug)]
pub struct CenterCrop {
    height: usize,
    width: usize,
}

impl CenterCrop {
    /// Crop to `height` x `width`.
    pub fn new(height: usize, width: usize) -> Self {
        assert!(height > 0 && width > 0, "crop size must be > 0");
        Self { height, width }
    }
}

impl ViewTransform for CenterCrop {
    fn apply(&self, image: &ImageTensor, _rng: &mut StdRng) -> TransformedView {
        let h = self.height.min(image.height());
        let w = self.width.min(image.width());
        let top = (image.height() - h) / 2;
        let left = (image.width() - w) / 2;
        TransformedView::Image(crop(image, top, left, h, w))
    }
}

/// Per-channel affine normalization: `(x - mean[c]) / std[c]`.
#[derive(Clone, Debug)]
pub struct Normalize {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl Normalize {
    /// Create a per-channel normalization.
    ///
    /// # Panics
    ///
    /// Panics if `mean` and `std` differ in length or any `std` entry is
    /// not positive.
    pub fn new(mean: Vec<f32>, std: Vec<f32>) -> Self {
        assert_eq!(mean.len(), std.len(), "mean/std length mismatch");
        assert!(std.iter().all(|&s| s > 0.0), "std entries must be > 0");
        Self { mean, std }
    }
}

impl ViewTransform for Normalize {
    fn apply(&self, image: &ImageTensor, _rng: &mut StdRng) -> TransformedView {
        assert_eq!(
            image.channels(),
            self.mean.len(),
            "normalization channel count mismatch"
        );
        let mut out = image.clone();
        for c in 0..image.channels() {
            for y in 0..image.height() {
                for x in 0..image.width() {
                    let v = (image.get(c, y, x) - self.mean[c]) / self.std[c];
                    out.set(c, y, x, v);
                }
            }
        }
        TransformedView::Image(out)
    }
}

/// Cut a `crop_h` x `crop_w` window starting at (`top`, `left`).
pub(crate) fn crop(
    image: &ImageTensor,
    top: usize,
    left: usize,
    crop_h: usize,
    crop_w: usize,
) -> ImageTensor {
    let mut out = ImageTensor::zeros(image.channels(), crop_h, crop_w);
    for c in 0..image.channels() {
        for y in 0..crop_h {
            for x in 0..crop_w {
                out.set(c, y, x, image.get(c, top + y, left + x));
            }
        }
    }
    out
}

/// Nearest-neighbor resize.
pub(crate) fn resize_nearest(image: &ImageTensor, out_h: usize, out_w: usize) -> ImageTensor {
    let mut out = ImageTensor::zeros(image.channels(), out_h, out_w);
    for c in 0..image.channels() {
        for y in 0..out_h {
            let src_y = (y * image.height()) / out_h;
            for x in 0..out_w {
                let src_x = (x * image.width()) / out_w;
                out.set(c, y, x, image.get(c, src_y, src_x));
            }
        }
    }
    out
}

/// Sample a random crop covering an area fraction within `scale`, then
/// resize it to `out_h` x `out_w`.
///
/// The crop's aspect ratio follows the output's; the sampled window is
/// clamped to the source dimensions.
pub fn random_resized_crop(
    image: &ImageTensor,
    scale: (f64, f64),
    out_h: usize,
    out_w: usize,
    rng: &mut StdRng,
) -> ImageTensor {
    let (lo, hi) = scale;
    debug_assert!(lo > 0.0 && hi >= lo && hi <= 1.0, "invalid scale range");

    let src_h = image.height() as f64;
    let src_w = image.width() as f64;
    let area_frac = if (hi - lo).abs() < f64::EPSILON {
        lo
    } else {
        rng.gen_range(lo..hi)
    };
    let area = area_frac * src_h * src_w;
    let aspect = out_w as f64 / out_h as f64;

    let crop_w = ((area * aspect).sqrt().round() as usize).clamp(1, image.width());
    let crop_h = ((area / aspect).sqrt().round() as usize).clamp(1, image.height());

    let top = if crop_h < image.height() {
        rng.gen_range(0..=image.height() - crop_h)
    } else {
        0
    };
    let left = if crop_w < image.width() {
        rng.gen_range(0..=image.width() - crop_w)
    } else {
        0
    };

    let window = crop(image, top, left, crop_h, crop_w);
    resize_nearest(&window, out_h, out_w)
}
