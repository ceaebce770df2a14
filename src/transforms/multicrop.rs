//! Multi-crop view generation
//!
//! Produces the fixed pair of global crops plus a configurable number of
//! smaller local crops from one source image. The output is the unit of
//! exchange between the data layer and instance-discrimination objectives,
//! at two granularities: per-sample (each crop one flattened CHW image) and
//! batch-level (each crop a collated batch, same ordering).

use crate::transforms::image::{random_resized_crop, ImageTensor, TransformedView, ViewTransform};
use crate::Tensor;
use rand::rngs::StdRng;

/// Number of global crops every view set carries; contrastive objectives
/// rely on at least two.
pub const GLOBAL_CROPS: usize = 2;

/// Ordered global and local crop lists.
#[derive(Clone, Debug)]
pub struct MultiCropOutput {
    /// Fixed-size global crops; always at least two.
    pub global_crops: Vec<Tensor>,
    /// Smaller local crops; possibly empty.
    pub local_crops: Vec<Tensor>,
}

impl MultiCropOutput {
    /// Build a view set from exactly two global crops.
    pub fn pair(first: Tensor, second: Tensor) -> Self {
        Self {
            global_crops: vec![first, second],
            local_crops: Vec::new(),
        }
    }

    /// Total number of views.
    pub fn num_views(&self) -> usize {
        self.global_crops.len() + self.local_crops.len()
    }

    /// Panic unless the global-crop invariant holds.
    pub fn assert_contrastive(&self) {
        assert!(
            self.global_crops.len() >= GLOBAL_CROPS,
            "contrastive objectives require >= {GLOBAL_CROPS} global crops, got {}",
            self.global_crops.len()
        );
    }
}

/// Multi-crop view generator.
///
/// Global crop size defaults to the data module's native sample size and is
/// resolved when the transform is installed; local crop size is derived from
/// the global size by `local_size_factor`. Scale ranges bound the area
/// fraction of the source image each crop may cover.
#[derive(Clone, Debug)]
pub struct MultiCropTransform {
    global_crop_size: Option<(usize, usize)>,
    local_size_factor: f64,
    global_scale: (f64, f64),
    local_scale: (f64, f64),
    local_crop_count: usize,
}

impl Default for MultiCropTransform {
    fn default() -> Self {
        Self {
            global_crop_size: None,
            local_size_factor: 0.43,
            global_scale: (0.4, 1.0),
            local_scale: (0.05, 0.4),
            local_crop_count: 0,
        }
    }
}

impl MultiCropTransform {
    /// Generator with default geometry and no local crops.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the global crop size instead of inheriting the data
    /// module's native size.
    pub fn with_global_crop_size(mut self, height: usize, width: usize) -> Self {
        assert!(height > 0 && width > 0, "global crop size must be > 0");
        self.global_crop_size = Some((height, width));
        self
    }

    /// Set the local-to-global size factor.
    pub fn with_local_size_factor(mut self, factor: f64) -> Self {
        assert!(
            factor > 0.0 && factor <= 1.0,
            "local size factor must be in (0, 1], got {factor}"
        );
        self.local_size_factor = factor;
        self
    }

    /// Set the global crop area-fraction range.
    pub fn with_global_scale(mut self, lo: f64, hi: f64) -> Self {
        assert!(lo > 0.0 && hi >= lo && hi <= 1.0, "invalid global scale");
        self.global_scale = (lo, hi);
        self
    }

    /// Set the local crop area-fraction range.
    pub fn with_local_scale(mut self, lo: f64, hi: f64) -> Self {
        assert!(lo > 0.0 && hi >= lo && hi <= 1.0, "invalid local scale");
        self.local_scale = (lo, hi);
        self
    }

    /// Set the number of local crops per sample.
    pub fn with_local_crop_count(mut self, count: usize) -> Self {
        self.local_crop_count = count;
        self
    }

    /// Fill in the global crop size from the data module's sample dims
    /// (`[channels, height, width]`) when no override was given.
    pub fn resolve_global_size(&mut self, sample_dims: &[usize]) {
        assert_eq!(
            sample_dims.len(),
            3,
            "multi-crop requires [channels, height, width] sample dims, got {sample_dims:?}"
        );
        if self.global_crop_size.is_none() {
            self.global_crop_size = Some((sample_dims[1], sample_dims[2]));
        }
    }

    /// The resolved global crop size.
    ///
    /// # Panics
    ///
    /// Panics if the size was neither overridden nor resolved against a
    /// data module.
    pub fn global_crop_size(&self) -> (usize, usize) {
        self.global_crop_size
            .expect("global crop size is unresolved; install the transform or set an override")
    }

    /// Local crop size: per-dimension `round(global * local_size_factor)`.
    pub fn local_crop_size(&self) -> (usize, usize) {
        let (gh, gw) = self.global_crop_size();
        let h = (gh as f64 * self.local_size_factor).round() as usize;
        let w = (gw as f64 * self.local_size_factor).round() as usize;
        (h.max(1), w.max(1))
    }

    /// Number of local crops per sample.
    pub fn local_crop_count(&self) -> usize {
        self.local_crop_count
    }
}

impl ViewTransform for MultiCropTransform {
    fn apply(&self, image: &ImageTensor, rng: &mut StdRng) -> TransformedView {
        let (gh, gw) = self.global_crop_size();
        let (lh, lw) = self.local_crop_size();

        let global_crops = (0..GLOBAL_CROPS)
            .map(|_| random_resized_crop(image, self.global_scale, gh, gw, rng).to_tensor())
            .collect();
        let local_crops = (0..self.local_crop_count)
            .map(|_| random_resized_crop(image, self.local_scale, lh, lw, rng).to_tensor())
            .collect();

        TransformedView::Views(MultiCropOutput {
            global_crops,
            local_crops,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn sample_image() -> ImageTensor {
        let data: Vec<f32> = (0..3 * 16 * 16).map(|i| i as f32 * 0.01).collect();
        ImageTensor::new(3, 16, 16, data).unwrap()
    }

    #[test]
    fn test_always_two_global_crops() {
        let mut transform = MultiCropTransform::new().with_local_crop_count(3);
        transform.resolve_global_size(&[3, 16, 16]);

        let mut rng = StdRng::seed_from_u64(1);
        let TransformedView::Views(views) = transform.apply(&sample_image(), &mut rng) else {
            panic!("multi-crop must yield views");
        };
        views.assert_contrastive();
        assert_eq!(views.global_crops.len(), 2);
        assert_eq!(views.local_crops.len(), 3);
        assert_eq!(views.num_views(), 5);
    }

    #[test]
    fn test_local_size_is_scaled_global_size() {
        let transform = MultiCropTransform::new().with_global_crop_size(224, 224);
        assert_eq!(transform.local_crop_size(), (96, 96));
    }

    #[test]
    fn test_resolve_prefers_override() {
        let mut transform = MultiCropTransform::new().with_global_crop_size(8, 8);
        transform.resolve_global_size(&[3, 16, 16]);
        assert_eq!(transform.global_crop_size(), (8, 8));

        let mut inherited = MultiCropTransform::new();
        inherited.resolve_global_size(&[3, 16, 16]);
        assert_eq!(inherited.global_crop_size(), (16, 16));
    }

    #[test]
    fn test_crop_lengths_match_channel_count() {
        let mut transform = MultiCropTransform::new().with_local_crop_count(1);
        transform.resolve_global_size(&[3, 16, 16]);

        let mut rng = StdRng::seed_from_u64(2);
        let TransformedView::Views(views) = transform.apply(&sample_image(), &mut rng) else {
            panic!("multi-crop must yield views");
        };
        let (gh, gw) = transform.global_crop_size();
        let (lh, lw) = transform.local_crop_size();
        assert_eq!(views.global_crops[0].len(), 3 * gh * gw);
        assert_eq!(views.local_crops[0].len(), 3 * lh * lw);
    }

    #[test]
    #[should_panic(expected = "unresolved")]
    fn test_unresolved_size_panics() {
        MultiCropTransform::new().global_crop_size();
    }

    #[test]
    #[should_panic(expected = "global crops")]
    fn test_contrastive_invariant() {
        let views = MultiCropOutput {
            global_crops: vec![Tensor::zeros(4, false)],
            local_crops: Vec::new(),
        };
        views.assert_contrastive();
    }
}
