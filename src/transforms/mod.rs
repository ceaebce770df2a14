//! Image views and multi-crop generation

mod image;
mod multicrop;

pub use image::{
    random_resized_crop, CenterCrop, Identity, ImageTensor, Normalize, TransformedView,
    ViewTransform,
};
pub use multicrop::{MultiCropOutput, MultiCropTransform, GLOBAL_CROPS};
