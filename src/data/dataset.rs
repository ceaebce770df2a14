//! Datasets with optional target and sensitive-attribute columns

use crate::data::{DataError, Result};
use crate::transforms::ImageTensor;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Backing storage for dataset inputs.
pub trait InputStore: Clone {
    /// Number of samples held.
    fn len(&self) -> usize;

    /// Whether the store is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-sample shape.
    fn sample_dims(&self) -> Vec<usize>;

    /// Select samples by index, in order.
    fn select(&self, indices: &[usize]) -> Self;

    /// Concatenate with another store of the same sample shape.
    fn concat(&self, other: &Self) -> Self;
}

/// Tabular features: one row per sample.
#[derive(Clone, Debug)]
pub struct TabularStore {
    features: Array2<f32>,
}

impl TabularStore {
    /// Wrap a feature matrix.
    pub fn new(features: Array2<f32>) -> Self {
        Self { features }
    }

    /// The feature matrix.
    pub fn features(&self) -> &Array2<f32> {
        &self.features
    }

    /// One sample's features.
    pub fn row(&self, index: usize) -> ndarray::ArrayView1<'_, f32> {
        self.features.row(index)
    }
}

impl InputStore for TabularStore {
    fn len(&self) -> usize {
        self.features.nrows()
    }

    fn sample_dims(&self) -> Vec<usize> {
        vec![self.features.ncols()]
    }

    fn select(&self, indices: &[usize]) -> Self {
        Self {
            features: self.features.select(Axis(0), indices),
        }
    }

    fn concat(&self, other: &Self) -> Self {
        assert_eq!(
            self.features.ncols(),
            other.features.ncols(),
            "cannot concatenate stores with different sample shapes"
        );
        let stacked = ndarray::concatenate(
            Axis(0),
            &[self.features.view(), other.features.view()],
        )
        .expect("column counts checked above");
        Self { features: stacked }
    }
}

/// Vision inputs: one image per sample, uniform shape.
#[derive(Clone, Debug)]
pub struct ImageStore {
    images: Vec<ImageTensor>,
}

impl ImageStore {
    /// Wrap a list of images, validating that all share one shape.
    pub fn new(images: Vec<ImageTensor>) -> Result<Self> {
        if let Some(first) = images.first() {
            let dims = first.dims();
            for (i, image) in images.iter().enumerate() {
                if image.dims() != dims {
                    return Err(DataError::InvalidConfig(format!(
                        "image {i} has shape {:?}, expected {dims:?}",
                        image.dims()
                    )));
                }
            }
        }
        Ok(Self { images })
    }

    /// One sample's image.
    pub fn image(&self, index: usize) -> &ImageTensor {
        &self.images[index]
    }
}

impl InputStore for ImageStore {
    fn len(&self) -> usize {
        self.images.len()
    }

    fn sample_dims(&self) -> Vec<usize> {
        self.images.first().map_or_else(Vec::new, ImageTensor::dims)
    }

    fn select(&self, indices: &[usize]) -> Self {
        Self {
            images: indices.iter().map(|&i| self.images[i].clone()).collect(),
        }
    }

    fn concat(&self, other: &Self) -> Self {
        assert_eq!(
            self.sample_dims(),
            other.sample_dims(),
            "cannot concatenate stores with different sample shapes"
        );
        let mut images = self.images.clone();
        images.extend(other.images.iter().cloned());
        Self { images }
    }
}

/// The three splits produced by a data module's setup.
#[derive(Clone, Debug)]
pub struct TrainValTestSplit<X: InputStore> {
    pub train: TaggedDataset<X>,
    pub val: TaggedDataset<X>,
    pub test: TaggedDataset<X>,
}

/// A dataset pairing inputs with optional target (`y`) and sensitive
/// attribute (`s`) columns.
#[derive(Clone, Debug)]
pub struct TaggedDataset<X: InputStore> {
    x: X,
    y: Option<Array1<i64>>,
    s: Option<Array1<i64>>,
}

impl<X: InputStore> TaggedDataset<X> {
    /// Create a dataset, validating column lengths against the store.
    pub fn new(x: X, y: Option<Array1<i64>>, s: Option<Array1<i64>>) -> Result<Self> {
        if x.is_empty() {
            return Err(DataError::EmptyDataset);
        }
        if let Some(y) = &y {
            if y.len() != x.len() {
                return Err(DataError::LengthMismatch {
                    name: "y",
                    expected: x.len(),
                    got: y.len(),
                });
            }
        }
        if let Some(s) = &s {
            if s.len() != x.len() {
                return Err(DataError::LengthMismatch {
                    name: "s",
                    expected: x.len(),
                    got: s.len(),
                });
            }
        }
        Ok(Self { x, y, s })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// The input store.
    pub fn x(&self) -> &X {
        &self.x
    }

    /// The target column, if present.
    pub fn y(&self) -> Option<&Array1<i64>> {
        self.y.as_ref()
    }

    /// The sensitive-attribute column, if present.
    pub fn s(&self) -> Option<&Array1<i64>> {
        self.s.as_ref()
    }

    /// Per-sample input shape.
    pub fn sample_dims(&self) -> Vec<usize> {
        self.x.sample_dims()
    }

    /// Number of distinct target values.
    ///
    /// # Panics
    ///
    /// Panics when the dataset has no target column.
    pub fn card_y(&self) -> usize {
        let y = self
            .y
            .as_ref()
            .expect("card_y cannot be determined: dataset has no target column");
        distinct(y)
    }

    /// Number of distinct sensitive-attribute values.
    ///
    /// # Panics
    ///
    /// Panics when the dataset has no sensitive-attribute column.
    pub fn card_s(&self) -> usize {
        let s = self
            .s
            .as_ref()
            .expect("card_s cannot be determined: dataset has no sensitive-attribute column");
        distinct(s)
    }

    /// Subset by index, preserving column presence.
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            x: self.x.select(indices),
            y: self.y.as_ref().map(|y| select_column(y, indices)),
            s: self.s.as_ref().map(|s| select_column(s, indices)),
        }
    }

    /// Randomly split into val/test/train by proportion.
    ///
    /// Proportions must be non-negative and sum to at most 1; the remainder
    /// becomes the training split. The permutation is fully determined by
    /// `seed`, and the three splits partition the dataset.
    pub fn random_split(
        &self,
        val_prop: f64,
        test_prop: f64,
        seed: u64,
    ) -> Result<TrainValTestSplit<X>> {
        if val_prop < 0.0 || test_prop < 0.0 || val_prop + test_prop > 1.0 {
            return Err(DataError::InvalidProportions {
                val: val_prop,
                test: test_prop,
            });
        }

        let n = self.len();
        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let n_val = (val_prop * n as f64) as usize;
        let n_test = (test_prop * n as f64) as usize;

        let val = self.subset(&indices[..n_val]);
        let test = self.subset(&indices[n_val..n_val + n_test]);
        let train = self.subset(&indices[n_val + n_test..]);
        Ok(TrainValTestSplit { train, val, test })
    }

    /// Concatenate with another dataset of the same shape.
    ///
    /// # Panics
    ///
    /// Panics when the two datasets disagree on the presence of `y` or `s`.
    pub fn cat(&self, other: &Self) -> Self {
        assert_eq!(
            self.y.is_some(),
            other.y.is_some(),
            "cannot concatenate datasets that disagree on target presence"
        );
        assert_eq!(
            self.s.is_some(),
            other.s.is_some(),
            "cannot concatenate datasets that disagree on attribute presence"
        );
        Self {
            x: self.x.concat(&other.x),
            y: concat_columns(self.y.as_ref(), other.y.as_ref()),
            s: concat_columns(self.s.as_ref(), other.s.as_ref()),
        }
    }
}

fn distinct(values: &Array1<i64>) -> usize {
    let mut seen: Vec<i64> = values.iter().copied().collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

fn select_column(column: &Array1<i64>, indices: &[usize]) -> Array1<i64> {
    Array1::from_vec(indices.iter().map(|&i| column[i]).collect())
}

fn concat_columns(a: Option<&Array1<i64>>, b: Option<&Array1<i64>>) -> Option<Array1<i64>> {
    match (a, b) {
        (Some(a), Some(b)) => {
            let mut merged = a.to_vec();
            merged.extend(b.iter().copied());
            Some(Array1::from_vec(merged))
        }
        _ => None,
    }
}

/// Tabular dataset alias.
pub type TabularDataset = TaggedDataset<TabularStore>;

/// Vision dataset alias.
pub type VisionDataset = TaggedDataset<ImageStore>;

impl TabularDataset {
    /// Randomly generated tabular data, for tests and demos.
    pub fn synthetic(
        num_samples: usize,
        num_features: usize,
        y_card: Option<usize>,
        s_card: Option<usize>,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let features = Array2::from_shape_fn((num_samples, num_features), |_| {
            rng.gen_range(-1.0f32..1.0)
        });
        let y = y_card.map(|card| random_labels(num_samples, card, &mut rng));
        let s = s_card.map(|card| random_labels(num_samples, card, &mut rng));
        Self::new(TabularStore::new(features), y, s).expect("columns generated to length")
    }
}

impl VisionDataset {
    /// Randomly generated image data, for tests and demos.
    pub fn synthetic(
        num_samples: usize,
        channels: usize,
        height: usize,
        width: usize,
        y_card: Option<usize>,
        s_card: Option<usize>,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let images = (0..num_samples)
            .map(|_| {
                let data = (0..channels * height * width)
                    .map(|_| rng.gen_range(0.0f32..1.0))
                    .collect();
                ImageTensor::new(channels, height, width, data)
                    .expect("buffer generated to shape")
            })
            .collect();
        let y = y_card.map(|card| random_labels(num_samples, card, &mut rng));
        let s = s_card.map(|card| random_labels(num_samples, card, &mut rng));
        Self::new(
            ImageStore::new(images).expect("uniform shape by construction"),
            y,
            s,
        )
        .expect("columns generated to length")
    }
}

fn random_labels(n: usize, card: usize, rng: &mut StdRng) -> Array1<i64> {
    // Guarantee every class appears so cardinality matches the request.
    let mut labels: Vec<i64> = (0..n).map(|i| (i % card) as i64).collect();
    labels.shuffle(rng);
    Array1::from_vec(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeled_dataset(n: usize) -> TabularDataset {
        TabularDataset::synthetic(n, 4, Some(2), Some(2), 0)
    }

    #[test]
    fn test_split_partitions_dataset() {
        let ds = labeled_dataset(100);
        let split = ds.random_split(0.2, 0.1, 7).unwrap();
        assert_eq!(split.val.len(), 20);
        assert_eq!(split.test.len(), 10);
        assert_eq!(split.train.len(), 70);
        assert_eq!(split.train.len() + split.val.len() + split.test.len(), 100);
    }

    #[test]
    fn test_split_is_deterministic() {
        let ds = labeled_dataset(50);
        let a = ds.random_split(0.2, 0.2, 3).unwrap();
        let b = ds.random_split(0.2, 0.2, 3).unwrap();
        assert_eq!(a.train.y().unwrap(), b.train.y().unwrap());
        assert_eq!(a.val.y().unwrap(), b.val.y().unwrap());
    }

    #[test]
    fn test_split_rejects_bad_proportions() {
        let ds = labeled_dataset(10);
        assert!(matches!(
            ds.random_split(0.8, 0.4, 0),
            Err(DataError::InvalidProportions { .. })
        ));
        assert!(matches!(
            ds.random_split(-0.1, 0.4, 0),
            Err(DataError::InvalidProportions { .. })
        ));
    }

    #[test]
    fn test_cat_concatenates_columns_in_order() {
        let a = labeled_dataset(10);
        let b = labeled_dataset(6);
        let merged = a.cat(&b);

        assert_eq!(merged.len(), 16);
        let expected_y: Vec<i64> = a
            .y()
            .unwrap()
            .iter()
            .chain(b.y().unwrap().iter())
            .copied()
            .collect();
        assert_eq!(merged.y().unwrap().to_vec(), expected_y);
        let expected_s: Vec<i64> = a
            .s()
            .unwrap()
            .iter()
            .chain(b.s().unwrap().iter())
            .copied()
            .collect();
        assert_eq!(merged.s().unwrap().to_vec(), expected_s);
    }

    #[test]
    fn test_cardinalities() {
        let ds = TabularDataset::synthetic(30, 4, Some(3), Some(2), 1);
        assert_eq!(ds.card_y(), 3);
        assert_eq!(ds.card_s(), 2);
    }

    #[test]
    #[should_panic(expected = "no sensitive-attribute column")]
    fn test_card_s_panics_without_attribute() {
        TabularDataset::synthetic(10, 4, Some(2), None, 0).card_s();
    }

    #[test]
    fn test_length_validation() {
        let store = TabularStore::new(Array2::zeros((5, 2)));
        let err = TaggedDataset::new(store, Some(Array1::zeros(3)), None).unwrap_err();
        assert!(matches!(err, DataError::LengthMismatch { name: "y", .. }));
    }

    #[test]
    fn test_subset_preserves_columns() {
        let ds = labeled_dataset(10);
        let sub = ds.subset(&[0, 3, 5]);
        assert_eq!(sub.len(), 3);
        assert_eq!(sub.y().unwrap().len(), 3);
        assert_eq!(sub.y().unwrap()[1], ds.y().unwrap()[3]);
    }
}
