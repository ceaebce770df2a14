//! Data module configuration and shared lifecycle
//!
//! A data module owns a source dataset and its train/val/test splits, and
//! produces batches under a declarative configuration. The lifecycle is
//! `prepare()` (one-time materialization) then `setup()` (deterministic
//! split) then loaders; each stage is idempotent and order is enforced.

use crate::data::dataset::{InputStore, TaggedDataset, TrainValTestSplit};
use crate::data::loader::{
    sequential_batches, shuffled_batches, stratified_batches, weighted_batches,
};
use crate::data::{DataError, Result};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::rc::Rc;

/// How the training loader iterates: one full pass per epoch, or a fixed
/// number of batches (cycling) regardless of dataset size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingMode {
    /// One full pass over the training split per epoch.
    Epoch,
    /// Exactly this many batches per epoch, cycling when the split is
    /// smaller.
    Step(usize),
}

/// Declarative configuration shared by all data modules.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataModuleConfig {
    /// Training batch size.
    pub train_batch_size: usize,
    /// Validation/test batch size; falls back to the training size.
    pub eval_batch_size: Option<usize>,
    /// Fraction of the source dataset held out for validation.
    pub val_prop: f64,
    /// Fraction of the source dataset held out for testing.
    pub test_prop: f64,
    /// Worker count for the external parallel-loading collaborator.
    pub num_workers: usize,
    /// Seed for splitting and batch shuffling.
    pub seed: u64,
    /// Keep loader workers alive across epochs (collaborator flag).
    pub persist_workers: bool,
    /// Pin loader memory (collaborator flag).
    pub pin_memory: bool,
    /// Preserve group proportions within every training batch.
    pub stratified_sampling: bool,
    /// Draw training samples weighted inversely to group frequency.
    pub instance_weighting: bool,
    /// Training iteration mode.
    pub training_mode: TrainingMode,
}

impl Default for DataModuleConfig {
    fn default() -> Self {
        Self {
            train_batch_size: 64,
            eval_batch_size: None,
            val_prop: 0.2,
            test_prop: 0.2,
            num_workers: 0,
            seed: 47,
            persist_workers: false,
            pin_memory: true,
            stratified_sampling: false,
            instance_weighting: false,
            training_mode: TrainingMode::Epoch,
        }
    }
}

impl DataModuleConfig {
    /// Validate invariants: positive batch size, legal proportions, and at
    /// most one special sampling mode.
    pub fn validate(&self) -> Result<()> {
        if self.train_batch_size == 0 {
            return Err(DataError::InvalidConfig(
                "train_batch_size must be > 0".to_string(),
            ));
        }
        if let Some(eval) = self.eval_batch_size {
            if eval == 0 {
                return Err(DataError::InvalidConfig(
                    "eval_batch_size must be > 0".to_string(),
                ));
            }
        }
        if self.val_prop < 0.0 || self.test_prop < 0.0 || self.val_prop + self.test_prop > 1.0 {
            return Err(DataError::InvalidProportions {
                val: self.val_prop,
                test: self.test_prop,
            });
        }
        if self.stratified_sampling && self.instance_weighting {
            return Err(DataError::InvalidConfig(
                "stratified_sampling and instance_weighting are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }

    /// Pure copy-with-overrides for evaluation-time loading: stratified
    /// sampling disabled, full-epoch iteration forced, and the training
    /// batch size optionally replaced. The receiver is untouched.
    pub fn eval_overrides(&self, train_batch_override: Option<usize>) -> Self {
        Self {
            stratified_sampling: false,
            instance_weighting: false,
            training_mode: TrainingMode::Epoch,
            train_batch_size: train_batch_override.unwrap_or(self.train_batch_size),
            ..self.clone()
        }
    }
}

/// Dataset ownership, split state, and index planning shared by the
/// concrete data modules.
#[derive(Clone)]
pub(crate) struct DataModuleCore<X: InputStore> {
    config: DataModuleConfig,
    source: Rc<TaggedDataset<X>>,
    prepared: bool,
    splits: Option<Rc<TrainValTestSplit<X>>>,
    draw: Cell<u64>,
}

impl<X: InputStore> DataModuleCore<X> {
    pub(crate) fn new(source: TaggedDataset<X>, config: DataModuleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            source: Rc::new(source),
            prepared: false,
            splits: None,
            draw: Cell::new(0),
        })
    }

    pub(crate) fn config(&self) -> &DataModuleConfig {
        &self.config
    }

    pub(crate) fn config_mut(&mut self) -> &mut DataModuleConfig {
        &mut self.config
    }

    pub(crate) fn sample_dims(&self) -> Vec<usize> {
        self.source.sample_dims()
    }

    pub(crate) fn source(&self) -> &TaggedDataset<X> {
        &self.source
    }

    /// One-time materialization. Idempotent.
    pub(crate) fn prepare(&mut self) {
        self.prepared = true;
    }

    pub(crate) fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Compute the splits from the configured seed and proportions.
    /// Idempotent: a second call leaves the existing splits in place.
    ///
    /// # Panics
    ///
    /// Panics if called before [`prepare`](Self::prepare).
    pub(crate) fn setup(&mut self) -> Result<()> {
        assert!(
            self.prepared,
            "setup() called before prepare(); the data module lifecycle is prepare -> setup -> loaders"
        );
        if self.splits.is_none() {
            let split = self.source.random_split(
                self.config.val_prop,
                self.config.test_prop,
                self.config.seed,
            )?;
            self.splits = Some(Rc::new(split));
        }
        Ok(())
    }

    /// The computed splits.
    ///
    /// # Panics
    ///
    /// Panics if called before [`setup`](Self::setup).
    pub(crate) fn splits(&self) -> &TrainValTestSplit<X> {
        self.splits
            .as_deref()
            .expect("loaders requested before setup(); call prepare() and setup() first")
    }

    /// A fresh RNG for one loader pass; successive passes differ, but the
    /// sequence is fully determined by the configured seed.
    pub(crate) fn next_rng(&self) -> StdRng {
        let draw = self.draw.get();
        self.draw.set(draw + 1);
        StdRng::seed_from_u64(self.config.seed.wrapping_add(draw.wrapping_mul(0x9e37_79b9)))
    }

    /// Index batches for one training pass, honoring shuffling, the special
    /// sampling modes, and the training-mode budget.
    ///
    /// # Panics
    ///
    /// Panics when a special sampling mode is requested but the training
    /// split carries neither a sensitive-attribute nor a target column.
    pub(crate) fn train_index_batches(&self) -> Vec<Vec<usize>> {
        let train = &self.splits().train;
        let batch_size = self.config.train_batch_size;
        let mut rng = self.next_rng();

        let batches = if self.config.instance_weighting {
            weighted_batches(self.sampling_groups(train), batch_size, &mut rng)
        } else if self.config.stratified_sampling {
            stratified_batches(self.sampling_groups(train), batch_size, &mut rng)
        } else {
            shuffled_batches(train.len(), batch_size, &mut rng)
        };

        match self.config.training_mode {
            TrainingMode::Epoch => batches,
            TrainingMode::Step(n) => {
                if batches.is_empty() {
                    batches
                } else {
                    batches.into_iter().cycle().take(n).collect()
                }
            }
        }
    }

    fn sampling_groups<'a>(&self, train: &'a TaggedDataset<X>) -> &'a Array1<i64> {
        train.s().or_else(|| train.y()).expect(
            "stratified or weighted sampling requires a sensitive-attribute or target column",
        )
    }

    /// Sequential index batches over `len` samples at the evaluation batch
    /// size.
    pub(crate) fn eval_index_batches(&self, len: usize) -> Vec<Vec<usize>> {
        let batch_size = self
            .config
            .eval_batch_size
            .unwrap_or(self.config.train_batch_size);
        sequential_batches(len, batch_size)
    }

    /// Shallow evaluation copy: shares the source dataset and splits,
    /// diverges only in the overridden configuration. The original module
    /// is left untouched.
    pub(crate) fn eval_core(&self, train_batch_override: Option<usize>) -> Self {
        Self {
            config: self.config.eval_overrides(train_batch_override),
            source: Rc::clone(&self.source),
            prepared: self.prepared,
            splits: self.splits.clone(),
            draw: Cell::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::TabularDataset;

    fn core(config: DataModuleConfig) -> DataModuleCore<crate::data::dataset::TabularStore> {
        DataModuleCore::new(TabularDataset::synthetic(40, 3, Some(2), Some(2), 0), config).unwrap()
    }

    #[test]
    fn test_lifecycle_order_enforced() {
        let mut dm = core(DataModuleConfig::default());
        dm.prepare();
        dm.setup().unwrap();
        assert_eq!(dm.splits().train.len(), 24);
    }

    #[test]
    #[should_panic(expected = "setup() called before prepare()")]
    fn test_setup_before_prepare_panics() {
        let mut dm = core(DataModuleConfig::default());
        dm.setup().unwrap();
    }

    #[test]
    fn test_setup_is_idempotent() {
        let mut dm = core(DataModuleConfig::default());
        dm.prepare();
        dm.setup().unwrap();
        let first: Vec<i64> = dm.splits().train.y().unwrap().to_vec();
        dm.setup().unwrap();
        assert_eq!(dm.splits().train.y().unwrap().to_vec(), first);
    }

    #[test]
    fn test_config_validation_rejects_dual_sampling() {
        let config = DataModuleConfig {
            stratified_sampling: true,
            instance_weighting: true,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_eval_overrides_are_pure() {
        let base = DataModuleConfig {
            stratified_sampling: true,
            training_mode: TrainingMode::Step(50),
            train_batch_size: 32,
            ..Default::default()
        };
        let eval = base.eval_overrides(Some(256));

        assert!(!eval.stratified_sampling);
        assert_eq!(eval.training_mode, TrainingMode::Epoch);
        assert_eq!(eval.train_batch_size, 256);
        // Base is unchanged
        assert!(base.stratified_sampling);
        assert_eq!(base.training_mode, TrainingMode::Step(50));
        assert_eq!(base.train_batch_size, 32);
    }

    #[test]
    fn test_step_mode_cycles_batches() {
        let config = DataModuleConfig {
            train_batch_size: 10,
            training_mode: TrainingMode::Step(9),
            ..Default::default()
        };
        let mut dm = core(config);
        dm.prepare();
        dm.setup().unwrap();
        // 24 train samples / batch 10 -> 3 batches per pass, cycled to 9.
        assert_eq!(dm.train_index_batches().len(), 9);
    }

    #[test]
    fn test_eval_core_shares_splits() {
        let mut dm = core(DataModuleConfig {
            stratified_sampling: true,
            ..Default::default()
        });
        dm.prepare();
        dm.setup().unwrap();

        let eval = dm.eval_core(None);
        assert!(!eval.config().stratified_sampling);
        assert_eq!(
            eval.splits().train.y().unwrap(),
            dm.splits().train.y().unwrap()
        );
        // The original keeps its own sampling configuration.
        assert!(dm.config().stratified_sampling);
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = DataModuleConfig {
            training_mode: TrainingMode::Step(100),
            eval_batch_size: Some(512),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: DataModuleConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.training_mode, TrainingMode::Step(100));
        assert_eq!(back.eval_batch_size, Some(512));
    }
}
