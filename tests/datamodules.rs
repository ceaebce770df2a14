//! Data module integration tests

use sondear::data::{
    BatchInput, DataModule, DataModuleConfig, TabularDataModule, TabularDataset,
    VisionDataModule, VisionDataset,
};

const BATCH_SIZE: usize = 4;

fn tabular_module(stratified: bool) -> DataModule {
    let config = DataModuleConfig {
        train_batch_size: BATCH_SIZE,
        stratified_sampling: stratified,
        ..Default::default()
    };
    let mut dm: DataModule = TabularDataModule::new(
        TabularDataset::synthetic(100, 6, Some(2), Some(2), 0),
        config,
    )
    .unwrap()
    .into();
    dm.prepare();
    dm.setup().unwrap();
    dm
}

fn vision_module() -> DataModule {
    let config = DataModuleConfig {
        train_batch_size: BATCH_SIZE,
        ..Default::default()
    };
    let mut dm: DataModule = VisionDataModule::new(
        VisionDataset::synthetic(40, 3, 8, 8, Some(2), Some(2), 1),
        config,
    )
    .unwrap()
    .into();
    dm.prepare();
    dm.setup().unwrap();
    dm
}

#[test]
fn tabular_batches_carry_all_columns() {
    let dm = tabular_module(false);
    let batch = &dm.train_batches()[0];

    let BatchInput::Flat(x) = batch.x() else {
        panic!("tabular batches must be flat");
    };
    assert_eq!(x.len(), BATCH_SIZE * 6);
    assert_eq!(batch.y().unwrap().len(), BATCH_SIZE);
    assert_eq!(batch.s().unwrap().len(), BATCH_SIZE);
}

#[test]
fn stratified_batches_keep_rows_consistent() {
    let dm = tabular_module(true);
    let mut total = 0;
    for batch in dm.train_batches() {
        let BatchInput::Flat(x) = batch.x() else {
            panic!("tabular batches must be flat");
        };
        let rows = x.len() / 6;
        assert_eq!(batch.y().unwrap().len(), rows);
        assert_eq!(batch.s().unwrap().len(), rows);
        total += rows;
    }
    assert_eq!(total, 60);
}

#[test]
fn vision_eval_batches_are_flat_and_sized() {
    let dm = vision_module();
    let batch = &dm.val_batches()[0];
    let BatchInput::Flat(x) = batch.x() else {
        panic!("identity eval transform must collate flat batches");
    };
    assert_eq!(x.len(), BATCH_SIZE * 3 * 8 * 8);
    assert_eq!(batch.s().unwrap().len(), BATCH_SIZE);
}

#[test]
fn module_dimensions_and_cardinalities() {
    let dm = tabular_module(false);
    assert_eq!(dm.sample_dims(), vec![6]);
    assert_eq!(dm.sample_size(), 6);
    assert_eq!(dm.card_y(), 2);
    assert_eq!(dm.card_s(), 2);

    let dm = vision_module();
    assert_eq!(dm.sample_dims(), vec![3, 8, 8]);
    assert_eq!(dm.sample_size(), 3 * 8 * 8);
}

#[test]
fn splits_partition_and_setup_is_idempotent() {
    let dataset = TabularDataset::synthetic(100, 6, Some(2), Some(2), 0);
    let config = DataModuleConfig::default();

    let mut first = TabularDataModule::new(dataset.clone(), config.clone()).unwrap();
    first.prepare();
    first.setup().unwrap();
    first.setup().unwrap();

    let mut second = TabularDataModule::new(dataset, config).unwrap();
    second.prepare();
    second.setup().unwrap();

    // Same seed, same splits, twice-setup or once.
    let labels = |dm: &TabularDataModule| -> Vec<f32> {
        dm.val_batches()
            .iter()
            .flat_map(|b| b.y().unwrap().to_vec())
            .collect()
    };
    assert_eq!(labels(&first), labels(&second));
    assert_eq!(first.train_len(), 60);
}

#[test]
fn train_passes_cover_the_whole_split() {
    let dm = tabular_module(false);
    let total: usize = dm
        .train_batches()
        .iter()
        .map(|b| b.y().unwrap().len())
        .sum();
    assert_eq!(total, 60);
}

#[test]
fn dataset_concatenation_sums_lengths() {
    let a = TabularDataset::synthetic(30, 6, Some(2), Some(2), 0);
    let b = TabularDataset::synthetic(20, 6, Some(2), Some(2), 1);
    let merged = a.cat(&b);
    assert_eq!(merged.len(), 50);

    let expected: Vec<i64> = a
        .y()
        .unwrap()
        .iter()
        .chain(b.y().unwrap().iter())
        .copied()
        .collect();
    assert_eq!(merged.y().unwrap().to_vec(), expected);
}

#[test]
fn eval_variant_shares_data_but_not_configuration() {
    let dm = tabular_module(true);
    let eval = dm.eval_variant(Some(32), std::rc::Rc::new(sondear::transforms::Identity));

    assert!(!eval.config().stratified_sampling);
    assert_eq!(eval.config().train_batch_size, 32);
    assert!(dm.config().stratified_sampling);
    assert_eq!(dm.config().train_batch_size, BATCH_SIZE);

    // Same underlying split contents.
    let collect = |m: &DataModule| -> Vec<f32> {
        m.val_batches()
            .iter()
            .flat_map(|b| b.y().unwrap().to_vec())
            .collect()
    };
    assert_eq!(collect(&dm), collect(&eval));
}
