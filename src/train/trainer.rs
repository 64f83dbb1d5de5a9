//! K-fold cross-validation training of the pain classifiers
//!
//! Folds are contiguous, non-shuffled splits of the sorted subject list,
//! so every subject appears in exactly one test partition and no subject
//! leaks between train and test. Each fold trains a fresh model; the
//! checkpoint with the best test accuracy is kept.

use crate::config::TrainConfig;
use crate::dataset::features::GraphDataset;
use crate::error::{PipelineError, Result};
use crate::graph::AdjacencyMatrix;
use crate::train::metrics::{accuracy, ConfusionMatrix};
use crate::train::models::{build_model, sample_tensor, PainClassifier};
use candle_core::{DType, Device, Tensor};
use candle_nn::ops::sigmoid;
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use rand::seq::SliceRandom;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Metrics of one training epoch.
#[derive(Debug, Clone, Serialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub test_loss: f64,
    pub test_accuracy: f64,
}

/// Outcome of one cross-validation fold.
#[derive(Debug, Clone, Serialize)]
pub struct FoldResult {
    pub fold: usize,
    pub test_subjects: Vec<String>,
    pub best_epoch: usize,
    pub best_test_accuracy: f64,
    pub test_confusion: ConfusionMatrix,
    pub history: Vec<EpochRecord>,
}

/// Aggregate of a full cross-validation run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub model: String,
    pub num_folds: usize,
    pub mean_test_accuracy: f64,
    pub folds: Vec<FoldResult>,
}

/// Contiguous subject folds; the first `len % k` folds get one extra
/// subject, matching an even split of the sorted list.
pub fn subject_folds(subjects: &[String], num_folds: usize) -> Vec<Vec<String>> {
    let k = num_folds.min(subjects.len()).max(1);
    let base = subjects.len() / k;
    let extra = subjects.len() % k;
    let mut folds = Vec::with_capacity(k);
    let mut offset = 0;
    for i in 0..k {
        let size = base + usize::from(i < extra);
        folds.push(subjects[offset..offset + size].to_vec());
        offset += size;
    }
    folds
}

pub struct Trainer {
    config: TrainConfig,
    device: Device,
}

impl Trainer {
    pub fn new(config: TrainConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            device: Device::Cpu,
        })
    }

    /// Runs the full cross-validation and writes history, checkpoints and
    /// the settings snapshot into a timestamped run directory.
    pub fn run(&self) -> Result<RunSummary> {
        let use_labels: Vec<i32> = self
            .config
            .base_labels
            .iter()
            .chain(self.config.pain_labels.iter())
            .copied()
            .collect();
        let dataset = GraphDataset::load(&self.config.features_path, Some(&use_labels))?;
        if dataset.num_classes() != 2 {
            return Err(PipelineError::InvalidConfig(format!(
                "binary classification expects 2 classes, labels map to {:?}",
                dataset.classes
            )));
        }
        let adjacency = AdjacencyMatrix::read_csv(&self.config.adjacency_path)?;
        // AU identity matters, not the channel suffix: a classification
        // adjacency (AU01_c) may weight regression features (AU01_r)
        if au_ids(&adjacency.au_names) != au_ids(&dataset.channels) {
            return Err(PipelineError::InconsistentNodeFeatures(format!(
                "adjacency nodes {:?} differ from feature channels {:?}",
                adjacency.au_names, dataset.channels
            )));
        }

        let dir_run = self.run_dir()?;
        log::info!(
            "[Trainer] {} on {} samples from {} subjects, {} folds, exporting to {:?}",
            self.config.model.name(),
            dataset.len(),
            dataset.subject_list.len(),
            self.config.num_folds,
            dir_run
        );

        // all samples as tensors once, reused across folds and epochs
        let samples: Vec<Tensor> = (0..dataset.len())
            .map(|i| sample_tensor(&dataset.node_features(i), &self.device))
            .collect::<Result<Vec<_>>>()?;

        let folds = subject_folds(&dataset.subject_list, self.config.num_folds);
        let mut fold_results = Vec::with_capacity(folds.len());
        for (fold, test_subjects) in folds.iter().enumerate() {
            let result = self.train_fold(
                fold,
                test_subjects,
                &dataset,
                &adjacency.values,
                &samples,
                &dir_run,
            )?;
            log::info!(
                "[Trainer] Fold {fold}: best test accuracy {:.4} at epoch {}",
                result.best_test_accuracy,
                result.best_epoch
            );
            fold_results.push(result);
        }

        let mean_test_accuracy = fold_results
            .iter()
            .map(|f| f.best_test_accuracy)
            .sum::<f64>()
            / fold_results.len() as f64;
        let summary = RunSummary {
            model: self.config.model.name().to_string(),
            num_folds: fold_results.len(),
            mean_test_accuracy,
            folds: fold_results,
        };
        self.write_reports(&dir_run, &summary)?;
        log::info!(
            "[Trainer] Finished, mean test accuracy {:.4}",
            summary.mean_test_accuracy
        );
        Ok(summary)
    }

    fn train_fold(
        &self,
        fold: usize,
        test_subjects: &[String],
        dataset: &GraphDataset,
        adjacency: &ndarray::Array2<f64>,
        samples: &[Tensor],
        dir_run: &Path,
    ) -> Result<FoldResult> {
        let (train_idx, test_idx) = dataset.train_test_indices(test_subjects);
        if train_idx.is_empty() || test_idx.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "fold {fold} has an empty partition ({} train, {} test samples)",
                train_idx.len(),
                test_idx.len()
            )));
        }

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &self.device);
        let model = build_model(
            adjacency,
            dataset.num_node_features,
            &self.config,
            vb,
            &self.device,
        )?;
        if fold == 0 {
            self.write_model_overview(dir_run, model.as_ref())?;
        }
        let mut optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: self.config.learning_rate,
                weight_decay: self.config.weight_decay,
                ..Default::default()
            },
        )?;

        let checkpoint = dir_run.join(format!("model_fold{fold}.safetensors"));
        let mut history = Vec::with_capacity(self.config.num_epochs);
        let mut best_epoch = 0;
        let mut best_test_accuracy = f64::NEG_INFINITY;
        let mut best_confusion = ConfusionMatrix::new(dataset.num_classes());
        let mut rng = rand::thread_rng();
        let mut order = train_idx.clone();

        for epoch in 0..self.config.num_epochs {
            order.shuffle(&mut rng);
            let mut loss_sum = 0.0;
            let mut batches = 0usize;
            for batch in order.chunks(self.config.batch_size) {
                let xs: Vec<Tensor> = batch.iter().map(|&i| samples[i].clone()).collect();
                let targets: Vec<f32> = batch.iter().map(|&i| dataset.labels[i] as f32).collect();
                let targets = Tensor::from_vec(targets, batch.len(), &self.device)?;
                let logits = model.forward_batch(&xs, true)?;
                let loss = candle_nn::loss::binary_cross_entropy_with_logit(&logits, &targets)?;
                optimizer.backward_step(&loss)?;
                loss_sum += loss.to_scalar::<f32>()? as f64;
                batches += 1;
            }

            let train_truth: Vec<usize> = train_idx.iter().map(|&i| dataset.labels[i]).collect();
            let test_truth: Vec<usize> = test_idx.iter().map(|&i| dataset.labels[i]).collect();
            let (train_pred, _) = evaluate(model.as_ref(), samples, &train_idx, &train_truth)?;
            let (test_pred, test_loss) =
                evaluate(model.as_ref(), samples, &test_idx, &test_truth)?;
            let train_accuracy = accuracy(&train_truth, &train_pred);
            let test_accuracy = accuracy(&test_truth, &test_pred);
            history.push(EpochRecord {
                epoch,
                train_loss: loss_sum / batches.max(1) as f64,
                train_accuracy,
                test_loss,
                test_accuracy,
            });

            if test_accuracy > best_test_accuracy {
                best_test_accuracy = test_accuracy;
                best_epoch = epoch;
                best_confusion = ConfusionMatrix::from_predictions(
                    &test_truth,
                    &test_pred,
                    dataset.num_classes(),
                );
                varmap.save(&checkpoint)?;
            }
            log::debug!(
                "[Trainer] Fold {fold} epoch {epoch}: loss {:.4}, train acc {:.4}, test acc {:.4}",
                loss_sum / batches.max(1) as f64,
                train_accuracy,
                test_accuracy
            );
        }

        Ok(FoldResult {
            fold,
            test_subjects: test_subjects.to_vec(),
            best_epoch,
            best_test_accuracy,
            test_confusion: best_confusion,
            history,
        })
    }

    fn run_dir(&self) -> Result<PathBuf> {
        let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M");
        let dir = self
            .config
            .dir_export
            .join(format!("{stamp}_{}", self.config.model.name()));
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn write_model_overview(&self, dir_run: &Path, model: &dyn PainClassifier) -> Result<()> {
        let mut file = fs::File::create(dir_run.join("model_overview.txt"))?;
        writeln!(file, "{}", model.overview())?;
        Ok(())
    }

    fn write_reports(&self, dir_run: &Path, summary: &RunSummary) -> Result<()> {
        let history = serde_json::to_string_pretty(summary)?;
        fs::write(dir_run.join("history.json"), history)?;
        let settings = serde_json::to_string_pretty(&self.config)?;
        fs::write(dir_run.join("settings.json"), settings)?;
        Ok(())
    }
}

/// Dropout-frozen evaluation pass: class predictions and mean binary
/// cross-entropy over the given sample indices.
fn evaluate(
    model: &dyn PainClassifier,
    samples: &[Tensor],
    indices: &[usize],
    truth: &[usize],
) -> Result<(Vec<usize>, f64)> {
    let mut predicted = Vec::with_capacity(indices.len());
    let mut loss_sum = 0.0;
    for (&i, &t) in indices.iter().zip(truth) {
        let logit = model.forward_sample(&samples[i], false)?;
        let p = (sigmoid(&logit)?.to_scalar::<f32>()? as f64).clamp(1e-7, 1.0 - 1e-7);
        predicted.push(usize::from(p >= 0.5));
        loss_sum -= if t == 1 { p.ln() } else { (1.0 - p).ln() };
    }
    let loss = if indices.is_empty() {
        0.0
    } else {
        loss_sum / indices.len() as f64
    };
    Ok((predicted, loss))
}

/// AU identifiers without the channel suffix, "AU01_r" -> "AU01".
fn au_ids(names: &[String]) -> Vec<&str> {
    names
        .iter()
        .map(|name| {
            name.strip_suffix("_r")
                .or_else(|| name.strip_suffix("_c"))
                .unwrap_or(name)
        })
        .collect()
}
