//! Graph neural network training on the preprocessed slice features
//!
//! `models` defines the GCN and GAT classifiers, `trainer` runs the
//! subject-wise k-fold cross-validation, `metrics` the evaluation.

pub mod metrics;
pub mod models;
pub mod trainer;

pub use metrics::{accuracy, ConfusionMatrix};
pub use models::{build_model, PainClassifier};
pub use trainer::{subject_folds, FoldResult, RunSummary, Trainer};
