//! Configuration for the preprocessing, graph-generation and training runs
//!
//! Every run is driven by an explicit, immutable config struct constructed
//! at startup (from JSON or the built-in defaults) and passed down to the
//! components. `validate()` fails fast before any computation starts:
//! unknown feature identifiers, out-of-range thresholds and empty channel
//! lists are rejected here, not at call time.

use crate::error::{PipelineError, Result};
use crate::features;
use crate::labels::{Modality, PainGroup};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Butterworth filter settings for one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSettings {
    /// Filter type; only "lowpass" and "highpass" designs are supported.
    pub ftype: FilterType,
    /// Filter order (>= 1).
    pub order: usize,
    /// Cutoff frequency in Hz.
    pub cut: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    Lowpass,
    Highpass,
}

/// Slicing policy of one pain group and its paired baseline group.
///
/// Shifts and lengths are in seconds and scaled by the sampling rate at
/// slicing time; `pre_interval_min` is in frames (matching the label-file
/// resolution the thresholds were tuned on).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupPolicy {
    /// Slice start offset relative to the interval start (seconds).
    pub shift: f64,
    /// Slice duration (seconds).
    pub length: f64,
    /// Minimum pain interval duration (seconds).
    pub interval_min: f64,
    /// Minimum duration of the preceding baseline interval (frames).
    pub pre_interval_min: f64,
    /// Minimum duration of the subsequent interval (frames).
    pub post_interval_min: f64,
    /// Baseline slice start offset relative to the baseline interval start (seconds).
    pub base_shift: f64,
    /// Baseline slice duration (seconds).
    pub base_length: f64,
}

/// Configuration of one slicing + feature extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Data modality to process; selects the sampling rate.
    pub modality: Modality,
    /// Root directory of the raw per-subject data files.
    pub dir_data: PathBuf,
    /// Root directory of the per-subject label files.
    pub dir_labels: PathBuf,
    /// Directory receiving the timestamped results folder.
    pub dir_export: PathBuf,
    /// Worker pool size for per-subject jobs.
    pub nof_processes: usize,
    /// Export raw slice data alongside the features.
    pub slice_export: bool,
    /// Standardize the feature table (zero mean / unit variance per column).
    pub rescale_features: bool,
    /// Subjects excluded from processing.
    pub subjects_no_use: Vec<String>,
    /// Per-channel Butterworth settings; channels not listed stay unfiltered.
    pub filter_settings: BTreeMap<String, FilterSettings>,
    /// Feature-function names per channel, applied to the raw signal.
    pub feature_settings: BTreeMap<String, Vec<String>>,
    /// Feature-function names per channel, applied to the 1st derivative.
    pub feature_settings_d1: BTreeMap<String, Vec<String>>,
    /// Feature-function names per channel, applied to the 2nd derivative.
    pub feature_settings_d2: BTreeMap<String, Vec<String>>,
    /// Channels carved into slices (superset of the feature channels).
    pub slice_channels: Vec<String>,
    /// Slicing policy per pain group, keyed by group name ("pH", ...).
    pub slice_policies: BTreeMap<String, GroupPolicy>,
}

impl PreprocessConfig {
    /// Load a run configuration from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: PreprocessConfig = serde_json::from_str(&contents)?;
        log::info!("[Config] Loaded preprocessing config from {:?}", path.as_ref());
        Ok(config)
    }

    /// Total number of features per slice, fixed by configuration.
    pub fn nof_features(&self) -> usize {
        self.feature_settings.values().map(Vec::len).sum::<usize>()
            + self.feature_settings_d1.values().map(Vec::len).sum::<usize>()
            + self.feature_settings_d2.values().map(Vec::len).sum::<usize>()
    }

    /// Union of all channels that must be loaded for a subject.
    pub fn channels_to_process(&self) -> Vec<String> {
        let mut channels = self.slice_channels.clone();
        for key in self
            .feature_settings
            .keys()
            .chain(self.feature_settings_d1.keys())
            .chain(self.feature_settings_d2.keys())
        {
            if !channels.contains(key) {
                channels.push(key.clone());
            }
        }
        channels
    }

    /// Policy lookup by pain group; missing groups are a config error.
    pub fn policy(&self, group: PainGroup) -> Result<&GroupPolicy> {
        self.slice_policies.get(group.name()).ok_or_else(|| {
            PipelineError::InvalidConfig(format!("no slice policy for group '{}'", group.name()))
        })
    }

    /// Fail-fast validation of the whole configuration.
    pub fn validate(&self) -> Result<()> {
        if self.nof_processes == 0 {
            return Err(PipelineError::InvalidConfig(
                "nof_processes must be at least 1".into(),
            ));
        }
        if self.channels_to_process().is_empty() {
            return Err(PipelineError::InvalidConfig("no channels provided".into()));
        }
        for (channel, settings) in &self.filter_settings {
            if settings.order == 0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "filter order for '{}' must be at least 1",
                    channel
                )));
            }
            if settings.cut <= 0.0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "cutoff frequency for '{}' must be positive",
                    channel
                )));
            }
        }
        // Every configured feature identifier must resolve in the registry.
        for names in self
            .feature_settings
            .values()
            .chain(self.feature_settings_d1.values())
            .chain(self.feature_settings_d2.values())
        {
            for name in names {
                if !features::is_registered(name) {
                    return Err(PipelineError::UnknownFeature(name.clone()));
                }
            }
        }
        for group in PainGroup::ALL {
            let policy = self.policy(group)?;
            if policy.length <= 0.0 || policy.base_length <= 0.0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "slice lengths for group '{}' must be positive",
                    group.name()
                )));
            }
        }
        Ok(())
    }
}

impl Default for PreprocessConfig {
    /// Default configuration for the video (OpenFace AU regression) modality.
    fn default() -> Self {
        let au_channels = [
            "AU01_r", "AU02_r", "AU04_r", "AU05_r", "AU06_r", "AU07_r", "AU09_r", "AU10_r",
            "AU12_r", "AU14_r", "AU15_r", "AU17_r", "AU20_r", "AU23_r", "AU25_r", "AU26_r",
            "AU45_r",
        ];
        let features_raw: Vec<String> = [
            "signal_mean",
            "signal_median",
            "signal_min",
            "signal_max",
            "signal_range",
            "signal_std",
            "signal_iqr",
            "signal_idr",
            "signal_mad",
            "signal_tmax",
            "signal_tgm",
            "signal_tga",
            "signal_sgm",
            "signal_sga",
            "signal_area",
            "signal_area_min_max",
            "signal_mean_crossing",
            "signal_split_equal_part_mean",
            "signal_split_equal_part_std",
            "signal_var",
            "signal_rms",
            "mean_absolute_values",
            "std_absolute_values",
            "signal_split_equal_part_var",
            "signal_area_min_max_ratio",
            "signal_mean_local_max",
            "signal_mean_local_min",
            "signal_p2pmv",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let features_deriv: Vec<String> = [
            "signal_mean",
            "signal_median",
            "signal_min",
            "signal_max",
            "signal_range",
            "signal_std",
            "signal_iqr",
            "signal_idr",
            "signal_mad",
            "signal_tmax",
            "signal_tgm",
            "signal_tga",
            "signal_sgm",
            "signal_sga",
            "signal_area",
            "signal_area_min_max",
            "signal_mean_crossing",
            "signal_var",
            "signal_rms",
            "mean_absolute_values",
            "std_absolute_values",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let lowpass = FilterSettings {
            ftype: FilterType::Lowpass,
            order: 1,
            cut: 1.0,
        };
        let filter_settings = au_channels
            .iter()
            .map(|c| (c.to_string(), lowpass.clone()))
            .collect();
        let feature_settings: BTreeMap<String, Vec<String>> = au_channels
            .iter()
            .map(|c| (c.to_string(), features_raw.clone()))
            .collect();
        let feature_settings_deriv: BTreeMap<String, Vec<String>> = au_channels
            .iter()
            .map(|c| (c.to_string(), features_deriv.clone()))
            .collect();

        let mut slice_policies = BTreeMap::new();
        slice_policies.insert(
            "pH".to_string(),
            GroupPolicy {
                shift: 0.0,
                length: 6.0,
                interval_min: 4.0,
                pre_interval_min: 8.0,
                post_interval_min: 0.0,
                base_shift: 4.0,
                base_length: 6.0,
            },
        );
        slice_policies.insert(
            "pE".to_string(),
            GroupPolicy {
                shift: 0.0,
                length: 6.0,
                interval_min: 5.0,
                pre_interval_min: 8.0,
                post_interval_min: 0.0,
                base_shift: 4.0,
                base_length: 6.0,
            },
        );
        slice_policies.insert(
            "tH".to_string(),
            GroupPolicy {
                shift: 0.0,
                length: 60.0,
                interval_min: 60.0,
                pre_interval_min: 60.0,
                post_interval_min: 0.0,
                base_shift: 120.0,
                base_length: 60.0,
            },
        );
        slice_policies.insert(
            "tE".to_string(),
            GroupPolicy {
                shift: 0.0,
                length: 60.0,
                interval_min: 60.0,
                pre_interval_min: 60.0,
                post_interval_min: 0.0,
                base_shift: 120.0,
                base_length: 60.0,
            },
        );

        Self {
            modality: Modality::Video,
            dir_data: PathBuf::from("data/openface"),
            dir_labels: PathBuf::from("data/video_labels"),
            dir_export: PathBuf::from("results/slices_and_features"),
            nof_processes: 8,
            slice_export: true,
            rescale_features: true,
            subjects_no_use: ["014", "024", "024_b", "028", "030", "030_2", "059"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            filter_settings,
            feature_settings,
            feature_settings_d1: feature_settings_deriv.clone(),
            feature_settings_d2: feature_settings_deriv,
            slice_channels: au_channels.iter().map(|s| s.to_string()).collect(),
            slice_policies,
        }
    }
}

/// Which Action-Unit channel family the co-occurrence counts come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuMethod {
    /// Binary classification channels (`AU.._c`), activity threshold 1.
    #[serde(rename = "AUc")]
    Classification,
    /// Continuous regression channels (`AU.._r`), configurable threshold.
    #[serde(rename = "AUr")]
    Regression,
}

impl AuMethod {
    pub fn tag(&self) -> &'static str {
        match self {
            AuMethod::Classification => "AUc",
            AuMethod::Regression => "AUr",
        }
    }
}

/// Edge weight derivation for the adjacency matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightMethod {
    /// P(AUi, AUj) = AND-count / total frames of the label group.
    Uncond,
    /// P(AUi | AUj) = AND-count / count of AUj alone.
    Cond,
    /// P(AUi and AUj | AUi or AUj) = AND-count / OR-count (symmetric).
    Symm,
}

/// Configuration of the AU co-occurrence frequency analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencyConfig {
    pub dir_data: PathBuf,
    pub dir_labels: PathBuf,
    pub dir_export: PathBuf,
    pub subjects_no_use: Vec<String>,
    pub nof_processes: usize,
    /// Activity threshold for regression channels, in [0, 5].
    pub eps_activity: f64,
    /// Optional confidence threshold in (0, 1]; frames below are dropped.
    pub eps_confidence: Option<f64>,
}

impl FrequencyConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: FrequencyConfig = serde_json::from_str(&contents)?;
        log::info!("[Config] Loaded frequency config from {:?}", path.as_ref());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=5.0).contains(&self.eps_activity) {
            return Err(PipelineError::InvalidConfig(format!(
                "eps_activity must be in [0, 5], got {}",
                self.eps_activity
            )));
        }
        if let Some(eps) = self.eps_confidence {
            if !(eps > 0.0 && eps <= 1.0) {
                return Err(PipelineError::InvalidConfig(format!(
                    "eps_confidence must be in (0, 1], got {}",
                    eps
                )));
            }
        }
        if self.nof_processes == 0 {
            return Err(PipelineError::InvalidConfig(
                "nof_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            dir_data: PathBuf::from("data/openface"),
            dir_labels: PathBuf::from("data/video_labels"),
            dir_export: PathBuf::from("results/frequency_analysis"),
            subjects_no_use: ["014", "024", "024_b", "028", "030", "030_2", "059"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            nof_processes: 8,
            eps_activity: 1.0,
            eps_confidence: None,
        }
    }
}

/// Configuration of one adjacency matrix computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjacencyConfig {
    /// Directory with the frequency-analysis count exports.
    pub input_dir: PathBuf,
    pub au_method: AuMethod,
    pub computation_method: WeightMethod,
    /// Labels whose counts are aggregated into the "pain" matrix.
    pub pain_labels: Vec<i32>,
    /// Labels whose counts are aggregated into the "baseline" matrix.
    pub base_labels: Vec<i32>,
    /// Optional AU subset; None keeps all AUs.
    pub use_aus: Option<Vec<String>>,
    /// Optional sparsification percentile in (0, 1).
    pub eps: Option<f64>,
    /// Min-max normalize the delta matrix to [0, 1].
    pub normalize: bool,
    pub dir_export: PathBuf,
}

impl AdjacencyConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: AdjacencyConfig = serde_json::from_str(&contents)?;
        log::info!("[Config] Loaded adjacency config from {:?}", path.as_ref());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(eps) = self.eps {
            if !(eps > 0.0 && eps < 1.0) {
                return Err(PipelineError::InvalidConfig(format!(
                    "eps has to be in (0, 1), got {}",
                    eps
                )));
            }
        }
        let valid = crate::labels::LABELS_VALID;
        for label in self.pain_labels.iter().chain(self.base_labels.iter()) {
            if !valid.contains(label) {
                return Err(PipelineError::InvalidLabel(*label));
            }
        }
        Ok(())
    }
}

impl Default for AdjacencyConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("results/frequency_analysis"),
            au_method: AuMethod::Classification,
            computation_method: WeightMethod::Symm,
            pain_labels: vec![3, -3, 6, -6],
            base_labels: vec![0],
            use_aus: None,
            eps: None,
            normalize: true,
            dir_export: PathBuf::from("results/adjacency_matrix"),
        }
    }
}

/// Graph model family to train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "GCN")]
    Gcn,
    #[serde(rename = "GAT")]
    Gat,
}

impl ModelKind {
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Gcn => "GCN",
            ModelKind::Gat => "GAT",
        }
    }
}

/// Configuration of one k-fold cross-validation training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Path to the features.csv export of a preprocessing run.
    pub features_path: PathBuf,
    /// Path to the adjacency matrix CSV.
    pub adjacency_path: PathBuf,
    /// Pain labels forming the positive class.
    pub pain_labels: Vec<i32>,
    /// Baseline labels forming the negative class.
    pub base_labels: Vec<i32>,
    pub model: ModelKind,
    pub num_folds: usize,
    pub num_epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
    /// Dropout probability in the classifier head.
    pub dropout: f32,
    /// Dropout probability between graph-convolution layers.
    pub dropout_graph: f32,
    /// Hidden widths of the graph-convolution layers; empty derives
    /// [d, d/2] from the input feature dimension d.
    pub hidden_channels: Vec<usize>,
    pub dir_export: PathBuf,
}

impl TrainConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: TrainConfig = serde_json::from_str(&contents)?;
        log::info!("[Config] Loaded training config from {:?}", path.as_ref());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_folds < 2 {
            return Err(PipelineError::InvalidConfig(
                "num_folds must be at least 2".into(),
            ));
        }
        if self.num_epochs == 0 || self.batch_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "num_epochs and batch_size must be positive".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) || !(0.0..1.0).contains(&self.dropout_graph) {
            return Err(PipelineError::InvalidConfig(
                "dropout probabilities must be in [0, 1)".into(),
            ));
        }
        if self.pain_labels.is_empty() || self.base_labels.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "pain_labels and base_labels must be non-empty".into(),
            ));
        }
        Ok(())
    }
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            features_path: PathBuf::from("results/slices_and_features/features.csv"),
            adjacency_path: PathBuf::from(
                "results/adjacency_matrix/adjacency_matrix_delta_normalized.csv",
            ),
            pain_labels: vec![-3],
            base_labels: vec![100],
            model: ModelKind::Gcn,
            num_folds: 4,
            num_epochs: 100,
            batch_size: 256,
            learning_rate: 0.001,
            weight_decay: 0.0,
            dropout: 0.5,
            dropout_graph: 0.3,
            hidden_channels: Vec::new(),
            dir_export: PathBuf::from("results/training"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preprocess_config_is_valid() {
        let config = PreprocessConfig::default();
        config.validate().expect("default config must validate");
        // 17 channels x (28 raw + 21 d1 + 21 d2) features
        assert_eq!(config.nof_features(), 17 * (28 + 21 + 21));
        assert_eq!(config.channels_to_process().len(), 17);
    }

    #[test]
    fn test_unknown_feature_rejected() {
        let mut config = PreprocessConfig::default();
        config
            .feature_settings
            .get_mut("AU01_r")
            .unwrap()
            .push("signal_fourier_magic".to_string());
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, PipelineError::UnknownFeature(ref name) if name == "signal_fourier_magic"),
            "expected UnknownFeature, got {err:?}"
        );
    }

    #[test]
    fn test_eps_ranges_rejected() {
        let mut freq = FrequencyConfig::default();
        freq.eps_activity = 7.5;
        assert!(freq.validate().is_err());

        let mut adj = AdjacencyConfig::default();
        adj.eps = Some(1.0);
        assert!(adj.validate().is_err());
        adj.eps = Some(0.9);
        assert!(adj.validate().is_ok());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = PreprocessConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: PreprocessConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.nof_features(), config.nof_features());
        assert_eq!(parsed.subjects_no_use, config.subjects_no_use);
    }

    #[test]
    fn test_train_config_validation() {
        let mut config = TrainConfig::default();
        config.validate().expect("default train config must validate");
        config.num_folds = 1;
        assert!(config.validate().is_err());
    }
}
