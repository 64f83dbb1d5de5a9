//! End-to-end runs of the pipeline stages on a small synthetic dataset:
//! OpenFace exports with two subjects are preprocessed into slice
//! features, AU counts become adjacency matrices, and a GCN trains on
//! the resulting graph dataset.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use xite_gnn::config::{
    AdjacencyConfig, FrequencyConfig, GroupPolicy, PreprocessConfig, TrainConfig, WeightMethod,
};
use xite_gnn::dataset::features::GraphDataset;
use xite_gnn::graph::adjacency;
use xite_gnn::graph::frequency::FrequencyAnalysis;
use xite_gnn::graph::AdjacencyMatrix;
use xite_gnn::preprocess::Preprocessor;
use xite_gnn::train::Trainer;

const SUBJECTS: [&str; 2] = ["001", "002"];

/// Labels per frame: baseline, a phasic stimulus, recovery. The recovery
/// run is long enough to qualify as a baseline-after-pain slice.
fn frame_labels() -> Vec<i32> {
    let mut labels = vec![0; 5];
    labels.extend(vec![1; 6]);
    labels.extend(vec![0; 14]);
    labels
}

fn write_openface_fixture(root: &Path) -> (PathBuf, PathBuf) {
    let dir_data = root.join("openface");
    let dir_labels = root.join("video_labels");
    fs::create_dir_all(&dir_data).unwrap();
    fs::create_dir_all(&dir_labels).unwrap();

    let labels = frame_labels();
    for (s, subject) in SUBJECTS.iter().enumerate() {
        let mut data = fs::File::create(dir_data.join(format!("S{subject}_fvf.csv"))).unwrap();
        writeln!(data, "frame, confidence, AU01_r, AU02_r, AU01_c, AU02_c").unwrap();
        for (i, label) in labels.iter().enumerate() {
            // AU01 tracks the stimulus, AU02 stays low; subjects differ by
            // a constant offset so features are not degenerate
            let active = if *label == 1 { 2.0 } else { 0.2 };
            let au01 = active + s as f64 * 0.3 + (i % 3) as f64 * 0.05;
            let au02 = 0.1 + (i % 4) as f64 * 0.02;
            let au01_c = if au01 >= 1.0 { 1.0 } else { 0.0 };
            writeln!(data, "{i}, 0.98, {au01}, {au02}, {au01_c}, 0.0").unwrap();
        }

        let mut file = fs::File::create(dir_labels.join(format!("S{subject}.csv"))).unwrap();
        writeln!(file, "label").unwrap();
        for label in &labels {
            writeln!(file, "{label}").unwrap();
        }
    }
    (dir_data, dir_labels)
}

/// Durations in seconds sized for the 25 Hz video rate: a 6 frame
/// stimulus and a 14 frame recovery produce one pain and one baseline
/// slice per subject.
fn preprocess_config(dir_data: &Path, dir_labels: &Path, dir_export: &Path) -> PreprocessConfig {
    let mut config = PreprocessConfig::default();
    config.dir_data = dir_data.to_path_buf();
    config.dir_labels = dir_labels.to_path_buf();
    config.dir_export = dir_export.to_path_buf();
    config.nof_processes = 1;
    config.subjects_no_use = Vec::new();
    config.slice_export = false;
    config.rescale_features = false;
    config.filter_settings = BTreeMap::new();
    let features = vec![
        "signal_mean".to_string(),
        "signal_max".to_string(),
        "signal_std".to_string(),
    ];
    config.feature_settings = ["AU01_r", "AU02_r"]
        .iter()
        .map(|c| (c.to_string(), features.clone()))
        .collect();
    config.feature_settings_d1 = BTreeMap::new();
    config.feature_settings_d2 = BTreeMap::new();
    config.slice_channels = vec!["AU01_r".to_string(), "AU02_r".to_string()];
    let policy = GroupPolicy {
        shift: 0.0,
        length: 0.2,
        interval_min: 0.2,
        pre_interval_min: 3.0,
        post_interval_min: 0.0,
        base_shift: 0.04,
        base_length: 0.2,
    };
    config.slice_policies = ["pH", "pE", "tH", "tE"]
        .iter()
        .map(|g| (g.to_string(), policy.clone()))
        .collect();
    config
}

fn run_preprocessing(root: &Path) -> PathBuf {
    let (dir_data, dir_labels) = write_openface_fixture(root);
    let config = preprocess_config(&dir_data, &dir_labels, &root.join("export"));
    let dir_out = Preprocessor::new(config).unwrap().run().unwrap();
    dir_out.join("features.csv")
}

#[test]
fn preprocessing_produces_loadable_graph_dataset() {
    let tmp = tempfile::tempdir().unwrap();
    let features_path = run_preprocessing(tmp.path());

    let ds = GraphDataset::load(&features_path, None).unwrap();
    // one pain and one recovery slice per subject
    assert_eq!(ds.len(), 4);
    assert_eq!(ds.classes, vec![100, 1]);
    assert_eq!(
        ds.channels,
        vec!["AU01_r".to_string(), "AU02_r".to_string()]
    );
    assert_eq!(ds.num_node_features, 3);
    assert_eq!(ds.subject_list, vec!["001".to_string(), "002".to_string()]);

    // the pain slice mean of AU01 sits well above the recovery mean
    for subject in 0..2 {
        let pain = ds
            .labels_raw
            .iter()
            .enumerate()
            .position(|(i, l)| *l == 1 && ds.subjects[i] == SUBJECTS[subject])
            .unwrap();
        let x = ds.node_features(pain);
        assert!(x[[0, 0]] > 1.5, "pain AU01 mean was {}", x[[0, 0]]);
    }
}

#[test]
fn frequency_counts_drive_adjacency_matrices() {
    let tmp = tempfile::tempdir().unwrap();
    let (dir_data, dir_labels) = write_openface_fixture(tmp.path());

    let freq_config = FrequencyConfig {
        dir_data,
        dir_labels,
        dir_export: tmp.path().join("frequency"),
        subjects_no_use: Vec::new(),
        nof_processes: 1,
        eps_activity: 1.0,
        eps_confidence: None,
    };
    let dir_counts = FrequencyAnalysis::new(freq_config).unwrap().run().unwrap();
    assert!(dir_counts.join("counts_AUc_and.csv").exists());
    assert!(dir_counts.join("nof_frames_per_label.csv").exists());

    let adj_config = AdjacencyConfig {
        input_dir: dir_counts,
        computation_method: WeightMethod::Symm,
        pain_labels: vec![1],
        base_labels: vec![0],
        eps: None,
        normalize: true,
        dir_export: tmp.path().join("adjacency"),
        ..AdjacencyConfig::default()
    };
    let dir_adj = adjacency::run(&adj_config).unwrap();

    let delta =
        AdjacencyMatrix::read_csv(dir_adj.join("adjacency_matrix_delta_normalized.csv")).unwrap();
    assert_eq!(
        delta.au_names,
        vec!["AU01_c".to_string(), "AU02_c".to_string()]
    );
    assert!(delta.values.iter().all(|v| (0.0..=1.0).contains(v)));
    // AU01 is active during pain only, so its self edge dominates the delta
    assert_eq!(delta.values[[0, 0]], 1.0);
}

#[test]
fn gcn_trains_on_preprocessed_features() {
    let tmp = tempfile::tempdir().unwrap();
    let features_path = run_preprocessing(tmp.path());

    // adjacency over the feature channels, AU01 and AU02 weakly connected
    let adjacency_path = tmp.path().join("adjacency.csv");
    let mut file = fs::File::create(&adjacency_path).unwrap();
    writeln!(file, "AU,AU01_r,AU02_r").unwrap();
    writeln!(file, "AU01_r,1.0,0.2").unwrap();
    writeln!(file, "AU02_r,0.2,0.5").unwrap();

    let config = TrainConfig {
        features_path,
        adjacency_path,
        pain_labels: vec![1],
        base_labels: vec![100],
        num_folds: 2,
        num_epochs: 3,
        batch_size: 4,
        learning_rate: 0.01,
        dropout: 0.0,
        dropout_graph: 0.0,
        hidden_channels: vec![3],
        dir_export: tmp.path().join("training"),
        ..TrainConfig::default()
    };
    let summary = Trainer::new(config).unwrap().run().unwrap();

    assert_eq!(summary.num_folds, 2);
    assert_eq!(summary.folds[0].history.len(), 3);
    // each fold holds out exactly one subject
    assert_eq!(summary.folds[0].test_subjects, vec!["001".to_string()]);
    assert_eq!(summary.folds[1].test_subjects, vec!["002".to_string()]);
    assert!((0.0..=1.0).contains(&summary.mean_test_accuracy));

    let runs: Vec<_> = fs::read_dir(tmp.path().join("training"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].join("history.json").exists());
    assert!(runs[0].join("settings.json").exists());
    assert!(runs[0].join("model_overview.txt").exists());
    assert!(runs[0].join("model_fold0.safetensors").exists());
    assert!(runs[0].join("model_fold1.safetensors").exists());
}
