//! Feature tables as graph samples
//!
//! The preprocessing run exports one row per slice with a two-line header:
//! the first names the channel of each column, the second the feature. Here
//! that table becomes a graph dataset: one node per channel, the channel's
//! features as the node feature vector, the slice label as the target.

use crate::error::{PipelineError, Result};
use crate::labels::{is_base_label, is_pain_label};
use ndarray::Array2;
use std::path::Path;

/// Number of leading metadata columns (subj_id, slice_id, label,
/// start_idx, end_idx).
pub const META_COLUMNS: usize = 5;

/// All slices of a preprocessing run, reshaped for graph training.
#[derive(Debug, Clone)]
pub struct GraphDataset {
    /// Subject id of each sample.
    pub subjects: Vec<String>,
    /// Original slice label of each sample.
    pub labels_raw: Vec<i32>,
    /// Class index of each sample, in [0, num_classes).
    pub labels: Vec<usize>,
    /// Class index to original label. Baseline classes come first, so in
    /// the binary case class 0 is baseline and class 1 pain.
    pub classes: Vec<i32>,
    /// Sample matrix, one row per slice, channels blocked consecutively.
    pub features: Array2<f64>,
    /// Node (channel) order within each row.
    pub channels: Vec<String>,
    /// Features per node.
    pub num_node_features: usize,
    /// Unique subject ids, sorted.
    pub subject_list: Vec<String>,
}

impl GraphDataset {
    /// Loads a features export, optionally keeping only the given labels.
    /// Samples are ordered by subject id.
    pub fn load<P: AsRef<Path>>(path: P, use_labels: Option<&[i32]>) -> Result<Self> {
        let path = path.as_ref();
        let load_err = |reason: String| PipelineError::DatasetLoad {
            path: path.to_path_buf(),
            reason,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let mut records = reader.records();
        let channel_header = records
            .next()
            .ok_or_else(|| load_err("missing channel header".into()))??;
        let feature_header = records
            .next()
            .ok_or_else(|| load_err("missing feature header".into()))??;
        if channel_header.len() != feature_header.len() || channel_header.len() <= META_COLUMNS {
            return Err(load_err("malformed header".into()));
        }
        let nof_columns = channel_header.len() - META_COLUMNS;

        let (channels, num_node_features) = channel_layout(&channel_header)?;

        let mut subjects = Vec::new();
        let mut labels_raw = Vec::new();
        let mut rows: Vec<Vec<f64>> = Vec::new();
        for record in records {
            let record = record?;
            if record.len() != nof_columns + META_COLUMNS {
                return Err(load_err(format!(
                    "row with {} columns, expected {}",
                    record.len(),
                    nof_columns + META_COLUMNS
                )));
            }
            let label: i32 = record
                .get(2)
                .unwrap_or("")
                .parse()
                .map_err(|_| load_err("unparseable label".into()))?;
            if let Some(keep) = use_labels {
                if !keep.contains(&label) {
                    continue;
                }
            }
            subjects.push(record.get(0).unwrap_or("").to_string());
            labels_raw.push(label);
            let mut row = Vec::with_capacity(nof_columns);
            for field in record.iter().skip(META_COLUMNS) {
                row.push(
                    field
                        .parse::<f64>()
                        .map_err(|_| load_err(format!("unparseable value '{field}'")))?,
                );
            }
            rows.push(row);
        }

        // stable order by subject so fold boundaries are reproducible
        let mut order: Vec<usize> = (0..subjects.len()).collect();
        order.sort_by(|&a, &b| subjects[a].cmp(&subjects[b]));
        let subjects: Vec<String> = order.iter().map(|&i| subjects[i].clone()).collect();
        let labels_raw: Vec<i32> = order.iter().map(|&i| labels_raw[i]).collect();
        let mut features = Array2::zeros((rows.len(), nof_columns));
        for (r, &i) in order.iter().enumerate() {
            for (c, v) in rows[i].iter().enumerate() {
                features[[r, c]] = *v;
            }
        }

        let classes = class_list(&labels_raw)?;
        let labels = labels_raw
            .iter()
            .map(|raw| {
                classes
                    .iter()
                    .position(|c| c == raw)
                    .ok_or(PipelineError::InvalidLabel(*raw))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut subject_list = subjects.clone();
        subject_list.dedup();

        Ok(Self {
            subjects,
            labels_raw,
            labels,
            classes,
            features,
            channels,
            num_node_features,
            subject_list,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.channels.len()
    }

    /// Node feature matrix of one sample, shape (nodes, features).
    pub fn node_features(&self, sample: usize) -> Array2<f64> {
        let row = self.features.row(sample);
        Array2::from_shape_fn((self.num_nodes(), self.num_node_features), |(n, f)| {
            row[n * self.num_node_features + f]
        })
    }

    /// Sample indices of the training and test partitions for a given set
    /// of held-out subjects.
    pub fn train_test_indices(&self, test_subjects: &[String]) -> (Vec<usize>, Vec<usize>) {
        let mut train = Vec::new();
        let mut test = Vec::new();
        for (i, subject) in self.subjects.iter().enumerate() {
            if test_subjects.contains(subject) {
                test.push(i);
            } else {
                train.push(i);
            }
        }
        (train, test)
    }
}

/// Node order and per-node feature count from the channel header row.
/// Every channel must span one contiguous block of equal width.
fn channel_layout(header: &csv::StringRecord) -> Result<(Vec<String>, usize)> {
    let mut channels: Vec<String> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    for name in header.iter().skip(META_COLUMNS) {
        match (channels.last(), counts.last_mut()) {
            (Some(last), Some(count)) if last == name => *count += 1,
            _ => {
                if channels.iter().any(|c| c == name) {
                    return Err(PipelineError::InconsistentNodeFeatures(format!(
                        "channel '{name}' split into non-contiguous blocks"
                    )));
                }
                channels.push(name.to_string());
                counts.push(1);
            }
        }
    }
    let width = counts.first().copied().unwrap_or(0);
    if counts.iter().any(|c| *c != width) {
        return Err(PipelineError::InconsistentNodeFeatures(format!(
            "per-channel feature counts differ: {counts:?}"
        )));
    }
    Ok((channels, width))
}

/// Class indices over the labels present: baseline classes first, pain
/// classes after, each ascending.
fn class_list(labels_raw: &[i32]) -> Result<Vec<i32>> {
    let mut unique: Vec<i32> = labels_raw.to_vec();
    unique.sort_unstable();
    unique.dedup();
    let mut base: Vec<i32> = Vec::new();
    let mut pain: Vec<i32> = Vec::new();
    for label in unique {
        if is_base_label(label) {
            base.push(label);
        } else if is_pain_label(label) {
            pain.push(label);
        } else {
            return Err(PipelineError::InvalidLabel(label));
        }
    }
    base.extend(pain);
    Ok(base)
}
