//! AU pair co-occurrence counting
//!
//! For every raw label and AU pair (i, j) the tables hold the number of
//! frames with that label where both AUs are active (AND) or at least one
//! is (OR). Activity is `value >= eps_activity`; classification channels
//! use 1, regression channels a threshold in [0, 5]. NaN frames are never
//! active.

use crate::config::FrequencyConfig;
use crate::dataset::openface::{ChannelGroup, OpenFaceDataset};
use crate::dataset::Recording;
use crate::error::{PipelineError, Result};
use crate::labels::LABELS_VALID;
use ndarray::Array2;
use rayon::prelude::*;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Logical combination of the two activity masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOp {
    And,
    Or,
}

/// Per-label AU pair counts. `counts[l]` is the (AU x AU) matrix of the
/// label `LABELS_VALID[l]`.
#[derive(Debug, Clone)]
pub struct CountsTable {
    pub au_names: Vec<String>,
    pub counts: Vec<Array2<u64>>,
}

impl CountsTable {
    pub fn zeros(au_names: Vec<String>) -> Self {
        let n = au_names.len();
        Self {
            au_names,
            counts: (0..LABELS_VALID.len()).map(|_| Array2::zeros((n, n))).collect(),
        }
    }

    /// Element-wise accumulation of another table over the same AUs.
    pub fn merge(&mut self, other: &CountsTable) -> Result<()> {
        if self.au_names != other.au_names {
            return Err(PipelineError::InvalidConfig(
                "cannot merge counts over different AU sets".into(),
            ));
        }
        for (mine, theirs) in self.counts.iter_mut().zip(&other.counts) {
            *mine += theirs;
        }
        Ok(())
    }

    /// Sum of the count matrices of the given labels.
    pub fn aggregate(&self, use_labels: &[i32]) -> Array2<u64> {
        let n = self.au_names.len();
        let mut total = Array2::zeros((n, n));
        for (l, &label) in LABELS_VALID.iter().enumerate() {
            if use_labels.contains(&label) {
                total += &self.counts[l];
            }
        }
        total
    }

    /// Writes the table as CSV: one row per (label, AU) pair.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut file = fs::File::create(path)?;
        writeln!(file, "label,AU,{}", self.au_names.join(","))?;
        for (l, &label) in LABELS_VALID.iter().enumerate() {
            for (i, au) in self.au_names.iter().enumerate() {
                let row: Vec<String> = (0..self.au_names.len())
                    .map(|j| self.counts[l][[i, j]].to_string())
                    .collect();
                writeln!(file, "{label},{au},{}", row.join(","))?;
            }
        }
        Ok(())
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let load_err = |reason: String| PipelineError::DatasetLoad {
            path: path.to_path_buf(),
            reason,
        };
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;
        let au_names: Vec<String> = reader.headers()?.iter().skip(2).map(str::to_string).collect();
        let mut table = CountsTable::zeros(au_names);
        for record in reader.records() {
            let record = record?;
            let label: i32 = record
                .get(0)
                .unwrap_or("")
                .parse()
                .map_err(|_| load_err("unparseable label".into()))?;
            let au = record.get(1).unwrap_or("");
            let l = LABELS_VALID
                .iter()
                .position(|v| *v == label)
                .ok_or(PipelineError::InvalidLabel(label))?;
            let i = table
                .au_names
                .iter()
                .position(|name| name == au)
                .ok_or_else(|| load_err(format!("unknown AU '{au}'")))?;
            for (j, field) in record.iter().skip(2).enumerate() {
                table.counts[l][[i, j]] = field
                    .parse()
                    .map_err(|_| load_err(format!("unparseable count '{field}'")))?;
            }
        }
        Ok(table)
    }
}

/// Counts co-occurring AU activity per label for one subject's recording.
pub fn count_pair_occurrences(
    data: &Recording,
    labels: &[i32],
    eps_activity: f64,
    op: PairOp,
) -> CountsTable {
    let au_names: Vec<String> = data.channel_names().to_vec();
    let mut table = CountsTable::zeros(au_names.clone());
    let n = au_names.len();
    let channels: Vec<&[f64]> = data.channels_iter().map(|(_, c)| c).collect();

    let nof_frames = data.nof_frames().min(labels.len());
    let mut active = vec![false; n];
    for frame in 0..nof_frames {
        let Some(l) = LABELS_VALID.iter().position(|v| *v == labels[frame]) else {
            continue;
        };
        for (i, channel) in channels.iter().enumerate() {
            active[i] = channel[frame] >= eps_activity;
        }
        let counts = &mut table.counts[l];
        for i in 0..n {
            for j in 0..n {
                let hit = match op {
                    PairOp::And => active[i] && active[j],
                    PairOp::Or => active[i] || active[j],
                };
                if hit {
                    counts[[i, j]] += 1;
                }
            }
        }
    }
    table
}

/// Frames per valid label, indexed like `LABELS_VALID`.
pub fn count_frames_per_label(labels: &[i32]) -> Vec<u64> {
    let mut counts = vec![0u64; LABELS_VALID.len()];
    for label in labels {
        if let Some(l) = LABELS_VALID.iter().position(|v| v == label) {
            counts[l] += 1;
        }
    }
    counts
}

pub fn write_frame_counts(path: &Path, counts: &[u64]) -> Result<()> {
    let mut file = fs::File::create(path)?;
    writeln!(file, "label,count")?;
    for (l, &label) in LABELS_VALID.iter().enumerate() {
        writeln!(file, "{label},{}", counts[l])?;
    }
    Ok(())
}

pub fn read_frame_counts(path: &Path) -> Result<Vec<u64>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut counts = vec![0u64; LABELS_VALID.len()];
    for record in reader.records() {
        let record = record?;
        let label: i32 = record.get(0).unwrap_or("").parse().map_err(|_| {
            PipelineError::DatasetLoad {
                path: path.to_path_buf(),
                reason: "unparseable label".into(),
            }
        })?;
        let count: u64 = record.get(1).unwrap_or("").parse().map_err(|_| {
            PipelineError::DatasetLoad {
                path: path.to_path_buf(),
                reason: "unparseable count".into(),
            }
        })?;
        if let Some(l) = LABELS_VALID.iter().position(|v| *v == label) {
            counts[l] = count;
        }
    }
    Ok(counts)
}

/// Result of one frequency analysis over all subjects.
pub struct FrequencyResult {
    pub auc_and: CountsTable,
    pub auc_or: CountsTable,
    pub aur_and: CountsTable,
    pub aur_or: CountsTable,
    pub frames_per_label: Vec<u64>,
}

/// Whole-dataset AU frequency analysis.
pub struct FrequencyAnalysis {
    config: FrequencyConfig,
}

impl FrequencyAnalysis {
    pub fn new(config: FrequencyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Counts over all usable subjects and writes the five export files.
    pub fn run(&self) -> Result<PathBuf> {
        let dataset = OpenFaceDataset::new(&self.config.dir_data, &self.config.dir_labels)?;
        let channels_auc = dataset.channels_of(ChannelGroup::AuClassification);
        let channels_aur = dataset.channels_of(ChannelGroup::AuRegression);
        let subjects: Vec<String> = dataset
            .subject_list()
            .iter()
            .filter(|id| !self.config.subjects_no_use.contains(id))
            .cloned()
            .collect();
        log::info!(
            "[Frequency] Starting AU frequency analysis over {} subjects",
            subjects.len()
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.nof_processes)
            .build()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        let results: Vec<FrequencyResult> = pool.install(|| {
            subjects
                .par_iter()
                .map(|id| self.analyze_subject(&dataset, id, &channels_auc, &channels_aur))
                .collect::<Result<Vec<_>>>()
        })?;

        let mut total = FrequencyResult {
            auc_and: CountsTable::zeros(channels_auc.clone()),
            auc_or: CountsTable::zeros(channels_auc),
            aur_and: CountsTable::zeros(channels_aur.clone()),
            aur_or: CountsTable::zeros(channels_aur),
            frames_per_label: vec![0; LABELS_VALID.len()],
        };
        for result in &results {
            total.auc_and.merge(&result.auc_and)?;
            total.auc_or.merge(&result.auc_or)?;
            total.aur_and.merge(&result.aur_and)?;
            total.aur_or.merge(&result.aur_or)?;
            for (t, s) in total.frames_per_label.iter_mut().zip(&result.frames_per_label) {
                *t += s;
            }
        }

        log::info!("[Frequency] Writing frequency analysis results");
        let dir_out = self.config.dir_export.clone();
        fs::create_dir_all(&dir_out)?;
        total.auc_and.write_csv(&dir_out.join("counts_AUc_and.csv"))?;
        total.auc_or.write_csv(&dir_out.join("counts_AUc_or.csv"))?;
        total.aur_and.write_csv(&dir_out.join("counts_AUr_and.csv"))?;
        total.aur_or.write_csv(&dir_out.join("counts_AUr_or.csv"))?;
        write_frame_counts(
            &dir_out.join("nof_frames_per_label.csv"),
            &total.frames_per_label,
        )?;
        log::info!("[Frequency] Finished");
        Ok(dir_out)
    }

    fn analyze_subject(
        &self,
        dataset: &OpenFaceDataset,
        subject_id: &str,
        channels_auc: &[String],
        channels_aur: &[String],
    ) -> Result<FrequencyResult> {
        let mut labels = dataset.load_labels(subject_id)?;
        let mut auc = dataset.load_data(subject_id, channels_auc)?;
        let mut aur = dataset.load_data(subject_id, channels_aur)?;

        // optional confidence filtering drops low-confidence frames from
        // data and labels jointly
        if let Some(eps_conf) = self.config.eps_confidence {
            let confidence = dataset.load_data(subject_id, &["confidence".to_string()])?;
            let keep: Vec<bool> = confidence
                .channel("confidence")?
                .iter()
                .map(|c| *c > eps_conf)
                .collect();
            auc = mask_recording(&auc, &keep)?;
            aur = mask_recording(&aur, &keep)?;
            labels = labels
                .iter()
                .zip(&keep)
                .filter(|(_, k)| **k)
                .map(|(l, _)| *l)
                .collect();
        }

        let result = FrequencyResult {
            auc_and: count_pair_occurrences(&auc, &labels, 1.0, PairOp::And),
            auc_or: count_pair_occurrences(&auc, &labels, 1.0, PairOp::Or),
            aur_and: count_pair_occurrences(&aur, &labels, self.config.eps_activity, PairOp::And),
            aur_or: count_pair_occurrences(&aur, &labels, self.config.eps_activity, PairOp::Or),
            frames_per_label: count_frames_per_label(&labels),
        };
        log::info!("[Frequency] Finished S{subject_id}");
        Ok(result)
    }
}

fn mask_recording(recording: &Recording, keep: &[bool]) -> Result<Recording> {
    let names = recording.channel_names().to_vec();
    let mut data = Vec::with_capacity(names.len());
    for name in &names {
        let channel = recording.channel(name)?;
        data.push(
            channel
                .iter()
                .zip(keep)
                .filter(|(_, k)| **k)
                .map(|(v, _)| *v)
                .collect(),
        );
    }
    Recording::new(names, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording() -> Recording {
        Recording::new(
            vec!["AU01_c".to_string(), "AU02_c".to_string()],
            vec![
                vec![1.0, 1.0, 0.0, 1.0, 0.0],
                vec![1.0, 0.0, 1.0, 1.0, 0.0],
            ],
        )
        .unwrap()
    }

    fn label_idx(label: i32) -> usize {
        LABELS_VALID.iter().position(|v| *v == label).unwrap()
    }

    #[test]
    fn test_and_counts() {
        let labels = [0, 0, 0, 1, 1];
        let table = count_pair_occurrences(&recording(), &labels, 1.0, PairOp::And);
        let zero = &table.counts[label_idx(0)];
        // frame 0 both active; frame 1 only AU01; frame 2 only AU02
        assert_eq!(zero[[0, 0]], 2);
        assert_eq!(zero[[1, 1]], 2);
        assert_eq!(zero[[0, 1]], 1);
        assert_eq!(zero[[1, 0]], 1);
        let one = &table.counts[label_idx(1)];
        // frame 3 both active, frame 4 neither
        assert_eq!(one[[0, 1]], 1);
        assert_eq!(one[[0, 0]], 1);
    }

    #[test]
    fn test_or_counts() {
        let labels = [0, 0, 0, 1, 1];
        let table = count_pair_occurrences(&recording(), &labels, 1.0, PairOp::Or);
        let zero = &table.counts[label_idx(0)];
        assert_eq!(zero[[0, 1]], 3);
        let one = &table.counts[label_idx(1)];
        assert_eq!(one[[0, 1]], 1);
    }

    #[test]
    fn test_invalid_labels_are_skipped() {
        let labels = [-10, -10, 0, 0, 0];
        let table = count_pair_occurrences(&recording(), &labels, 1.0, PairOp::And);
        let zero = &table.counts[label_idx(0)];
        // only frames 2..4 carry label 0
        assert_eq!(zero[[0, 0]], 1);
        assert_eq!(zero[[0, 1]], 1);
    }

    #[test]
    fn test_nan_frames_are_inactive() {
        let rec = Recording::new(
            vec!["AU01_c".to_string()],
            vec![vec![f64::NAN, 1.0]],
        )
        .unwrap();
        let table = count_pair_occurrences(&rec, &[0, 0], 1.0, PairOp::And);
        assert_eq!(table.counts[label_idx(0)][[0, 0]], 1);
    }

    #[test]
    fn test_merge_and_aggregate() {
        let labels_a = [0, 0, 0, 1, 1];
        let labels_b = [1, 1, 1, 1, 1];
        let mut total = count_pair_occurrences(&recording(), &labels_a, 1.0, PairOp::And);
        let other = count_pair_occurrences(&recording(), &labels_b, 1.0, PairOp::And);
        total.merge(&other).unwrap();
        let agg = total.aggregate(&[0, 1]);
        // equals counting all frames of both label streams
        assert_eq!(agg[[0, 0]], 3 + 3);
        assert_eq!(agg[[0, 1]], 2 + 2);
    }

    #[test]
    fn test_counts_csv_roundtrip() {
        let labels = [0, 0, 0, 2, 2];
        let table = count_pair_occurrences(&recording(), &labels, 1.0, PairOp::And);
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("counts.csv");
        table.write_csv(&path).unwrap();
        let parsed = CountsTable::read_csv(&path).unwrap();
        assert_eq!(parsed.au_names, table.au_names);
        for l in 0..LABELS_VALID.len() {
            assert_eq!(parsed.counts[l], table.counts[l]);
        }
    }

    #[test]
    fn test_frame_counts() {
        let counts = count_frames_per_label(&[0, 0, 1, -3, -10]);
        assert_eq!(counts[label_idx(0)], 2);
        assert_eq!(counts[label_idx(1)], 1);
        assert_eq!(counts[label_idx(-3)], 1);
        assert_eq!(counts.iter().sum::<u64>(), 4);
    }
}
