//! Weighted adjacency matrices from co-occurrence counts
//!
//! Edge weights are relative frequencies approximating co-occurrence
//! probabilities. The delta matrix contrasts a pain label set against a
//! baseline label set: negative entries are clipped, the result can be
//! min-max normalized and sparsified by a percentile threshold.

use crate::config::{AdjacencyConfig, WeightMethod};
use crate::error::{PipelineError, Result};
use crate::graph::frequency::{read_frame_counts, CountsTable};
use crate::labels::LABELS_VALID;
use ndarray::Array2;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A weighted AU graph: node names plus dense weight matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjacencyMatrix {
    pub au_names: Vec<String>,
    pub values: Array2<f64>,
}

impl AdjacencyMatrix {
    /// Keeps only the given AUs, in their given order.
    pub fn select(&self, use_aus: &[String]) -> Result<AdjacencyMatrix> {
        let idx: Vec<usize> = use_aus
            .iter()
            .map(|au| {
                self.au_names
                    .iter()
                    .position(|name| name == au)
                    .ok_or_else(|| PipelineError::UnknownChannel(au.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        let values = Array2::from_shape_fn((idx.len(), idx.len()), |(i, j)| {
            self.values[[idx[i], idx[j]]]
        });
        Ok(AdjacencyMatrix {
            au_names: use_aus.to_vec(),
            values,
        })
    }

    /// Min-max normalization of all weights to [0, 1].
    pub fn normalize(&self) -> AdjacencyMatrix {
        let min = self.values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = self.values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let span = max - min;
        let values = if span > 0.0 {
            self.values.mapv(|v| (v - min) / span)
        } else {
            self.values.mapv(|_| 0.0)
        };
        AdjacencyMatrix {
            au_names: self.au_names.clone(),
            values,
        }
    }

    /// Zeroes every weight below the `eps` quantile of all entries.
    pub fn sparsify(&self, eps: f64) -> Result<AdjacencyMatrix> {
        if !(eps > 0.0 && eps < 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "eps has to be in (0, 1), got {eps}"
            )));
        }
        let threshold = percentile_all(&self.values, eps * 100.0);
        let values = self.values.mapv(|v| if v < threshold { 0.0 } else { v });
        Ok(AdjacencyMatrix {
            au_names: self.au_names.clone(),
            values,
        })
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut file = fs::File::create(path)?;
        writeln!(file, "AU,{}", self.au_names.join(","))?;
        for (i, au) in self.au_names.iter().enumerate() {
            let row: Vec<String> = (0..self.au_names.len())
                .map(|j| self.values[[i, j]].to_string())
                .collect();
            writeln!(file, "{au},{}", row.join(","))?;
        }
        Ok(())
    }

    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let load_err = |reason: String| PipelineError::DatasetLoad {
            path: path.to_path_buf(),
            reason,
        };
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;
        let au_names: Vec<String> = reader.headers()?.iter().skip(1).map(str::to_string).collect();
        let n = au_names.len();
        let mut values = Array2::zeros((n, n));
        for (i, record) in reader.records().enumerate() {
            let record = record?;
            if i >= n || record.len() != n + 1 {
                return Err(load_err("matrix shape mismatch".into()));
            }
            for (j, field) in record.iter().skip(1).enumerate() {
                values[[i, j]] = field
                    .parse()
                    .map_err(|_| load_err(format!("unparseable weight '{field}'")))?;
            }
        }
        Ok(AdjacencyMatrix { au_names, values })
    }
}

/// Linear-interpolation percentile over all matrix entries.
fn percentile_all(values: &Array2<f64>, q: f64) -> f64 {
    let mut flat: Vec<f64> = values.iter().cloned().collect();
    flat.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if flat.is_empty() {
        return f64::NAN;
    }
    let rank = (flat.len() - 1) as f64 * q / 100.0;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    flat[lo] + (flat[hi] - flat[lo]) * (rank - lo as f64)
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Relative frequency weights from aggregated counts.
///
/// `and`/`or` are label-aggregated pair counts, `total_frames` the frame
/// count of the aggregated labels. Empty denominators yield weight 0.
pub fn compute_weights(
    and: &Array2<u64>,
    or: Option<&Array2<u64>>,
    total_frames: u64,
    method: WeightMethod,
) -> Result<Array2<f64>> {
    let n = and.nrows();
    let weights = match method {
        WeightMethod::Uncond => {
            Array2::from_shape_fn((n, n), |(i, j)| ratio(and[[i, j]], total_frames))
        }
        WeightMethod::Cond => {
            Array2::from_shape_fn((n, n), |(i, j)| ratio(and[[i, j]], and[[j, j]]))
        }
        WeightMethod::Symm => {
            let or = or.ok_or_else(|| {
                PipelineError::InvalidConfig("symm weights need OR counts".into())
            })?;
            Array2::from_shape_fn((n, n), |(i, j)| ratio(and[[i, j]], or[[i, j]]))
        }
    };
    Ok(weights)
}

/// Adjacency matrix for one label set, loaded from a frequency export.
pub fn compute_adjacency_matrix(
    config: &AdjacencyConfig,
    use_labels: &[i32],
) -> Result<AdjacencyMatrix> {
    config.validate()?;
    let tag = config.au_method.tag();
    let and_table = CountsTable::read_csv(&config.input_dir.join(format!("counts_{tag}_and.csv")))?;
    let and = and_table.aggregate(use_labels);

    let (or, total_frames) = match config.computation_method {
        WeightMethod::Symm => {
            let or_table =
                CountsTable::read_csv(&config.input_dir.join(format!("counts_{tag}_or.csv")))?;
            (Some(or_table.aggregate(use_labels)), 0)
        }
        WeightMethod::Uncond => {
            let frames = read_frame_counts(&config.input_dir.join("nof_frames_per_label.csv"))?;
            let total: u64 = LABELS_VALID
                .iter()
                .enumerate()
                .filter(|(_, label)| use_labels.contains(*label))
                .map(|(l, _)| frames[l])
                .sum();
            (None, total)
        }
        WeightMethod::Cond => (None, 0),
    };

    let values = compute_weights(&and, or.as_ref(), total_frames, config.computation_method)?;
    let mut adj = AdjacencyMatrix {
        au_names: and_table.au_names,
        values,
    };
    if let Some(use_aus) = &config.use_aus {
        adj = adj.select(use_aus)?;
    }
    if let Some(eps) = config.eps {
        adj = adj.sparsify(eps)?;
    }
    Ok(adj)
}

/// Delta matrix: pain weights minus baseline weights, clipped at zero.
pub fn compute_adjacency_matrix_delta(config: &AdjacencyConfig) -> Result<AdjacencyMatrix> {
    // sparsification applies to the delta, not the operands
    let mut operand_config = config.clone();
    operand_config.eps = None;
    let pain = compute_adjacency_matrix(&operand_config, &config.pain_labels)?;
    let base = compute_adjacency_matrix(&operand_config, &config.base_labels)?;
    let values = (&pain.values - &base.values).mapv(|v| v.max(0.0));
    let mut adj = AdjacencyMatrix {
        au_names: pain.au_names,
        values,
    };
    if let Some(eps) = config.eps {
        adj = adj.sparsify(eps)?;
    }
    Ok(adj)
}

/// Computes pain, base, delta and normalized delta matrices and writes
/// them under the export directory.
pub fn run(config: &AdjacencyConfig) -> Result<PathBuf> {
    config.validate()?;
    log::info!(
        "[Adjacency] Computing {} adjacency matrices from {:?}",
        config.au_method.tag(),
        config.input_dir
    );
    let pain = compute_adjacency_matrix(config, &config.pain_labels)?;
    let base = compute_adjacency_matrix(config, &config.base_labels)?;
    let delta = compute_adjacency_matrix_delta(config)?;

    let dir_out = config.dir_export.clone();
    fs::create_dir_all(&dir_out)?;
    pain.write_csv(&dir_out.join("adjacency_matrix_pain.csv"))?;
    base.write_csv(&dir_out.join("adjacency_matrix_base.csv"))?;
    delta.write_csv(&dir_out.join("adjacency_matrix_delta.csv"))?;
    if config.normalize {
        delta
            .normalize()
            .write_csv(&dir_out.join("adjacency_matrix_delta_normalized.csv"))?;
    }
    log::info!("[Adjacency] Finished, results in {dir_out:?}");
    Ok(dir_out)
}
