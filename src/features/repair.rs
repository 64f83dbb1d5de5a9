//! Repair of corrupt feature values
//!
//! Degenerate slices (constant channels, zero-division in ratio features)
//! leave NaN or infinite entries in the feature matrix. Repair runs before
//! standardization: infinities are first demoted to NaN, then the chosen
//! strategy fills or drops.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// How to handle non-finite feature entries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepairStrategy {
    /// Replace with the column mean over finite entries of the same label,
    /// then drop rows that still carry NaN.
    Mean,
    /// Drop every row containing a non-finite entry.
    Delete,
    /// Replace every non-finite entry with a literal value.
    Value(f64),
}

/// Repairs the feature matrix. `row_labels` holds the slice label of each
/// row. Returns the repaired matrix and the kept original row indices, in
/// order.
pub fn repair(
    features: &Array2<f64>,
    row_labels: &[i32],
    strategy: RepairStrategy,
) -> (Array2<f64>, Vec<usize>) {
    let mut data = features.clone();
    data.mapv_inplace(|v| if v.is_infinite() { f64::NAN } else { v });

    match strategy {
        RepairStrategy::Value(fill) => {
            data.mapv_inplace(|v| if v.is_nan() { fill } else { v });
            (data, (0..row_labels.len()).collect())
        }
        RepairStrategy::Delete => drop_nan_rows(data, row_labels.len()),
        RepairStrategy::Mean => {
            let mut labels_seen: Vec<i32> = row_labels.to_vec();
            labels_seen.sort_unstable();
            labels_seen.dedup();
            for label in labels_seen {
                fill_label_group_means(&mut data, row_labels, label);
            }
            drop_nan_rows(data, row_labels.len())
        }
    }
}

/// Fills NaNs in rows of `label` with the per-column mean over the finite
/// entries of the same label group. Columns with no finite entry in the
/// group stay NaN.
fn fill_label_group_means(data: &mut Array2<f64>, row_labels: &[i32], label: i32) {
    let rows: Vec<usize> = (0..row_labels.len())
        .filter(|&r| row_labels[r] == label)
        .collect();
    for col in 0..data.ncols() {
        let mut sum = 0.0;
        let mut count = 0usize;
        for &r in &rows {
            let v = data[[r, col]];
            if !v.is_nan() {
                sum += v;
                count += 1;
            }
        }
        if count == 0 {
            continue;
        }
        let mean = sum / count as f64;
        for &r in &rows {
            if data[[r, col]].is_nan() {
                data[[r, col]] = mean;
            }
        }
    }
}

fn drop_nan_rows(data: Array2<f64>, nof_rows: usize) -> (Array2<f64>, Vec<usize>) {
    let keep: Vec<usize> = (0..nof_rows)
        .filter(|&r| data.row(r).iter().all(|v| !v.is_nan()))
        .collect();
    (data.select(Axis(0), &keep), keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_value_strategy_fills_everything() {
        let features = array![[1.0, f64::NAN], [f64::INFINITY, 4.0]];
        let (repaired, kept) = repair(&features, &[1, 1], RepairStrategy::Value(0.0));
        assert_eq!(repaired, array![[1.0, 0.0], [0.0, 4.0]]);
        assert_eq!(kept, vec![0, 1]);
    }

    #[test]
    fn test_delete_strategy_drops_corrupt_rows() {
        let features = array![[1.0, 2.0], [f64::NAN, 4.0], [5.0, f64::NEG_INFINITY], [7.0, 8.0]];
        let (repaired, kept) = repair(&features, &[1, 1, 100, 100], RepairStrategy::Delete);
        assert_eq!(kept, vec![0, 3]);
        assert_eq!(repaired, array![[1.0, 2.0], [7.0, 8.0]]);
    }

    #[test]
    fn test_mean_strategy_fills_within_label_group() {
        let features = array![
            [1.0, 10.0],
            [3.0, f64::NAN],
            [100.0, 50.0],
            [f64::NAN, 70.0]
        ];
        let (repaired, kept) = repair(&features, &[1, 1, 100, 100], RepairStrategy::Mean);
        assert_eq!(kept, vec![0, 1, 2, 3]);
        // filled from the same label group only
        assert_eq!(repaired[[1, 1]], 10.0);
        assert_eq!(repaired[[3, 0]], 100.0);
    }

    #[test]
    fn test_mean_strategy_drops_unfillable_rows() {
        // the label-2 group has no finite entry in column 0 at all
        let features = array![[f64::NAN, 1.0], [f64::NAN, 2.0], [5.0, 3.0]];
        let (repaired, kept) = repair(&features, &[2, 2, 1], RepairStrategy::Mean);
        assert_eq!(kept, vec![2]);
        assert_eq!(repaired.nrows(), 1);
        assert_eq!(repaired[[0, 0]], 5.0);
    }
}
