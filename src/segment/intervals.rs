//! Interval detection over a per-frame label stream

use crate::labels::is_pain_label;

/// Maximal runs of a constant label, in stream order. The four vectors are
/// parallel; `end_idxs` is inclusive.
#[derive(Debug, Clone, Default)]
pub struct Intervals {
    pub start_idxs: Vec<usize>,
    pub end_idxs: Vec<usize>,
    pub labels: Vec<i32>,
    pub durations: Vec<usize>,
}

impl Intervals {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Scans the label stream into intervals and relabels baseline intervals
/// that directly follow a pain interval to 100x the pain label.
///
/// Only the immediate predecessor is inspected: a baseline run two
/// intervals after the stimulus keeps label 0.
pub fn compute_intervals(labels: &[i32]) -> Intervals {
    let mut intervals = Intervals::default();
    if labels.is_empty() {
        return intervals;
    }

    let mut start = 0;
    for i in 1..=labels.len() {
        if i == labels.len() || labels[i] != labels[i - 1] {
            intervals.start_idxs.push(start);
            intervals.end_idxs.push(i - 1);
            intervals.labels.push(labels[start]);
            intervals.durations.push(i - start);
            start = i;
        }
    }

    // recovery relabel, based on the predecessor's original label
    for k in (1..intervals.len()).rev() {
        if intervals.labels[k] == 0 && is_pain_label(intervals.labels[k - 1]) {
            intervals.labels[k] = intervals.labels[k - 1] * 100;
        }
    }

    intervals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_interval() {
        let intervals = compute_intervals(&[0, 0, 0, 0]);
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals.start_idxs, vec![0]);
        assert_eq!(intervals.end_idxs, vec![3]);
        assert_eq!(intervals.labels, vec![0]);
        assert_eq!(intervals.durations, vec![4]);
    }

    #[test]
    fn test_boundaries_and_durations() {
        let labels = [0, 0, 0, 1, 1, 1, 1, 0, 0];
        let intervals = compute_intervals(&labels);
        assert_eq!(intervals.start_idxs, vec![0, 3, 7]);
        assert_eq!(intervals.end_idxs, vec![2, 6, 8]);
        assert_eq!(intervals.durations, vec![3, 4, 2]);
    }

    #[test]
    fn test_baseline_after_pain_is_relabeled() {
        let labels = [0, 0, 2, 2, 0, 0, -3, -3, 0, 0];
        let intervals = compute_intervals(&labels);
        assert_eq!(intervals.labels, vec![0, 2, 200, -3, -300]);
    }

    #[test]
    fn test_relabel_is_single_hop() {
        // the second baseline run after the stimulus keeps label 0
        let labels = [1, 1, 0, 0, -10, -10, 0, 0];
        let intervals = compute_intervals(&labels);
        assert_eq!(intervals.labels, vec![1, 100, -10, 0]);
    }

    #[test]
    fn test_leading_baseline_not_relabeled() {
        let intervals = compute_intervals(&[0, 0, 1, 1]);
        assert_eq!(intervals.labels, vec![0, 1]);
    }

    #[test]
    fn test_empty_stream() {
        assert!(compute_intervals(&[]).is_empty());
    }
}
