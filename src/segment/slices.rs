//! Policy-based slice selection
//!
//! A slice is a fixed window carved out of a qualifying interval. Pain
//! intervals qualify when they are flanked by baseline, long enough (with a
//! two-frame tolerance for boundary rounding in resampled labels) and their
//! window does not run into the next stimulus. Relabeled recovery intervals
//! qualify when they are long enough for the shifted baseline window.

use crate::config::GroupPolicy;
use crate::error::{PipelineError, Result};
use crate::labels::{is_base_label, label_group, LABELS_PAIN};
use crate::segment::Intervals;
use std::collections::BTreeMap;

/// One selected window. `end` is inclusive and may exceed the recording
/// length; extraction clamps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub start: usize,
    pub end: usize,
    pub label: i32,
}

fn policy_for(policies: &BTreeMap<String, GroupPolicy>, name: &str) -> Result<GroupPolicy> {
    policies
        .get(name)
        .cloned()
        .ok_or_else(|| PipelineError::InvalidConfig(format!("no slice policy for group '{name}'")))
}

/// Selects all pain and baseline slices from the interval table.
///
/// Slices are emitted grouped by pain label, pain windows before the
/// matching baseline windows, so slice ids are stable across runs.
pub fn compute_slices(
    intervals: &Intervals,
    policies: &BTreeMap<String, GroupPolicy>,
    fs: f64,
) -> Result<Vec<Slice>> {
    let n = intervals.len();
    let mut slices = Vec::new();

    for &label in LABELS_PAIN.iter() {
        let group = label_group(label)?;
        let policy = policy_for(policies, group.name())?;

        for k in 0..n {
            if intervals.labels[k] != label {
                continue;
            }
            // both neighbours must exist and be baseline
            if k == 0 || k + 1 == n {
                continue;
            }
            let pre = intervals.labels[k - 1];
            let post = intervals.labels[k + 1];
            if !(is_base_label(pre) || pre == 0) || !(is_base_label(post) || post == 0) {
                continue;
            }
            if (intervals.durations[k - 1] as f64) < policy.pre_interval_min {
                continue;
            }
            let duration = intervals.durations[k] as f64;
            if duration < policy.interval_min * fs - 2.0 {
                continue;
            }
            if (intervals.durations[k + 1] as f64) < policy.post_interval_min {
                continue;
            }
            // the shifted window must not reach into the next stimulus
            let overlap = policy.shift * fs + policy.length * fs - duration;
            if overlap > intervals.durations[k + 1] as f64 {
                continue;
            }
            let start = (intervals.start_idxs[k] as f64 + policy.shift * fs).round() as usize;
            let end = start + (policy.length * fs).round() as usize;
            slices.push(Slice { start, end, label });
        }

        for k in 0..n {
            if intervals.labels[k] != label * 100 {
                continue;
            }
            if k == 0 || intervals.labels[k - 1] != label {
                continue;
            }
            let needed = (policy.base_shift + policy.base_length) * fs;
            if (intervals.durations[k] as f64) < needed {
                continue;
            }
            let start = (intervals.start_idxs[k] as f64 + policy.base_shift * fs).round() as usize;
            let end = start + (policy.base_length * fs).round() as usize;
            slices.push(Slice {
                start,
                end,
                label: label * 100,
            });
        }
    }

    Ok(slices)
}
