//! Segmentation of per-frame label streams
//!
//! Two steps: `intervals` turns the raw label stream into maximal
//! constant-label runs (relabeling recovery phases after pain), `slices`
//! applies the per-group policy tables to select the windows that feature
//! extraction operates on.

pub mod intervals;
pub mod slices;

pub use intervals::{compute_intervals, Intervals};
pub use slices::{compute_slices, Slice};
