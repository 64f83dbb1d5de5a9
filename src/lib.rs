//! Pain-recognition pipeline for the X-ITE pain database
//!
//! The pipeline runs in stages, each driven by its own configuration:
//!
//! 1. [`video_labels`] resamples the raw stimulus labels onto the video
//!    frame rate of the OpenFace exports.
//! 2. [`preprocess`] segments each recording into labeled slices, filters
//!    the channels and extracts statistical features per slice.
//! 3. [`graph`] counts Action Unit co-occurrences per label and derives
//!    weighted adjacency matrices from them.
//! 4. [`train`] runs subject-wise k-fold cross-validation of GCN and GAT
//!    classifiers on the slice features over the AU graph.
//!
//! [`dataset`] holds the loaders shared by the stages, [`config`] their
//! configurations, [`labels`] the X-ITE label taxonomy.

pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod filter;
pub mod graph;
pub mod labels;
pub mod preprocess;
pub mod segment;
pub mod train;
pub mod video_labels;

pub use error::{PipelineError, Result};
