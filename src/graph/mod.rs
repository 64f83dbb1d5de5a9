//! AU co-occurrence graph generation
//!
//! `frequency` counts how often Action Unit pairs are active together per
//! label over the whole dataset; `adjacency` turns those counts into
//! weighted graph adjacency matrices.

pub mod adjacency;
pub mod frequency;

pub use adjacency::AdjacencyMatrix;
pub use frequency::{count_pair_occurrences, CountsTable, PairOp};
