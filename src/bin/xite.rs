//! Command line entry point for the X-ITE pain-recognition pipeline.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use xite_gnn::config::{AdjacencyConfig, FrequencyConfig, PreprocessConfig, TrainConfig};
use xite_gnn::dataset::openface::OpenFaceDataset;
use xite_gnn::graph::frequency::FrequencyAnalysis;
use xite_gnn::preprocess::Preprocessor;
use xite_gnn::train::Trainer;
use xite_gnn::video_labels::VideoLabelGenerator;

#[derive(Parser)]
#[command(
    name = "xite",
    about = "Pain-recognition pipeline for the X-ITE pain database",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resample the raw stimulus labels onto the video frame rate
    VideoLabels {
        /// Directory with the per-subject OpenFace CSV exports
        #[arg(long)]
        dir_data: PathBuf,
        /// Directory with the raw label MAT files
        #[arg(long)]
        dir_labels_raw: PathBuf,
        /// Output directory for the per-subject label CSVs
        #[arg(long)]
        dir_out: PathBuf,
        /// Number of parallel worker threads
        #[arg(long, default_value_t = 4)]
        processes: usize,
    },
    /// Segment recordings into slices and extract per-slice features
    Preprocess {
        /// JSON configuration file; the built-in video defaults otherwise
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Count AU pair co-occurrences per label over the dataset
    Frequency {
        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Derive weighted adjacency matrices from the co-occurrence counts
    Adjacency {
        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run k-fold cross-validation training of a graph classifier
    Train {
        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::VideoLabels {
            dir_data,
            dir_labels_raw,
            dir_out,
            processes,
        } => {
            let openface = OpenFaceDataset::new(&dir_data, &dir_out)
                .context("scanning OpenFace exports")?;
            VideoLabelGenerator::new(&dir_labels_raw, &dir_out)
                .generate_all(&openface, processes)
                .context("generating video labels")?;
        }
        Command::Preprocess { config } => {
            let config = match config {
                Some(path) => PreprocessConfig::load_from_file(path)?,
                None => PreprocessConfig::default(),
            };
            let dir = Preprocessor::new(config)?.run().context("preprocessing")?;
            println!("features written to {}", dir.display());
        }
        Command::Frequency { config } => {
            let config = match config {
                Some(path) => FrequencyConfig::load_from_file(path)?,
                None => FrequencyConfig::default(),
            };
            let dir = FrequencyAnalysis::new(config)?
                .run()
                .context("frequency analysis")?;
            println!("counts written to {}", dir.display());
        }
        Command::Adjacency { config } => {
            let config = match config {
                Some(path) => AdjacencyConfig::load_from_file(path)?,
                None => AdjacencyConfig::default(),
            };
            let dir = xite_gnn::graph::adjacency::run(&config)
                .context("adjacency computation")?;
            println!("adjacency matrices written to {}", dir.display());
        }
        Command::Train { config } => {
            let config = match config {
                Some(path) => TrainConfig::load_from_file(path)?,
                None => TrainConfig::default(),
            };
            let summary = Trainer::new(config)?.run().context("training")?;
            println!(
                "{}: mean test accuracy {:.4} over {} folds",
                summary.model, summary.mean_test_accuracy, summary.num_folds
            );
        }
    }
    Ok(())
}
