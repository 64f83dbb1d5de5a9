//! OpenFace results of the frontal face videos
//!
//! One CSV per subject, named `S<id>_fvf.csv`, with whitespace-padded
//! headers and `NaN` markers for frames where the face tracker lost the
//! face. Labels live in a sibling directory as `S<id>.csv`, one label per
//! frame.

use crate::dataset::Recording;
use crate::error::{PipelineError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Channel families of the OpenFace export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelGroup {
    /// Action Unit intensities (`AU.._r`), range 0 to 5.
    AuRegression,
    /// Binary Action Unit activations (`AU.._c`).
    AuClassification,
    /// Head pose channels (`pose_..`).
    Pose,
    /// 2D facial landmarks (`x_..`, `y_..`).
    Landmarks2d,
    /// 3D facial landmarks (`X_..`, `Y_..`, `Z_..`).
    Landmarks3d,
}

impl ChannelGroup {
    fn matches(&self, name: &str) -> bool {
        match self {
            ChannelGroup::AuRegression => name.contains("AU") && name.contains("_r"),
            ChannelGroup::AuClassification => name.contains("AU") && name.contains("_c"),
            ChannelGroup::Pose => name.contains("pose_"),
            ChannelGroup::Landmarks2d => name.contains("x_"),
            ChannelGroup::Landmarks3d => name.contains("X_"),
        }
    }
}

/// Access to the raw OpenFace exports of all subjects.
#[derive(Debug, Clone)]
pub struct OpenFaceDataset {
    root_data: PathBuf,
    root_labels: PathBuf,
    subject_list: Vec<String>,
    channels: Vec<String>,
}

impl OpenFaceDataset {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(root_data: P, root_labels: Q) -> Result<Self> {
        let root_data = root_data.as_ref().to_path_buf();
        let root_labels = root_labels.as_ref().to_path_buf();
        let subject_list = scan_subject_ids(&root_data, "_fvf.csv")?;
        let channels = match subject_list.first() {
            Some(id) => read_header(&root_data.join(format!("S{id}_fvf.csv")))?,
            None => Vec::new(),
        };
        Ok(Self {
            root_data,
            root_labels,
            subject_list,
            channels,
        })
    }

    /// Subject ids with an available data file, sorted ascending.
    pub fn subject_list(&self) -> &[String] {
        &self.subject_list
    }

    /// All channel names of the export, in file order.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Channel names of one family, in file order.
    pub fn channels_of(&self, group: ChannelGroup) -> Vec<String> {
        self.channels
            .iter()
            .filter(|c| group.matches(c))
            .cloned()
            .collect()
    }

    /// Loads the requested channels of one subject, in the given order.
    pub fn load_data(&self, subject_id: &str, channels: &[String]) -> Result<Recording> {
        let path = self.root_data.join(format!("S{subject_id}_fvf.csv"));
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)?;
        let headers = reader.headers()?.clone();
        let mut cols = Vec::with_capacity(channels.len());
        for name in channels {
            let idx = headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| PipelineError::UnknownChannel(name.clone()))?;
            cols.push(idx);
        }

        let mut data: Vec<Vec<f64>> = vec![Vec::new(); channels.len()];
        for record in reader.records() {
            let record = record?;
            for (c, &idx) in cols.iter().enumerate() {
                let field = record.get(idx).unwrap_or("");
                data[c].push(parse_value(field, &path)?);
            }
        }
        Recording::new(channels.to_vec(), data)
    }

    /// Loads the per-frame labels of one subject.
    pub fn load_labels(&self, subject_id: &str) -> Result<Vec<i32>> {
        let path = self.root_labels.join(format!("S{subject_id}.csv"));
        load_label_file(&path)
    }

    pub fn label_path(&self, subject_id: &str) -> PathBuf {
        self.root_labels.join(format!("S{subject_id}.csv"))
    }
}

/// Reads a single-column label file with a header line.
pub fn load_label_file(path: &Path) -> Result<Vec<i32>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut labels = Vec::new();
    for record in reader.records() {
        let record = record?;
        let field = record.get(0).unwrap_or("");
        let value = parse_value(field, path)?;
        labels.push(value as i32);
    }
    Ok(labels)
}

/// Subject ids from `S<id><suffix>` file names under `root`, sorted.
pub fn scan_subject_ids(root: &Path, suffix: &str) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(stem) = name.strip_suffix(suffix) {
            if let Some(id) = stem.strip_prefix('S') {
                ids.push(id.to_string());
            }
        }
    }
    ids.sort();
    Ok(ids)
}

fn read_header(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    Ok(reader.headers()?.iter().map(str::to_string).collect())
}

fn parse_value(field: &str, path: &Path) -> Result<f64> {
    if field.is_empty() {
        return Ok(f64::NAN);
    }
    field.parse::<f64>().map_err(|_| PipelineError::DatasetLoad {
        path: path.to_path_buf(),
        reason: format!("unparseable value '{field}'"),
    })
}
