//! Physiological recordings of the X-ITE pain database
//!
//! One MAT file per subject, `S<id>.mat`, holding the matrix `data` with
//! one column per bio channel at 1000 Hz and the vector `stimuli` with the
//! per-sample label.

use crate::dataset::openface::scan_subject_ids;
use crate::dataset::Recording;
use crate::error::{PipelineError, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Bio channels in their column order within `data`.
pub const BIO_CHANNELS: [&str; 5] = ["corrugator", "zygomaticus", "trapezius", "scl", "ecg"];

#[derive(Debug, Clone)]
pub struct BioDataset {
    dir_data: PathBuf,
}

impl BioDataset {
    pub fn new<P: AsRef<Path>>(dir_data: P) -> Self {
        Self {
            dir_data: dir_data.as_ref().to_path_buf(),
        }
    }

    pub fn subject_list(&self) -> Result<Vec<String>> {
        scan_subject_ids(&self.dir_data, ".mat")
    }

    /// Loads the requested bio channels of one subject, in the given order.
    pub fn load_data(&self, subject_id: &str, channels: &[String]) -> Result<Recording> {
        let path = self.dir_data.join(format!("S{subject_id}.mat"));
        let matrix = load_matrix(&path, "data")?;
        let (nof_frames, values) = (matrix.nrows, matrix.values);

        let mut data = Vec::with_capacity(channels.len());
        for name in channels {
            let col = BIO_CHANNELS
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| PipelineError::UnknownChannel(name.clone()))?;
            // MAT matrices are column-major
            let column = values[col * nof_frames..(col + 1) * nof_frames].to_vec();
            data.push(column);
        }
        Recording::new(channels.to_vec(), data)
    }

    /// Loads the per-sample stimulus labels of one subject.
    pub fn load_labels(&self, subject_id: &str) -> Result<Vec<i32>> {
        let path = self.dir_data.join(format!("S{subject_id}.mat"));
        let matrix = load_matrix(&path, "stimuli")?;
        Ok(matrix.values.iter().map(|v| *v as i32).collect())
    }
}

/// A dense 2D MAT variable, column-major.
pub(crate) struct Matrix {
    pub(crate) nrows: usize,
    pub(crate) values: Vec<f64>,
}

pub(crate) fn load_matrix(path: &Path, name: &str) -> Result<Matrix> {
    let load_err = |reason: String| PipelineError::DatasetLoad {
        path: path.to_path_buf(),
        reason,
    };
    let file = File::open(path)?;
    let mat = matfile::MatFile::parse(BufReader::new(file))
        .map_err(|e| load_err(format!("MAT parse error: {e}")))?;
    let array = mat
        .find_by_name(name)
        .ok_or_else(|| load_err(format!("variable '{name}' not found")))?;
    let size = array.size();
    if size.len() != 2 {
        return Err(load_err(format!(
            "variable '{name}' is not a 2-dimensional matrix"
        )));
    }
    Ok(Matrix {
        nrows: size[0],
        values: numeric_to_f64(array.data()),
    })
}

fn numeric_to_f64(data: &matfile::NumericData) -> Vec<f64> {
    use matfile::NumericData::*;
    match data {
        Double { real, .. } => real.clone(),
        Single { real, .. } => real.iter().map(|v| *v as f64).collect(),
        Int8 { real, .. } => real.iter().map(|v| *v as f64).collect(),
        UInt8 { real, .. } => real.iter().map(|v| *v as f64).collect(),
        Int16 { real, .. } => real.iter().map(|v| *v as f64).collect(),
        UInt16 { real, .. } => real.iter().map(|v| *v as f64).collect(),
        Int32 { real, .. } => real.iter().map(|v| *v as f64).collect(),
        UInt32 { real, .. } => real.iter().map(|v| *v as f64).collect(),
        Int64 { real, .. } => real.iter().map(|v| *v as f64).collect(),
        UInt64 { real, .. } => real.iter().map(|v| *v as f64).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_order_is_fixed() {
        assert_eq!(BIO_CHANNELS[0], "corrugator");
        assert_eq!(BIO_CHANNELS[4], "ecg");
    }

    #[test]
    fn test_missing_file_is_a_load_error() {
        let tmp = tempfile::tempdir().unwrap();
        let ds = BioDataset::new(tmp.path());
        assert!(ds.load_data("001", &["ecg".to_string()]).is_err());
    }

    #[test]
    fn test_subject_scan_ignores_other_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("S001.mat"), b"").unwrap();
        std::fs::write(tmp.path().join("S010.mat"), b"").unwrap();
        std::fs::write(tmp.path().join("readme.txt"), b"").unwrap();
        let ds = BioDataset::new(tmp.path());
        assert_eq!(
            ds.subject_list().unwrap(),
            vec!["001".to_string(), "010".to_string()]
        );
    }
}
