//! Video label generation from the raw stimulus labels
//!
//! The stimulus labels are recorded at the bio sampling rate; the videos
//! run at 25 Hz. Interval boundaries are scaled down and snapped to whole
//! frame indices so that adjacent intervals stay gapless: per boundary the
//! scaled end and the scaled start compete for the nearest frame, the loser
//! moves one frame aside.

use crate::dataset::bio;
use crate::dataset::openface::OpenFaceDataset;
use crate::error::Result;
use crate::labels::SAMPLE_RATE_VIDEO;
use rayon::prelude::*;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Label written for video frames not covered by the label recording.
pub const LABEL_UNCOVERED: i32 = -11;

/// Resamples a per-sample label stream to `nof_frames_video` frames.
/// Frames beyond the label recording get [`LABEL_UNCOVERED`].
pub fn resample_labels(
    labels: &[i32],
    fs_label: f64,
    fs_video: f64,
    nof_frames_video: usize,
) -> Vec<i32> {
    let ratio = fs_video / fs_label;
    let mut video = vec![LABEL_UNCOVERED; nof_frames_video];
    if labels.is_empty() || nof_frames_video == 0 {
        return video;
    }

    // boundary b sits between samples idxs_end[b] and idxs_end[b] + 1
    let boundary_idxs: Vec<usize> = (0..labels.len() - 1)
        .filter(|&i| labels[i + 1] != labels[i])
        .collect();
    let mut interval_labels = vec![labels[0]];
    interval_labels.extend(boundary_idxs.iter().map(|&i| labels[i + 1]));

    let mut ends = Vec::with_capacity(boundary_idxs.len() + 1);
    let mut starts = Vec::with_capacity(boundary_idxs.len() + 1);
    starts.push(0i64);
    for &i in &boundary_idxs {
        let end_scaled = i as f64 * ratio;
        let start_scaled = (i + 1) as f64 * ratio;
        let reference = end_scaled.round();
        if (reference - end_scaled).abs() <= (reference - start_scaled).abs() {
            ends.push(reference as i64);
            starts.push(reference as i64 + 1);
        } else {
            ends.push(reference as i64 - 1);
            starts.push(reference as i64);
        }
    }
    ends.push((labels.len() as f64 * ratio).round() as i64);

    for k in 0..starts.len() {
        let start = starts[k].max(0) as usize;
        let end = ends[k];
        if end < 0 {
            continue;
        }
        let end = (end as usize).min(nof_frames_video.saturating_sub(1));
        for frame in video.iter_mut().take(end + 1).skip(start) {
            *frame = interval_labels[k];
        }
        if end + 1 >= nof_frames_video {
            break;
        }
    }
    video
}

/// Generates the per-subject video label files.
///
/// For each subject with an OpenFace export, the raw label MAT file
/// `S<id>.mat` (variables `fs` and `data`) is resampled to the subject's
/// video frame count and written to `dir_out/S<id>.csv`. Subjects without
/// a label file are skipped with a warning.
pub struct VideoLabelGenerator {
    dir_labels_raw: PathBuf,
    dir_out: PathBuf,
}

impl VideoLabelGenerator {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(dir_labels_raw: P, dir_out: Q) -> Self {
        Self {
            dir_labels_raw: dir_labels_raw.as_ref().to_path_buf(),
            dir_out: dir_out.as_ref().to_path_buf(),
        }
    }

    pub fn generate_all(&self, openface: &OpenFaceDataset, nof_processes: usize) -> Result<()> {
        log::info!("[VideoLabels] Starting video label generation");
        fs::create_dir_all(&self.dir_out)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(nof_processes)
            .build()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        pool.install(|| {
            openface
                .subject_list()
                .par_iter()
                .map(|subject_id| self.generate_subject(openface, subject_id))
                .collect::<Result<Vec<_>>>()
        })?;
        log::info!("[VideoLabels] Finished video label generation");
        Ok(())
    }

    fn generate_subject(&self, openface: &OpenFaceDataset, subject_id: &str) -> Result<()> {
        let mat_path = self.dir_labels_raw.join(format!("S{subject_id}.mat"));
        let (fs_label, labels) = match self.load_raw_labels(&mat_path) {
            Ok(loaded) => loaded,
            Err(e) => {
                log::warn!("[VideoLabels] No label file for S{subject_id}: {e}");
                return Ok(());
            }
        };

        let frame_count = openface
            .load_data(subject_id, &["AU01_r".to_string()])?
            .nof_frames();
        let video_labels = resample_labels(&labels, fs_label, SAMPLE_RATE_VIDEO, frame_count);

        let covered = video_labels
            .iter()
            .rposition(|l| *l != LABEL_UNCOVERED)
            .map_or(0, |i| i + 1);
        if covered < frame_count {
            let diff = frame_count - covered;
            log::warn!(
                "[VideoLabels] S{subject_id}: video recorded longer than labels \
                 (diff = {diff} frames = {:.2}s)",
                diff as f64 / SAMPLE_RATE_VIDEO
            );
        }

        let path = self.dir_out.join(format!("S{subject_id}.csv"));
        let mut file = fs::File::create(&path)?;
        writeln!(file, "label")?;
        for label in &video_labels {
            writeln!(file, "{label}")?;
        }
        log::info!("[VideoLabels] Generated label file for S{subject_id}");
        Ok(())
    }

    fn load_raw_labels(&self, path: &Path) -> Result<(f64, Vec<i32>)> {
        let fs = bio::load_matrix(path, "fs")?;
        let data = bio::load_matrix(path, "data")?;
        let fs_label = *fs.values.first().ok_or_else(|| {
            crate::error::PipelineError::DatasetLoad {
                path: path.to_path_buf(),
                reason: "empty 'fs' variable".into(),
            }
        })?;
        Ok((fs_label, data.values.iter().map(|v| *v as i32).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_ratio_boundaries() {
        // 100 Hz labels to 25 Hz video: every 4th sample is a frame
        let mut labels = vec![0; 40];
        labels.extend(vec![1; 40]);
        labels.extend(vec![0; 40]);
        let video = resample_labels(&labels, 100.0, 25.0, 30);
        assert_eq!(&video[0..10], vec![0; 10].as_slice());
        assert_eq!(&video[10..20], vec![1; 10].as_slice());
        assert_eq!(&video[20..30], vec![0; 10].as_slice());
    }

    #[test]
    fn test_boundaries_stay_gapless() {
        // boundary positions that do not land on whole frames
        let mut labels = vec![0; 83];
        labels.extend(vec![2; 91]);
        labels.extend(vec![0; 66]);
        let n_video = (240.0 * 25.0 / 1000.0) as usize;
        let video = resample_labels(&labels, 1000.0, 25.0, n_video);
        // every frame carries exactly one of the interval labels
        assert!(video.iter().all(|l| [0, 2].contains(l)));
        // label order is preserved
        let first_two = video.iter().position(|l| *l == 2).unwrap();
        let last_two = video.iter().rposition(|l| *l == 2).unwrap();
        assert!(video[first_two..=last_two].iter().all(|l| *l == 2));
    }

    #[test]
    fn test_video_longer_than_labels() {
        let labels = vec![3; 400];
        // labels cover 10 video frames, the video has 15
        let video = resample_labels(&labels, 1000.0, 25.0, 15);
        assert_eq!(&video[0..10], vec![3; 10].as_slice());
        assert!(video[11..].iter().all(|l| *l == LABEL_UNCOVERED));
    }

    #[test]
    fn test_labels_longer_than_video() {
        let mut labels = vec![0; 4000];
        labels.extend(vec![5; 4000]);
        let video = resample_labels(&labels, 1000.0, 25.0, 50);
        assert_eq!(video.len(), 50);
        assert!(video.iter().all(|l| *l == 0), "fill stops at the video end");
    }

    #[test]
    fn test_empty_inputs() {
        assert!(resample_labels(&[], 1000.0, 25.0, 0).is_empty());
        assert_eq!(
            resample_labels(&[], 1000.0, 25.0, 3),
            vec![LABEL_UNCOVERED; 3]
        );
    }
}
