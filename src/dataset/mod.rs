//! Dataset access for the X-ITE pain database
//!
//! `openface` reads the per-subject OpenFace exports of the frontal face
//! videos, `bio` the physiological recordings stored as MAT files, and
//! `features` the feature tables produced by the preprocessing run.

pub mod bio;
pub mod features;
pub mod openface;

use crate::error::{PipelineError, Result};

/// One subject's recording: named channels over a shared frame axis.
#[derive(Debug, Clone)]
pub struct Recording {
    channels: Vec<String>,
    data: Vec<Vec<f64>>,
}

impl Recording {
    pub fn new(channels: Vec<String>, data: Vec<Vec<f64>>) -> Result<Self> {
        if let Some(first) = data.first() {
            let nof_frames = first.len();
            if data.iter().any(|c| c.len() != nof_frames) {
                return Err(PipelineError::InvalidConfig(
                    "channels differ in frame count".into(),
                ));
            }
        }
        Ok(Self { channels, data })
    }

    pub fn channel_names(&self) -> &[String] {
        &self.channels
    }

    pub fn nof_frames(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }

    /// Channels in order, as (name, data) pairs.
    pub fn channels_iter(&self) -> impl Iterator<Item = (&String, &[f64])> {
        self.channels
            .iter()
            .zip(self.data.iter().map(|v| v.as_slice()))
    }

    pub fn channel(&self, name: &str) -> Result<&[f64]> {
        self.channels
            .iter()
            .position(|c| c == name)
            .map(|i| self.data[i].as_slice())
            .ok_or_else(|| PipelineError::UnknownChannel(name.to_string()))
    }

    /// Window of one channel, end inclusive and clamped to the recording.
    pub fn window(&self, name: &str, start: usize, end: usize) -> Result<&[f64]> {
        let channel = self.channel(name)?;
        let hi = (end + 1).min(channel.len());
        let lo = start.min(hi);
        Ok(&channel[lo..hi])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_lookup() {
        let rec = Recording::new(
            vec!["a".into(), "b".into()],
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
        )
        .unwrap();
        assert_eq!(rec.nof_frames(), 3);
        assert_eq!(rec.channel("b").unwrap(), &[4.0, 5.0, 6.0]);
        assert!(matches!(
            rec.channel("c").unwrap_err(),
            PipelineError::UnknownChannel(_)
        ));
    }

    #[test]
    fn test_window_is_inclusive_and_clamped() {
        let rec = Recording::new(vec!["a".into()], vec![vec![0.0, 1.0, 2.0, 3.0]]).unwrap();
        assert_eq!(rec.window("a", 1, 2).unwrap(), &[1.0, 2.0]);
        assert_eq!(rec.window("a", 2, 10).unwrap(), &[2.0, 3.0]);
    }

    #[test]
    fn test_mismatched_channel_lengths_rejected() {
        assert!(Recording::new(
            vec!["a".into(), "b".into()],
            vec![vec![1.0], vec![1.0, 2.0]]
        )
        .is_err());
    }
}
