// Label taxonomy of the X-ITE pain database
//
// Per-frame labels are small integers: the sign encodes the stimulus
// modality (negative = electrical, positive = heat), the magnitude the
// intensity (1-3 phasic, 4-6 tonic), 0 is baseline. After segmentation,
// baseline intervals that directly follow a pain interval are relabeled to
// 100x the pain label so that "recovery after stimulus X" is its own class.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Video frame rate in Hz.
pub const SAMPLE_RATE_VIDEO: f64 = 25.0;
/// Biosignal sampling rate in Hz.
pub const SAMPLE_RATE_BIO: f64 = 1000.0;

/// Labels that mark recording artifacts; never part of any interval policy.
pub const LABELS_INVALID: [i32; 2] = [-10, -11];
/// All labels a raw recording may carry (baseline plus pain intensities).
pub const LABELS_VALID: [i32; 13] = [0, 1, 2, 3, 4, 5, 6, -1, -2, -3, -4, -5, -6];
/// Pain stimulus labels.
pub const LABELS_PAIN: [i32; 12] = [1, 2, 3, 4, 5, 6, -1, -2, -3, -4, -5, -6];
/// Baseline-after-pain labels introduced by interval relabeling.
pub const LABELS_BASE: [i32; 12] = [
    100, 200, 300, 400, 500, 600, -100, -200, -300, -400, -500, -600,
];

/// Data modality of a recording, selects the sampling rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Video,
    Bio,
}

impl Modality {
    pub fn sample_rate(&self) -> f64 {
        match self {
            Modality::Video => SAMPLE_RATE_VIDEO,
            Modality::Bio => SAMPLE_RATE_BIO,
        }
    }
}

/// Pain group: stimulus modality x duration category.
///
/// Every slicing policy (shift, length, minimum durations) is keyed by the
/// pain group of the interval label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PainGroup {
    /// Phasic heat (labels 1..=3)
    PhasicHeat,
    /// Phasic electrical (labels -3..=-1)
    PhasicElectro,
    /// Tonic heat (labels 4..=6)
    TonicHeat,
    /// Tonic electrical (labels -6..=-4)
    TonicElectro,
}

impl PainGroup {
    pub const ALL: [PainGroup; 4] = [
        PainGroup::PhasicHeat,
        PainGroup::PhasicElectro,
        PainGroup::TonicHeat,
        PainGroup::TonicElectro,
    ];

    /// Short name used in config keys and exports ("pH", "pE", "tH", "tE").
    pub fn name(&self) -> &'static str {
        match self {
            PainGroup::PhasicHeat => "pH",
            PainGroup::PhasicElectro => "pE",
            PainGroup::TonicHeat => "tH",
            PainGroup::TonicElectro => "tE",
        }
    }

    /// Name of the matching baseline group ("BpH", "BpE", "BtH", "BtE").
    pub fn baseline_name(&self) -> &'static str {
        match self {
            PainGroup::PhasicHeat => "BpH",
            PainGroup::PhasicElectro => "BpE",
            PainGroup::TonicHeat => "BtH",
            PainGroup::TonicElectro => "BtE",
        }
    }

    pub fn from_name(name: &str) -> Option<PainGroup> {
        match name {
            "pH" => Some(PainGroup::PhasicHeat),
            "pE" => Some(PainGroup::PhasicElectro),
            "tH" => Some(PainGroup::TonicHeat),
            "tE" => Some(PainGroup::TonicElectro),
            _ => None,
        }
    }
}

/// Returns the pain group a label belongs to.
///
/// Both pain labels (e.g. 2) and their baseline counterparts (200) map to
/// the same group. Baseline 0 and invalid labels have no group.
pub fn label_group(label: i32) -> Result<PainGroup> {
    match label {
        1..=3 | 100 | 200 | 300 => Ok(PainGroup::PhasicHeat),
        -3..=-1 | -300 | -200 | -100 => Ok(PainGroup::PhasicElectro),
        4..=6 | 400 | 500 | 600 => Ok(PainGroup::TonicHeat),
        -6..=-4 | -600 | -500 | -400 => Ok(PainGroup::TonicElectro),
        other => Err(PipelineError::InvalidLabel(other)),
    }
}

/// True for pain stimulus labels (intensity 1-3 phasic / 4-6 tonic).
pub fn is_pain_label(label: i32) -> bool {
    LABELS_PAIN.contains(&label)
}

/// True for baseline-after-pain labels (x100 relabels).
pub fn is_base_label(label: i32) -> bool {
    LABELS_BASE.contains(&label)
}

/// Human-readable class name used in exports, e.g. 3 -> "pH3", -200 -> "BpE2".
pub fn class_name(label: i32) -> Result<String> {
    if label == 0 {
        return Ok("B".to_string());
    }
    let (base, magnitude) = if label.abs() >= 100 {
        ("B", label.abs() / 100)
    } else {
        ("", label.abs())
    };
    let group = label_group(label)?;
    let intensity = if magnitude > 3 { magnitude - 3 } else { magnitude };
    Ok(format!("{}{}{}", base, group.name(), intensity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_group_lookup() {
        assert_eq!(label_group(1).unwrap(), PainGroup::PhasicHeat);
        assert_eq!(label_group(-2).unwrap(), PainGroup::PhasicElectro);
        assert_eq!(label_group(5).unwrap(), PainGroup::TonicHeat);
        assert_eq!(label_group(-6).unwrap(), PainGroup::TonicElectro);
        // relabeled baselines belong to the group of the pain they follow
        assert_eq!(label_group(300).unwrap(), PainGroup::PhasicHeat);
        assert_eq!(label_group(-400).unwrap(), PainGroup::TonicElectro);
    }

    #[test]
    fn test_invalid_labels_have_no_group() {
        assert!(label_group(0).is_err());
        assert!(label_group(7).is_err());
        assert!(label_group(-10).is_err());
    }

    #[test]
    fn test_class_names() {
        assert_eq!(class_name(0).unwrap(), "B");
        assert_eq!(class_name(1).unwrap(), "pH1");
        assert_eq!(class_name(-3).unwrap(), "pE3");
        assert_eq!(class_name(4).unwrap(), "tH1");
        assert_eq!(class_name(600).unwrap(), "BtH3");
        assert_eq!(class_name(-100).unwrap(), "BpE1");
    }

    #[test]
    fn test_pain_and_base_predicates() {
        for label in LABELS_PAIN {
            assert!(is_pain_label(label));
            assert!(!is_base_label(label));
            assert!(is_base_label(label * 100));
        }
        assert!(!is_pain_label(0));
        assert!(!is_base_label(0));
    }
}
