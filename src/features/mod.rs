//! Feature extraction: function registry, statistics, repair
//!
//! Feature functions are looked up by name from a fixed registry, so a
//! config referring to a function that does not exist fails validation at
//! startup instead of at extraction time. The registry entry carries the
//! calling convention: plain functions see only the sample values,
//! rate-aware functions additionally receive the sampling rate.

pub mod repair;
pub mod stats;

pub use stats::compute_derivative;

use crate::error::{PipelineError, Result};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// A registered feature function and its calling convention.
#[derive(Clone, Copy)]
pub enum FeatureFn {
    Plain(fn(&[f64]) -> f64),
    WithRate(fn(&[f64], f64) -> f64),
}

static REGISTRY: Lazy<BTreeMap<&'static str, FeatureFn>> = Lazy::new(|| {
    use FeatureFn::{Plain, WithRate};
    let mut m: BTreeMap<&'static str, FeatureFn> = BTreeMap::new();
    m.insert("signal_mean", Plain(stats::signal_mean));
    m.insert("signal_median", Plain(stats::signal_median));
    m.insert("signal_min", Plain(stats::signal_min));
    m.insert("signal_max", Plain(stats::signal_max));
    m.insert("signal_range", Plain(stats::signal_range));
    m.insert("signal_std", Plain(stats::signal_std));
    m.insert("signal_var", Plain(stats::signal_var));
    m.insert("signal_iqr", Plain(stats::signal_iqr));
    m.insert("signal_idr", Plain(stats::signal_idr));
    m.insert("signal_mad", Plain(stats::signal_mad));
    m.insert("signal_rms", Plain(stats::signal_rms));
    m.insert("mean_absolute_values", Plain(stats::mean_absolute_values));
    m.insert("std_absolute_values", Plain(stats::std_absolute_values));
    m.insert("signal_zero_crossing", Plain(stats::signal_zero_crossing));
    m.insert("signal_mean_crossing", Plain(stats::signal_mean_crossing));
    m.insert("signal_sgm", Plain(stats::signal_sgm));
    m.insert("signal_sga", Plain(stats::signal_sga));
    m.insert("signal_area", Plain(stats::signal_area));
    m.insert("signal_area_min_max", Plain(stats::signal_area_min_max));
    m.insert(
        "signal_area_min_max_ratio",
        Plain(stats::signal_area_min_max_ratio),
    );
    m.insert("signal_mean_local_max", Plain(stats::signal_mean_local_max));
    m.insert("signal_mean_local_min", Plain(stats::signal_mean_local_min));
    m.insert("signal_p2pmv", Plain(stats::signal_p2pmv));
    m.insert(
        "max_to_min_peak_value_ratio",
        Plain(stats::max_to_min_peak_value_ratio),
    );
    m.insert("signal_tmax", WithRate(stats::signal_tmax));
    m.insert("signal_tgm", WithRate(stats::signal_tgm));
    m.insert("signal_tga", WithRate(stats::signal_tga));
    m.insert(
        "signal_split_equal_part_mean",
        WithRate(stats::signal_split_equal_part_mean),
    );
    m.insert(
        "signal_split_equal_part_std",
        WithRate(stats::signal_split_equal_part_std),
    );
    m.insert(
        "signal_split_equal_part_var",
        WithRate(stats::signal_split_equal_part_var),
    );
    m
});

/// True when `name` resolves to a registered feature function.
pub fn is_registered(name: &str) -> bool {
    REGISTRY.contains_key(name)
}

/// Evaluates the named feature function on one channel of a slice.
pub fn apply(name: &str, signal: &[f64], sample_rate: f64) -> Result<f64> {
    match REGISTRY.get(name) {
        Some(FeatureFn::Plain(f)) => Ok(f(signal)),
        Some(FeatureFn::WithRate(f)) => Ok(f(signal, sample_rate)),
        None => Err(PipelineError::UnknownFeature(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        assert!(is_registered("signal_mean"));
        assert!(is_registered("signal_split_equal_part_var"));
        assert!(!is_registered("signal_entropy"));
    }

    #[test]
    fn test_apply_dispatches_by_convention() {
        let s = [0.0, 0.0, 5.0, 0.0];
        let mean = apply("signal_mean", &s, 25.0).unwrap();
        assert!((mean - 1.25).abs() < 1e-12);
        // rate-aware function sees the sampling rate
        let tmax = apply("signal_tmax", &s, 25.0).unwrap();
        assert!((tmax - 2.0 / 25.0).abs() < 1e-12);
    }

    #[test]
    fn test_apply_unknown_name_fails() {
        let err = apply("nope", &[1.0], 25.0).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownFeature(_)));
    }
}
