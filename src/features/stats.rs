//! Statistical feature functions over one slice channel
//!
//! Each function maps a numeric sequence (and for the time-based ones the
//! sampling rate) to a single value. Degenerate inputs follow the array
//! conventions the downstream repair step expects: empty or NaN-bearing
//! input yields NaN rather than an error, ratio features of constant
//! signals collapse to their neutral value.

/// Forward difference with step `h`. The final difference is dropped, so
/// the result has `len - 1 - h` entries.
pub fn compute_derivative(signal: &[f64], h: usize) -> Vec<f64> {
    let n = signal.len().saturating_sub(1 + h);
    (0..n)
        .map(|i| (signal[i + h] - signal[i]) / h as f64)
        .collect()
}

fn mean(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return f64::NAN;
    }
    signal.iter().sum::<f64>() / signal.len() as f64
}

fn variance(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return f64::NAN;
    }
    let m = mean(signal);
    signal.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / signal.len() as f64
}

/// Percentile with linear interpolation between adjacent ranks.
fn percentile(signal: &[f64], q: f64) -> f64 {
    if signal.is_empty() || signal.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let mut sorted = signal.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (sorted.len() - 1) as f64 * q / 100.0;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

fn isclose(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-8 + 1e-5 * b.abs()
}

pub fn signal_mean(signal: &[f64]) -> f64 {
    mean(signal)
}

pub fn signal_median(signal: &[f64]) -> f64 {
    percentile(signal, 50.0)
}

pub fn signal_min(signal: &[f64]) -> f64 {
    if signal.is_empty() || signal.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    signal.iter().cloned().fold(f64::INFINITY, f64::min)
}

pub fn signal_max(signal: &[f64]) -> f64 {
    if signal.is_empty() || signal.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    signal.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
}

pub fn signal_range(signal: &[f64]) -> f64 {
    signal_max(signal) - signal_min(signal)
}

/// Population standard deviation.
pub fn signal_std(signal: &[f64]) -> f64 {
    variance(signal).sqrt()
}

/// Population variance.
pub fn signal_var(signal: &[f64]) -> f64 {
    variance(signal)
}

/// Inter-quartile range (75th minus 25th percentile).
pub fn signal_iqr(signal: &[f64]) -> f64 {
    percentile(signal, 75.0) - percentile(signal, 25.0)
}

/// Inter-decile range (90th minus 10th percentile).
pub fn signal_idr(signal: &[f64]) -> f64 {
    percentile(signal, 90.0) - percentile(signal, 10.0)
}

/// Median absolute deviation from the median, unscaled.
pub fn signal_mad(signal: &[f64]) -> f64 {
    let med = signal_median(signal);
    let deviations: Vec<f64> = signal.iter().map(|x| (x - med).abs()).collect();
    percentile(&deviations, 50.0)
}

/// Root mean square.
pub fn signal_rms(signal: &[f64]) -> f64 {
    mean(&signal.iter().map(|x| x * x).collect::<Vec<_>>()).sqrt()
}

pub fn mean_absolute_values(signal: &[f64]) -> f64 {
    mean(&signal.iter().map(|x| x.abs()).collect::<Vec<_>>())
}

pub fn std_absolute_values(signal: &[f64]) -> f64 {
    signal_std(&signal.iter().map(|x| x.abs()).collect::<Vec<_>>())
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Number of sign changes between adjacent samples.
pub fn signal_zero_crossing(signal: &[f64]) -> f64 {
    signal
        .windows(2)
        .filter(|w| sign(w[0]) != sign(w[1]))
        .count() as f64
}

/// Number of crossings of the signal mean.
pub fn signal_mean_crossing(signal: &[f64]) -> f64 {
    let m = mean(signal);
    let centered: Vec<f64> = signal.iter().map(|x| x - m).collect();
    signal_zero_crossing(&centered)
}

/// Instant of the signal maximum in seconds (first occurrence).
pub fn signal_tmax(signal: &[f64], sample_rate: f64) -> f64 {
    if signal.is_empty() {
        return f64::NAN;
    }
    let mut idx = 0;
    for (i, x) in signal.iter().enumerate() {
        if *x > signal[idx] {
            idx = i;
        }
    }
    idx as f64 / sample_rate
}

/// Time the signal spends above its mean, in seconds.
pub fn signal_tgm(signal: &[f64], sample_rate: f64) -> f64 {
    let m = mean(signal);
    signal.iter().filter(|x| **x > m).count() as f64 / sample_rate
}

/// Time the signal spends above (mean + min) / 2, in seconds.
pub fn signal_tga(signal: &[f64], sample_rate: f64) -> f64 {
    let threshold = (mean(signal) + signal_min(signal)) / 2.0;
    signal.iter().filter(|x| **x > threshold).count() as f64 / sample_rate
}

fn count_segments_above(signal: &[f64], threshold: f64) -> f64 {
    let mut segments = 0u32;
    let mut above = false;
    for x in signal {
        if *x >= threshold && !above {
            above = true;
            segments += 1;
        } else if *x < threshold && above {
            above = false;
        }
    }
    segments as f64
}

/// Number of contiguous segments above the signal mean.
pub fn signal_sgm(signal: &[f64]) -> f64 {
    count_segments_above(signal, mean(signal))
}

/// Number of contiguous segments above (mean + min) / 2.
pub fn signal_sga(signal: &[f64]) -> f64 {
    let threshold = (mean(signal) + signal_min(signal)) / 2.0;
    count_segments_above(signal, threshold)
}

/// Trapezoidal area with unit sample spacing.
pub fn signal_area(signal: &[f64]) -> f64 {
    signal.windows(2).map(|w| (w[0] + w[1]) / 2.0).sum()
}

/// Trapezoidal area between the global minimum and maximum positions
/// (later index exclusive). Near-zero areas snap to 0.
pub fn signal_area_min_max(signal: &[f64]) -> f64 {
    if signal.is_empty() || signal.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let mut s_min = 0;
    let mut s_max = 0;
    for (i, x) in signal.iter().enumerate() {
        if *x < signal[s_min] {
            s_min = i;
        }
        if *x > signal[s_max] {
            s_max = i;
        }
    }
    let (lo, hi) = if s_min < s_max { (s_min, s_max) } else { (s_max, s_min) };
    let area = signal_area(&signal[lo..hi]);
    if isclose(area, 0.0) {
        0.0
    } else {
        area
    }
}

/// Ratio of the min-to-max area to the total area; 1 for constant signals.
pub fn signal_area_min_max_ratio(signal: &[f64]) -> f64 {
    let area = signal_area(signal);
    let area_min_max = signal_area_min_max(signal);
    if isclose(area, area_min_max) {
        1.0
    } else {
        area_min_max / area
    }
}

/// Indices of strict local maxima, always including the global maximum.
fn arg_local_max(signal: &[f64]) -> Vec<usize> {
    let mut idxs: Vec<usize> = (1..signal.len().saturating_sub(1))
        .filter(|&i| signal[i] > signal[i - 1] && signal[i] > signal[i + 1])
        .collect();
    let mut global = 0;
    for (i, x) in signal.iter().enumerate() {
        if *x > signal[global] {
            global = i;
        }
    }
    if !idxs.contains(&global) {
        idxs.push(global);
        idxs.sort_unstable();
    }
    idxs
}

/// Indices of strict local minima, always including the global minimum.
fn arg_local_min(signal: &[f64]) -> Vec<usize> {
    let mut idxs: Vec<usize> = (1..signal.len().saturating_sub(1))
        .filter(|&i| signal[i] < signal[i - 1] && signal[i] < signal[i + 1])
        .collect();
    let mut global = 0;
    for (i, x) in signal.iter().enumerate() {
        if *x < signal[global] {
            global = i;
        }
    }
    if !idxs.contains(&global) {
        idxs.push(global);
        idxs.sort_unstable();
    }
    idxs
}

/// Mean of the local maximum values.
pub fn signal_mean_local_max(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return f64::NAN;
    }
    let values: Vec<f64> = arg_local_max(signal).iter().map(|&i| signal[i]).collect();
    mean(&values)
}

/// Mean of the local minimum values.
pub fn signal_mean_local_min(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return f64::NAN;
    }
    let values: Vec<f64> = arg_local_min(signal).iter().map(|&i| signal[i]).collect();
    mean(&values)
}

/// Peak-to-peak mean value: mean of the local maxima minus mean of the
/// local minima.
pub fn signal_p2pmv(signal: &[f64]) -> f64 {
    signal_mean_local_max(signal) - signal_mean_local_min(signal)
}

/// Max over min; 1 when the signal is constant.
pub fn max_to_min_peak_value_ratio(signal: &[f64]) -> f64 {
    let max = signal_max(signal);
    let min = signal_min(signal);
    if isclose(max, min) {
        1.0
    } else {
        max / min
    }
}

const SPLIT_FACTOR: f64 = 10.0;

/// Number of sub-arrays the partition features split the signal into.
/// Short signals get one part per second, long signals ten.
fn split_sections(n: usize, sample_rate: f64) -> usize {
    let t_i = if (n as f64) < sample_rate * SPLIT_FACTOR {
        n as f64 / sample_rate
    } else {
        n as f64 / sample_rate * SPLIT_FACTOR
    };
    (t_i as usize).max(1)
}

/// Nearly-equal partition: the first `n % sections` parts carry one extra
/// sample. Parts may be empty when sections exceed the length.
fn array_split(signal: &[f64], sections: usize) -> Vec<&[f64]> {
    let n = signal.len();
    let base = n / sections;
    let extra = n % sections;
    let mut parts = Vec::with_capacity(sections);
    let mut start = 0;
    for k in 0..sections {
        let len = base + usize::from(k < extra);
        parts.push(&signal[start..start + len]);
        start += len;
    }
    parts
}

/// Mean of the per-partition means.
pub fn signal_split_equal_part_mean(signal: &[f64], sample_rate: f64) -> f64 {
    let parts = array_split(signal, split_sections(signal.len(), sample_rate));
    let means: Vec<f64> = parts.iter().map(|p| mean(p)).collect();
    mean(&means)
}

/// Standard deviation of the per-partition standard deviations.
pub fn signal_split_equal_part_std(signal: &[f64], sample_rate: f64) -> f64 {
    let parts = array_split(signal, split_sections(signal.len(), sample_rate));
    let stds: Vec<f64> = parts.iter().map(|p| signal_std(p)).collect();
    signal_std(&stds)
}

/// Variance of the per-partition standard deviations.
pub fn signal_split_equal_part_var(signal: &[f64], sample_rate: f64) -> f64 {
    let parts = array_split(signal, split_sections(signal.len(), sample_rate));
    let stds: Vec<f64> = parts.iter().map(|p| signal_std(p)).collect();
    signal_var(&stds)
}
