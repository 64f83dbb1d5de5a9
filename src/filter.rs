//! Butterworth filtering for raw channel data
//!
//! Filters are designed in second-order sections: the analog Butterworth
//! prototype is frequency-warped, transformed to lowpass or highpass and
//! mapped to the z-domain with the bilinear transform. Application is a
//! single forward pass (no zero-phase refiltering), matching the causal
//! filtering the feature thresholds were tuned on.

use crate::config::{FilterSettings, FilterType};
use crate::error::{PipelineError, Result};
use std::f64::consts::PI;

/// One second-order section in direct form II transposed coefficients.
/// Denominator is normalized, a0 == 1.
#[derive(Debug, Clone, Copy)]
pub struct Sos {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

#[derive(Debug, Clone, Copy)]
struct Complex {
    re: f64,
    im: f64,
}

impl Complex {
    fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    fn abs(&self) -> f64 {
        self.re.hypot(self.im)
    }

    fn scale(&self, s: f64) -> Self {
        Self::new(self.re * s, self.im * s)
    }

    /// s / self
    fn recip_scale(&self, s: f64) -> Self {
        let d = self.re * self.re + self.im * self.im;
        Self::new(s * self.re / d, -s * self.im / d)
    }

    /// (c + self) / (c - self), the bilinear pole map.
    fn bilinear(&self, c: f64) -> Self {
        let num = Complex::new(c + self.re, self.im);
        let den = Complex::new(c - self.re, -self.im);
        let d = den.re * den.re + den.im * den.im;
        Complex::new(
            (num.re * den.re + num.im * den.im) / d,
            (num.im * den.re - num.re * den.im) / d,
        )
    }
}

/// Analog Butterworth prototype poles (unit cutoff, left half plane).
fn prototype_poles(order: usize) -> Vec<Complex> {
    (0..order)
        .map(|k| {
            let phi = PI * (2 * k + 1) as f64 / (2 * order) as f64 + PI / 2.0;
            Complex::new(phi.cos(), phi.sin())
        })
        .collect()
}

/// Designs a digital Butterworth filter as second-order sections.
///
/// `cut` is the cutoff frequency in Hz, `fs` the sampling rate. Fails with
/// `UnstableFilter` when the cutoff does not leave room below Nyquist or a
/// designed pole lands on or outside the unit circle.
pub fn butter_sos(settings: &FilterSettings, fs: f64) -> Result<Vec<Sos>> {
    let order = settings.order;
    let cut = settings.cut;
    let wn = cut / (0.5 * fs);
    if !(0.0..1.0).contains(&wn) || wn == 0.0 {
        return Err(PipelineError::UnstableFilter { order, cutoff: cut });
    }

    // Pre-warp to the analog frequency the bilinear transform maps back
    // onto wn. Internal design rate is 2 Hz, so the transform constant is 4.
    let warped = 4.0 * (PI * wn / 2.0).tan();
    let c = 4.0;

    let analog: Vec<Complex> = match settings.ftype {
        FilterType::Lowpass => prototype_poles(order)
            .iter()
            .map(|p| p.scale(warped))
            .collect(),
        FilterType::Highpass => prototype_poles(order)
            .iter()
            .map(|p| p.recip_scale(warped))
            .collect(),
    };

    let digital: Vec<Complex> = analog.iter().map(|p| p.bilinear(c)).collect();
    if digital.iter().any(|p| p.abs() >= 1.0) {
        return Err(PipelineError::UnstableFilter { order, cutoff: cut });
    }

    // Lowpass zeros map to z = -1, highpass zeros (s = 0) to z = +1.
    let zero = match settings.ftype {
        FilterType::Lowpass => -1.0,
        FilterType::Highpass => 1.0,
    };

    // Conjugate pole pairs are (k, order-1-k); odd orders leave a single
    // real pole in the middle.
    let mut sections = Vec::with_capacity((order + 1) / 2);
    for k in 0..order / 2 {
        let p = digital[k];
        sections.push(Sos {
            b0: 1.0,
            b1: -2.0 * zero,
            b2: 1.0,
            a1: -2.0 * p.re,
            a2: p.re * p.re + p.im * p.im,
        });
    }
    if order % 2 == 1 {
        let p = digital[order / 2];
        sections.push(Sos {
            b0: 1.0,
            b1: -zero,
            b2: 0.0,
            a1: -p.re,
            a2: 0.0,
        });
    }

    // Normalize the passband reference to unit gain: DC for lowpass,
    // Nyquist for highpass.
    let z = match settings.ftype {
        FilterType::Lowpass => 1.0,
        FilterType::Highpass => -1.0,
    };
    let mut gain = 1.0;
    for s in &sections {
        gain *= (s.b0 + s.b1 * z + s.b2 * z * z) / (1.0 + s.a1 * z + s.a2 * z * z);
    }
    if let Some(first) = sections.first_mut() {
        let scale = 1.0 / gain.abs();
        first.b0 *= scale;
        first.b1 *= scale;
        first.b2 *= scale;
    }

    Ok(sections)
}

/// Applies the cascade with zero initial conditions, forward only.
pub fn sosfilt(sections: &[Sos], signal: &[f64]) -> Vec<f64> {
    let mut data = signal.to_vec();
    for s in sections {
        let mut w1 = 0.0;
        let mut w2 = 0.0;
        for x in data.iter_mut() {
            let y = s.b0 * *x + w1;
            w1 = s.b1 * *x - s.a1 * y + w2;
            w2 = s.b2 * *x - s.a2 * y;
            *x = y;
        }
    }
    data
}

/// Designs and applies the configured filter to one channel.
pub fn filter_channel(settings: &FilterSettings, fs: f64, signal: &[f64]) -> Result<Vec<f64>> {
    let sections = butter_sos(settings, fs)?;
    Ok(sosfilt(&sections, signal))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lowpass(order: usize, cut: f64) -> FilterSettings {
        FilterSettings {
            ftype: FilterType::Lowpass,
            order,
            cut,
        }
    }

    fn highpass(order: usize, cut: f64) -> FilterSettings {
        FilterSettings {
            ftype: FilterType::Highpass,
            order,
            cut,
        }
    }

    #[test]
    fn test_cutoff_above_nyquist_rejected() {
        assert!(butter_sos(&lowpass(1, 13.0), 25.0).is_err());
        assert!(butter_sos(&lowpass(1, 1.0), 25.0).is_ok());
    }

    #[test]
    fn test_section_count_matches_order() {
        assert_eq!(butter_sos(&lowpass(1, 1.0), 25.0).unwrap().len(), 1);
        assert_eq!(butter_sos(&lowpass(2, 1.0), 25.0).unwrap().len(), 1);
        assert_eq!(butter_sos(&lowpass(5, 1.0), 25.0).unwrap().len(), 3);
    }

    #[test]
    fn test_lowpass_passes_dc() {
        let sections = butter_sos(&lowpass(2, 2.0), 25.0).unwrap();
        let constant = vec![1.5; 600];
        let filtered = sosfilt(&sections, &constant);
        // after the transient the output settles on the input level
        let tail = &filtered[400..];
        for y in tail {
            assert!((y - 1.5).abs() < 1e-3, "DC not preserved: {y}");
        }
    }

    #[test]
    fn test_lowpass_attenuates_high_frequency() {
        let fs = 25.0;
        let sections = butter_sos(&lowpass(2, 1.0), fs).unwrap();
        // 10 Hz tone, far above the 1 Hz cutoff
        let tone: Vec<f64> = (0..500)
            .map(|i| (2.0 * PI * 10.0 * i as f64 / fs).sin())
            .collect();
        let filtered = sosfilt(&sections, &tone);
        let amp_in = tone[250..].iter().cloned().fold(0.0f64, |a, b| a.max(b.abs()));
        let amp_out = filtered[250..]
            .iter()
            .cloned()
            .fold(0.0f64, |a, b| a.max(b.abs()));
        assert!(
            amp_out < amp_in * 0.05,
            "10 Hz tone not attenuated: in {amp_in}, out {amp_out}"
        );
    }

    #[test]
    fn test_highpass_removes_dc() {
        let sections = butter_sos(&highpass(1, 0.5), 25.0).unwrap();
        let constant = vec![2.0; 800];
        let filtered = sosfilt(&sections, &constant);
        assert!(
            filtered[600..].iter().all(|y| y.abs() < 1e-3),
            "DC offset survived the highpass"
        );
    }

    #[test]
    fn test_first_order_lowpass_matches_reference() {
        // scipy.signal.butter(1, 0.08, 'lowpass', output='sos')
        let sections = butter_sos(&lowpass(1, 1.0), 25.0).unwrap();
        let s = sections[0];
        assert!((s.b0 - 0.11216024).abs() < 1e-6, "b0 {}", s.b0);
        assert!((s.b1 - 0.11216024).abs() < 1e-6, "b1 {}", s.b1);
        assert!((s.a1 - (-0.77567951)).abs() < 1e-6, "a1 {}", s.a1);
        assert_eq!(s.b2, 0.0);
        assert_eq!(s.a2, 0.0);
    }
}
