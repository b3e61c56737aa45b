//! Matched-filter reference pulse construction (§3 `PulseShapeConfig`)
//!
//! Grounded on `pulseFilter.trapezoidPulse`/`setRefPulse`: a trapezoidal
//! template, sampled at the device's sampling interval, normalized to the
//! configured pulse height. The bipolar tail is defined symmetrically to
//! the main lobe (mirrored rise/on/fall times) rather than reusing the
//! Python original's `trapezoidPulse(mode=1)` branch, which `setRefPulse`
//! never actually invokes and which computes its negative-lobe
//! normalization incorrectly — an intentional fix, not a faithful port.

use crate::config::{PulseMode, PulseShapeConfig};

/// Control points `(time, relative amplitude)` for the piecewise-linear
/// template shape, mirroring `trapezoidPulse`'s `ti`/`ri` arrays.
fn control_points(tr: f64, ton: f64, tf: f64, bipolar_tail: Option<(f64, f64, f64)>) -> (Vec<f64>, Vec<f64>) {
    let mut ti = vec![0.0, tr, tr + ton, tr + ton + tf];
    let mut ri = vec![0.0, 1.0, 1.0, 0.0];
    if let Some((tf2, toff, tr2)) = bipolar_tail {
        let positive_half_width = 0.5 * (tr + tf) + ton;
        let negative_half_width = 0.5 * (tf2 + tr2) + toff;
        let voff = if negative_half_width > 0.0 { -positive_half_width / negative_half_width } else { 0.0 };
        let base = tr + ton + tf;
        ti.push(base + tf2);
        ri.push(voff);
        ti.push(base + tf2 + toff);
        ri.push(voff);
        ti.push(base + tf2 + toff + tr2);
        ri.push(0.0);
    }
    (ti, ri)
}

fn interpolate_linear(ti: &[f64], ri: &[f64], t: f64) -> f64 {
    let n = ti.len();
    if t <= ti[0] {
        return ri[0];
    }
    if t >= ti[n - 1] {
        return ri[n - 1];
    }
    for i in 0..n - 1 {
        if t >= ti[i] && t <= ti[i + 1] {
            let span = ti[i + 1] - ti[i];
            let frac = if span > 0.0 { (t - ti[i]) / span } else { 0.0 };
            return ri[i] + frac * (ri[i + 1] - ri[i]);
        }
    }
    ri[n - 1]
}

/// Build the reference pulse at sampling interval `dt`, normalized to
/// `shape.pulse_height_volts` (`setRefPulse`).
pub fn reference_pulse(shape: &PulseShapeConfig, dt: f64) -> Vec<f32> {
    let (tr, ton, tf) = (shape.rise_time_secs, shape.on_time_secs, shape.fall_time_secs);
    let bipolar_tail = match shape.mode {
        PulseMode::Unipolar => None,
        PulseMode::Bipolar => Some((tf, ton, tr)),
    };
    let (ti, ri) = control_points(tr, ton, tf, bipolar_tail);
    let total = *ti.last().expect("control points are never empty");
    let n_samples = (total / dt + 0.5) as usize + 1;
    (0..n_samples)
        .map(|i| {
            let t = i as f64 * dt;
            (shape.pulse_height_volts as f64 * interpolate_linear(&ti, &ri, t)) as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unipolar_template_peaks_at_height() {
        let shape = PulseShapeConfig { pulse_height_volts: -1.0, ..PulseShapeConfig::default() };
        let dt = 1e-9;
        let template = reference_pulse(&shape, dt);
        let min = template.iter().cloned().fold(0.0f32, f32::min);
        assert!((min - (-1.0)).abs() < 1e-3);
        assert!(template.first().copied().unwrap_or(1.0).abs() < 1e-6);
        assert!(template.last().copied().unwrap_or(1.0).abs() < 1e-6);
    }

    #[test]
    fn test_bipolar_template_has_opposite_sign_tail() {
        let shape = PulseShapeConfig { mode: PulseMode::Bipolar, pulse_height_volts: -1.0, ..PulseShapeConfig::default() };
        let dt = 1e-9;
        let template = reference_pulse(&shape, dt);
        let tail_value = *template.last().unwrap_or(&0.0);
        let min = template.iter().cloned().fold(0.0f32, f32::min);
        assert!(tail_value.abs() < 1e-3);
        assert!(min < 0.0);
        assert!(template.iter().any(|&v| v > 0.0));
    }
}
