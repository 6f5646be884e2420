use std::ops::RangeInclusive;

use crate::audio::features::{rms, AudioFrame};

/// Frame spans (seconds) over which the default 80-350 Hz search stays accurate.
const RELIABLE_FRAME_SECONDS: RangeInclusive<f64> = 0.040..=0.047;
/// Below this the lag grid is too coarse near the top of the range.
const MIN_RELIABLE_SAMPLE_RATE: u32 = 44_100;

/// Result of analysing one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PitchEstimate {
    Voiced(f32),
    /// Frame energy below the silence gate
    Silent,
    /// Best autocorrelation below the confidence gate
    LowConfidence,
}

impl PitchEstimate {
    pub fn hz(self) -> Option<f32> {
        match self {
            PitchEstimate::Voiced(hz) => Some(hz),
            PitchEstimate::Silent | PitchEstimate::LowConfidence => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EstimatorConfig {
    /// Lowest plausible F0 (Hz); bounds the longest lag searched
    pub fmin: f32,
    /// Highest plausible F0 (Hz); bounds the shortest lag searched
    pub fmax: f32,
    pub silence_rms: f32,
    pub min_correlation: f32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            fmin: 80.0,
            fmax: 350.0,
            silence_rms: 0.01,
            min_correlation: 0.02,
        }
    }
}

/// Whether the default search tracks sine tones accurately at this frame
/// size and rate: within 1% from 110 to 350 Hz and within 2% below 110 Hz.
///
/// Holds for 2048 samples at 44.1 or 48 kHz. Longer spans (4096 at 44.1 kHz,
/// 2048 at 16 kHz or less) lock onto subharmonics above roughly 160-200 Hz.
pub fn frame_layout_is_reliable(frame_size: usize, sample_rate: u32) -> bool {
    if sample_rate < MIN_RELIABLE_SAMPLE_RATE {
        return false;
    }
    RELIABLE_FRAME_SECONDS.contains(&(frame_size as f64 / sample_rate as f64))
}

/// Autocorrelation F0 estimator.
///
/// Holds a cached Hann window and scratch buffers so repeated calls on frames
/// of the same length do not allocate. One estimator per thread; the input
/// frame is never modified.
pub struct F0Estimator {
    config: EstimatorConfig,
    window: Vec<f32>,
    windowed: Vec<f32>,
    correlations: Vec<f32>,
}

impl F0Estimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            config,
            window: Vec::new(),
            windowed: Vec::new(),
            correlations: Vec::new(),
        }
    }

    pub fn estimate(&mut self, frame: &AudioFrame) -> PitchEstimate {
        self.estimate_samples(frame.samples(), frame.sample_rate())
    }

    pub fn estimate_samples(&mut self, samples: &[f32], sample_rate: u32) -> PitchEstimate {
        let n = samples.len();
        if n == 0 || rms(samples) < self.config.silence_rms {
            return PitchEstimate::Silent;
        }
        if n < 2 || sample_rate == 0 {
            return PitchEstimate::LowConfidence;
        }

        let sr = sample_rate as f32;
        let min_lag = ((sr / self.config.fmax).floor() as usize).max(1);
        let max_lag = ((sr / self.config.fmin).floor() as usize).min(n - 1);
        if min_lag > max_lag {
            return PitchEstimate::LowConfidence;
        }

        if self.window.len() != n {
            self.window = hann_window(n);
        }
        self.windowed.clear();
        self.windowed
            .extend(samples.iter().zip(&self.window).map(|(s, w)| s * w));

        self.correlations.clear();
        let mut best_lag = min_lag;
        let mut best_corr = f32::NEG_INFINITY;
        for lag in min_lag..=max_lag {
            let corr = normalized_autocorrelation(&self.windowed, lag);
            self.correlations.push(corr);
            if corr > best_corr {
                best_corr = corr;
                best_lag = lag;
            }
        }

        if best_corr < self.config.min_correlation {
            return PitchEstimate::LowConfidence;
        }

        let corr_at = |lag: usize| self.correlations[lag.clamp(min_lag, max_lag) - min_lag];
        let c0 = corr_at(best_lag.saturating_sub(1));
        let c1 = best_corr;
        let c2 = corr_at(best_lag + 1);
        let refined_lag = best_lag as f32 + parabolic_shift(c0, c1, c2);

        PitchEstimate::Voiced(sr / refined_lag)
    }
}

impl Default for F0Estimator {
    fn default() -> Self {
        Self::new(EstimatorConfig::default())
    }
}

/// Mean lagged product over the overlapping region.
fn normalized_autocorrelation(frame: &[f32], lag: usize) -> f32 {
    let overlap = frame.len() - lag;
    let sum: f32 = frame[..overlap]
        .iter()
        .zip(&frame[lag..])
        .map(|(a, b)| a * b)
        .sum();
    sum / overlap as f32
}

/// Sub-sample offset of the peak of a parabola through three equally spaced points.
/// Zero when the points are collinear.
pub fn parabolic_shift(c0: f32, c1: f32, c2: f32) -> f32 {
    let denom = 2.0 * (2.0 * c1 - c2 - c0);
    if denom == 0.0 || !denom.is_finite() {
        return 0.0;
    }
    let shift = (c2 - c0) / denom;
    if shift.is_finite() {
        shift
    } else {
        0.0
    }
}

pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, len: usize, sample_rate: u32) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                0.8 * (2.0 * std::f32::consts::PI * freq * t).sin()
            })
            .collect()
    }

    #[test]
    fn sine_tones_within_one_percent() {
        let mut estimator = F0Estimator::default();
        for &freq in &[100.0f32, 150.0, 200.0, 250.0, 300.0] {
            let frame = AudioFrame::new(sine(freq, 2048, 44_100), 44_100);
            let hz = estimator
                .estimate(&frame)
                .hz()
                .unwrap_or_else(|| panic!("{freq} Hz reported unvoiced"));
            let error = (hz - freq).abs() / freq;
            assert!(error < 0.01, "{freq} Hz estimated as {hz} Hz");
        }
    }

    fn relative_error(estimator: &mut F0Estimator, freq: f32, sample_rate: u32) -> f32 {
        let frame = AudioFrame::new(sine(freq, 2048, sample_rate), sample_rate);
        let hz = estimator
            .estimate(&frame)
            .hz()
            .unwrap_or_else(|| panic!("{freq} Hz at {sample_rate} Hz reported unvoiced"));
        (hz - freq).abs() / freq
    }

    #[test]
    fn range_endpoints_at_default_frame_size() {
        let mut estimator = F0Estimator::default();
        for &sr in &[44_100u32, 48_000] {
            let low = relative_error(&mut estimator, 80.0, sr);
            assert!(low < 0.02, "80 Hz at {sr}: error {low}");
            let high = relative_error(&mut estimator, 350.0, sr);
            assert!(high < 0.01, "350 Hz at {sr}: error {high}");
        }
    }

    #[test]
    fn sweep_stays_within_tolerance() {
        let mut estimator = F0Estimator::default();
        for &sr in &[44_100u32, 48_000] {
            for step in 0..=54 {
                let freq = 80.0 + step as f32 * 5.0;
                let tolerance = if freq < 110.0 { 0.02 } else { 0.01 };
                let error = relative_error(&mut estimator, freq, sr);
                assert!(error < tolerance, "{freq} Hz at {sr}: error {error}");
            }
        }
    }

    #[test]
    fn reliable_layouts() {
        assert!(frame_layout_is_reliable(2048, 44_100));
        assert!(frame_layout_is_reliable(2048, 48_000));
        assert!(frame_layout_is_reliable(4096, 96_000));
        assert!(!frame_layout_is_reliable(4096, 44_100));
        assert!(!frame_layout_is_reliable(2048, 16_000));
        assert!(!frame_layout_is_reliable(2048, 8_000));
        assert!(!frame_layout_is_reliable(1024, 22_050));
        assert!(!frame_layout_is_reliable(1024, 44_100));
    }

    #[test]
    fn sine_at_48k() {
        let mut estimator = F0Estimator::default();
        let frame = AudioFrame::new(sine(120.0, 2048, 48_000), 48_000);
        let hz = estimator.estimate(&frame).hz().unwrap();
        assert!((hz - 120.0).abs() / 120.0 < 0.01, "got {hz}");
    }

    #[test]
    fn silence_is_unvoiced_at_any_rate() {
        let mut estimator = F0Estimator::default();
        for &sr in &[8_000u32, 16_000, 44_100, 48_000, 96_000] {
            let frame = AudioFrame::new(vec![0.0f32; 2048], sr);
            assert_eq!(estimator.estimate(&frame), PitchEstimate::Silent);
        }
    }

    #[test]
    fn quiet_signal_is_gated() {
        let mut estimator = F0Estimator::default();
        let quiet: Vec<f32> = sine(200.0, 2048, 44_100).iter().map(|s| s * 0.005).collect();
        let frame = AudioFrame::new(quiet, 44_100);
        assert_eq!(estimator.estimate(&frame), PitchEstimate::Silent);
    }

    #[test]
    fn frame_shorter_than_lag_range_is_low_confidence() {
        let mut estimator = F0Estimator::default();
        // min lag at 44.1 kHz is 126, so a 64-sample frame has no lags to search
        let frame = AudioFrame::new(sine(200.0, 64, 44_100), 44_100);
        assert_eq!(estimator.estimate(&frame), PitchEstimate::LowConfidence);
    }

    #[test]
    fn frame_is_not_modified() {
        let mut estimator = F0Estimator::default();
        let samples = sine(180.0, 2048, 44_100);
        let frame = AudioFrame::new(samples.clone(), 44_100);
        estimator.estimate(&frame);
        assert_eq!(frame.samples(), samples.as_slice());
    }

    #[test]
    fn parabolic_shift_flat_is_zero() {
        assert_eq!(parabolic_shift(1.0, 1.0, 1.0), 0.0);
        assert_eq!(parabolic_shift(0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn parabolic_shift_finds_offset_peak() {
        // samples of -(x - 0.3)^2 at x = -1, 0, 1
        let f = |x: f32| -(x - 0.3) * (x - 0.3);
        let shift = parabolic_shift(f(-1.0), f(0.0), f(1.0));
        assert!((shift - 0.3).abs() < 1e-5);
    }

    #[test]
    fn hann_window_endpoints() {
        let w = hann_window(8);
        assert!(w[0].abs() < 1e-7);
        assert!(w[7].abs() < 1e-7);
        assert_eq!(hann_window(1), vec![1.0]);
    }
}
