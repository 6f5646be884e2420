use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use super::features::SpectrumFrame;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpectrumSettings {
    /// Weight of the previous frame's magnitude (0 disables temporal smoothing)
    pub smoothing_time_constant: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for SpectrumSettings {
    fn default() -> Self {
        Self {
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

/// Browser-analyser-style spectrum: Blackman window, FFT, temporal smoothing,
/// then a dB range mapped onto 0-255.
pub struct SpectrumAnalyzer {
    fft_size: usize,
    sample_rate: u32,
    settings: SpectrumSettings,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
    smoothed: Vec<f32>,
}

impl SpectrumAnalyzer {
    pub fn new(fft_size: usize, sample_rate: u32, settings: SpectrumSettings) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let bins = fft_size / 2;
        Self {
            fft_size,
            sample_rate,
            settings,
            fft,
            window: blackman_window(fft_size),
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            magnitudes: vec![0.0; bins],
            smoothed: vec![0.0; bins],
        }
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn bin_hz(&self) -> f32 {
        self.sample_rate as f32 / self.fft_size as f32
    }

    /// Analyse one window, advancing the temporal smoothing state.
    /// Returns the byte spectrum and the spectral centroid of the raw magnitudes.
    pub fn process(&mut self, samples: &[f32]) -> (SpectrumFrame, Option<f32>) {
        self.transform(samples);
        let centroid = self.centroid();

        let tau = self.settings.smoothing_time_constant;
        let range = self.settings.max_decibels - self.settings.min_decibels;
        let bytes: Vec<u8> = self
            .smoothed
            .iter_mut()
            .zip(&self.magnitudes)
            .map(|(smoothed, &mag)| {
                *smoothed = tau * *smoothed + (1.0 - tau) * mag;
                let db = if *smoothed > 0.0 {
                    20.0 * smoothed.log10()
                } else {
                    f32::NEG_INFINITY
                };
                let scaled = 255.0 / range * (db - self.settings.min_decibels);
                scaled.clamp(0.0, 255.0) as u8
            })
            .collect();

        (SpectrumFrame::new(bytes), centroid)
    }

    /// Spectral centroid of one window without touching the smoothing state.
    pub fn spectral_centroid(&mut self, samples: &[f32]) -> Option<f32> {
        self.transform(samples);
        self.centroid()
    }

    /// Windowed FFT of the most recent `fft_size` samples into `magnitudes`.
    /// Short input is left-padded with zeros.
    fn transform(&mut self, samples: &[f32]) {
        let take = samples.len().min(self.fft_size);
        let offset = self.fft_size - take;
        let tail = &samples[samples.len() - take..];

        for value in self.buffer.iter_mut().take(offset) {
            *value = Complex::new(0.0, 0.0);
        }
        for (i, &s) in tail.iter().enumerate() {
            let idx = offset + i;
            self.buffer[idx] = Complex::new(s * self.window[idx], 0.0);
        }

        self.fft.process(&mut self.buffer);

        let scale = 1.0 / self.fft_size as f32;
        for (mag, c) in self.magnitudes.iter_mut().zip(&self.buffer) {
            *mag = c.norm() * scale;
        }
    }

    fn centroid(&self) -> Option<f32> {
        let total: f32 = self.magnitudes.iter().sum();
        if total <= 0.0 {
            return None;
        }
        let bin_hz = self.bin_hz();
        let weighted: f32 = self
            .magnitudes
            .iter()
            .enumerate()
            .map(|(i, &mag)| i as f32 * bin_hz * mag)
            .sum();
        Some(weighted / total)
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    let denom = (size - 1) as f32;
    (0..size)
        .map(|i| {
            let x = 2.0 * std::f32::consts::PI * i as f32 / denom;
            0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, len: usize, sample_rate: u32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn silence_maps_to_zero_bytes_and_no_centroid() {
        let mut analyzer = SpectrumAnalyzer::new(2048, 44_100, SpectrumSettings::default());
        let (frame, centroid) = analyzer.process(&vec![0.0; 2048]);
        assert_eq!(frame.len(), 1024);
        assert!(frame.bins().iter().all(|&b| b == 0));
        assert_eq!(centroid, None);
    }

    #[test]
    fn tone_peaks_at_its_bin() {
        let settings = SpectrumSettings {
            smoothing_time_constant: 0.0,
            ..SpectrumSettings::default()
        };
        let mut analyzer = SpectrumAnalyzer::new(2048, 44_100, settings);
        // quiet enough that the peak does not saturate at 255
        let quiet: Vec<f32> = sine(1000.0, 2048, 44_100).iter().map(|s| s * 0.001).collect();
        let (frame, _) = analyzer.process(&quiet);
        let peak = frame
            .bins()
            .iter()
            .enumerate()
            .max_by_key(|&(_, &b)| b)
            .map(|(i, _)| i)
            .unwrap();
        let expected = (1000.0 / analyzer.bin_hz()).round() as usize;
        assert!(peak.abs_diff(expected) <= 1, "peak bin {peak}, expected {expected}");
    }

    #[test]
    fn centroid_tracks_tone() {
        let mut analyzer = SpectrumAnalyzer::new(2048, 44_100, SpectrumSettings::default());
        let centroid = analyzer.spectral_centroid(&sine(2000.0, 2048, 44_100)).unwrap();
        assert!((centroid - 2000.0).abs() < 100.0, "centroid {centroid}");
    }

    #[test]
    fn smoothing_decays_after_signal_stops() {
        let mut analyzer = SpectrumAnalyzer::new(1024, 44_100, SpectrumSettings::default());
        let tone: Vec<f32> = sine(500.0, 1024, 44_100).iter().map(|s| s * 0.01).collect();
        let (loud, _) = analyzer.process(&tone);
        let (after, _) = analyzer.process(&vec![0.0; 1024]);
        let loud_peak = *loud.bins().iter().max().unwrap();
        let after_peak = *after.bins().iter().max().unwrap();
        assert!(after_peak > 0, "smoothing should keep some energy");
        assert!(after_peak < loud_peak);
    }

    #[test]
    fn short_input_is_padded() {
        let mut analyzer = SpectrumAnalyzer::new(512, 8_000, SpectrumSettings::default());
        let (frame, _) = analyzer.process(&[0.5; 100]);
        assert_eq!(frame.len(), 256);
    }
}
