use std::sync::Arc;

use crate::pitch::estimator::PitchEstimate;

/// One time-domain analysis window. Shared and immutable once assembled.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioFrame {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: impl Into<Arc<[f32]>>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Root-mean-square amplitude of the whole window.
    pub fn rms(&self) -> f32 {
        rms(&self.samples)
    }
}

/// Per-bin relative magnitudes (0-255), one per analysis window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpectrumFrame {
    bins: Arc<[u8]>,
}

impl SpectrumFrame {
    pub fn new(bins: impl Into<Arc<[u8]>>) -> Self {
        Self { bins: bins.into() }
    }

    /// An all-zero frame with `bin_count` bins.
    pub fn silent(bin_count: usize) -> Self {
        Self::new(vec![0u8; bin_count])
    }

    pub fn bins(&self) -> &[u8] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

/// Time-aligned output of a frame source for one tick.
#[derive(Clone, Debug)]
pub struct FramePair {
    pub audio: AudioFrame,
    pub spectrum: SpectrumFrame,
    /// Magnitude-weighted mean frequency (Hz), `None` for a zero spectrum
    pub spectral_centroid: Option<f32>,
    /// Samples at the tail of `audio` not present in the previous frame
    pub fresh_samples: usize,
}

impl FramePair {
    /// The samples captured since the previous frame.
    pub fn fresh(&self) -> &[f32] {
        let samples = self.audio.samples();
        let fresh = self.fresh_samples.min(samples.len());
        &samples[samples.len() - fresh..]
    }
}

/// Per-frame values retained for session aggregation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameAnalysis {
    pub pitch: PitchEstimate,
    pub rms: f32,
    pub spectral_centroid: Option<f32>,
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}
