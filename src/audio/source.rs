use anyhow::Result;

use super::decode::AudioData;
use super::features::{AudioFrame, FramePair};
use super::spectrum::{SpectrumAnalyzer, SpectrumSettings};
use crate::pitch::estimator::frame_layout_is_reliable;

/// Supplier of time-aligned (audio, spectrum) frame pairs at a steady cadence.
pub trait FrameSource {
    fn sample_rate(&self) -> u32;

    /// Length of every `SpectrumFrame` this source yields.
    fn bin_count(&self) -> usize;

    /// Next frame pair in capture order, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<FramePair>>;
}

/// Frame size and hop for a given cadence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameLayout {
    pub frame_size: usize,
    pub hop: usize,
}

impl FrameLayout {
    pub fn for_rate(frame_size: usize, sample_rate: u32, fps: u32) -> Self {
        if !frame_layout_is_reliable(frame_size, sample_rate) {
            log::warn!(
                "Frame size {} at {}Hz is outside the tested range (2048 at 44.1/48kHz); \
                 pitch estimates may be off or jump an octave",
                frame_size,
                sample_rate
            );
        }
        let hop = (sample_rate as f32 / fps.max(1) as f32).round() as usize;
        Self {
            frame_size,
            hop: hop.max(1),
        }
    }

    /// Number of frames needed to cover `len` samples.
    pub fn frame_count(&self, len: usize) -> usize {
        len.div_ceil(self.hop)
    }
}

/// The most recent `frame_size` samples, zero-filled until enough have arrived.
pub struct SlidingWindow {
    window: Vec<f32>,
    sample_rate: u32,
}

impl SlidingWindow {
    pub fn new(frame_size: usize, sample_rate: u32) -> Self {
        Self {
            window: vec![0.0; frame_size],
            sample_rate,
        }
    }

    /// Append `fresh` samples and snapshot the window as a new frame.
    pub fn advance(&mut self, fresh: &[f32]) -> AudioFrame {
        let n = self.window.len();
        let fresh = &fresh[fresh.len().saturating_sub(n)..];
        let keep = n - fresh.len();
        self.window.copy_within(fresh.len().., 0);
        self.window[keep..].copy_from_slice(fresh);
        AudioFrame::new(self.window.clone(), self.sample_rate)
    }
}

/// Replays a decoded recording as if it were being captured live.
pub struct RecordingSource {
    audio: AudioData,
    layout: FrameLayout,
    position: usize,
    window: SlidingWindow,
    spectrum: SpectrumAnalyzer,
}

impl RecordingSource {
    pub fn new(audio: AudioData, layout: FrameLayout, settings: SpectrumSettings) -> Self {
        let window = SlidingWindow::new(layout.frame_size, audio.sample_rate);
        let spectrum = SpectrumAnalyzer::new(layout.frame_size, audio.sample_rate, settings);
        Self {
            audio,
            layout,
            position: 0,
            window,
            spectrum,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.layout.frame_count(self.audio.samples.len())
    }
}

impl FrameSource for RecordingSource {
    fn sample_rate(&self) -> u32 {
        self.audio.sample_rate
    }

    fn bin_count(&self) -> usize {
        self.spectrum.bin_count()
    }

    fn next_frame(&mut self) -> Result<Option<FramePair>> {
        let total = self.audio.samples.len();
        if self.position >= total {
            return Ok(None);
        }
        let end = (self.position + self.layout.hop).min(total);
        let fresh = &self.audio.samples[self.position..end];
        let fresh_samples = fresh.len();
        self.position = end;

        let audio = self.window.advance(fresh);
        let (spectrum, spectral_centroid) = self.spectrum.process(audio.samples());

        Ok(Some(FramePair {
            audio,
            spectrum,
            spectral_centroid,
            fresh_samples,
        }))
    }
}
