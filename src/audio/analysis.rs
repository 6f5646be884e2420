use rayon::prelude::*;

use super::decode::AudioData;
use super::features::{rms, FrameAnalysis};
use super::source::FrameLayout;
use super::spectrum::{SpectrumAnalyzer, SpectrumSettings};
use crate::pitch::estimator::{EstimatorConfig, F0Estimator};
use crate::session::metrics::{aggregate, SessionMetrics};

/// Everything needed to turn a recording into per-frame values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnalysisSettings {
    pub frame_size: usize,
    pub fps: u32,
    pub estimator: EstimatorConfig,
    pub spectrum: SpectrumSettings,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            fps: 60,
            estimator: EstimatorConfig::default(),
            spectrum: SpectrumSettings::default(),
        }
    }
}

/// Analyse a finished recording and aggregate it into session metrics.
pub fn analyze(audio: &AudioData, settings: &AnalysisSettings) -> SessionMetrics {
    let layout = FrameLayout::for_rate(settings.frame_size, audio.sample_rate, settings.fps);
    let total_frames = layout.frame_count(audio.samples.len());

    log::info!(
        "Pass 1: Per-frame pitch/timbre ({} frames, {} samples/frame, hop {})...",
        total_frames,
        layout.frame_size,
        layout.hop
    );
    let frames = analyze_frames(audio, layout, settings);

    log::info!("Pass 2: Session aggregation...");
    let metrics = aggregate(&frames);

    log::info!(
        "Session: {}/{} voiced frames, f0_mean={}, band={}",
        metrics.voiced_frames,
        metrics.total_frames,
        metrics
            .f0
            .as_ref()
            .map_or_else(|| "n/a".to_string(), |f0| format!("{:.1}Hz", f0.f0_mean)),
        metrics.pitch_band.map_or("n/a", |b| b.label())
    );

    metrics
}

/// Per-frame F0, RMS and spectral centroid for every frame of a recording.
///
/// Frames are laid out exactly as a live capture would see them: frame `k`
/// holds the `frame_size` samples ending at `(k + 1) * hop`, zero-padded at
/// the front. Frames are independent, so they are evaluated in parallel and
/// collected in order.
pub fn analyze_frames(
    audio: &AudioData,
    layout: FrameLayout,
    settings: &AnalysisSettings,
) -> Vec<FrameAnalysis> {
    let samples = &audio.samples;
    let sample_rate = audio.sample_rate;
    let total_frames = layout.frame_count(samples.len());
    let n = layout.frame_size;

    (0..total_frames)
        .into_par_iter()
        .map_init(
            || {
                (
                    F0Estimator::new(settings.estimator),
                    SpectrumAnalyzer::new(n, sample_rate, settings.spectrum),
                    vec![0.0f32; n],
                )
            },
            |(estimator, spectrum, window), frame_idx| {
                let end = ((frame_idx + 1) * layout.hop).min(samples.len());
                let start = end.saturating_sub(n);
                let filled = end - start;
                window[..n - filled].iter_mut().for_each(|s| *s = 0.0);
                window[n - filled..].copy_from_slice(&samples[start..end]);

                FrameAnalysis {
                    pitch: estimator.estimate_samples(window, sample_rate),
                    rms: rms(window),
                    spectral_centroid: spectrum.spectral_centroid(window),
                }
            },
        )
        .collect()
}
