use serde::{Deserialize, Serialize};

use crate::audio::features::FrameAnalysis;
use crate::pitch::band::{classify, PitchBand};

/// Why a session has no F0 statistics. The message is meant for the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisError {
    #[error("the recording contained no audio")]
    EmptyAudio,
    #[error("no voiced frames detected; try a longer recording or reduce background noise")]
    InsufficientVoicedData,
}

/// Statistics over the voiced frames of a session, all in Hz.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct F0Stats {
    pub f0_mean: f32,
    pub f0_median: f32,
    pub f0_min: f32,
    pub f0_max: f32,
    pub f0_range: f32,
    /// Population standard deviation (divides by the sample count)
    pub f0_std: f32,
}

impl F0Stats {
    /// `None` for an empty slice.
    pub fn from_samples(values: &[f32]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let count = values.len() as f64;
        let mean = values.iter().map(|&v| v as f64).sum::<f64>() / count;
        let variance = values
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / count;

        let mut sorted = values.to_vec();
        sorted.sort_by(f32::total_cmp);
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };
        let min = sorted[0];
        let max = sorted[sorted.len() - 1];

        Some(Self {
            f0_mean: mean as f32,
            f0_median: median,
            f0_min: min,
            f0_max: max,
            f0_range: max - min,
            f0_std: variance.sqrt() as f32,
        })
    }
}

/// Summary of one recording. F0 fields are `null` (not zero) when nothing
/// was voiced; `analysis_error` says why.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "MetricsRecord", from = "MetricsRecord")]
pub struct SessionMetrics {
    pub f0: Option<F0Stats>,
    pub pitch_band: Option<PitchBand>,
    pub rms_mean: Option<f32>,
    pub spectral_centroid_mean: Option<f32>,
    pub voiced_frames: usize,
    pub total_frames: usize,
    pub analysis_error: Option<AnalysisError>,
}

impl SessionMetrics {
    pub fn is_ok(&self) -> bool {
        self.analysis_error.is_none()
    }
}

/// Flat wire shape of `SessionMetrics`; every key is always present.
#[derive(Serialize, Deserialize)]
struct MetricsRecord {
    f0_mean: Option<f32>,
    f0_median: Option<f32>,
    f0_min: Option<f32>,
    f0_max: Option<f32>,
    f0_range: Option<f32>,
    f0_std: Option<f32>,
    pitch_band: Option<PitchBand>,
    rms_mean: Option<f32>,
    spectral_centroid_mean: Option<f32>,
    voiced_frames: usize,
    total_frames: usize,
    analysis_error: Option<AnalysisError>,
}

impl From<SessionMetrics> for MetricsRecord {
    fn from(m: SessionMetrics) -> Self {
        Self {
            f0_mean: m.f0.map(|f| f.f0_mean),
            f0_median: m.f0.map(|f| f.f0_median),
            f0_min: m.f0.map(|f| f.f0_min),
            f0_max: m.f0.map(|f| f.f0_max),
            f0_range: m.f0.map(|f| f.f0_range),
            f0_std: m.f0.map(|f| f.f0_std),
            pitch_band: m.pitch_band,
            rms_mean: m.rms_mean,
            spectral_centroid_mean: m.spectral_centroid_mean,
            voiced_frames: m.voiced_frames,
            total_frames: m.total_frames,
            analysis_error: m.analysis_error,
        }
    }
}

impl From<MetricsRecord> for SessionMetrics {
    fn from(r: MetricsRecord) -> Self {
        let f0 = match (r.f0_mean, r.f0_median, r.f0_min, r.f0_max, r.f0_range, r.f0_std) {
            (Some(f0_mean), Some(f0_median), Some(f0_min), Some(f0_max), Some(f0_range), Some(f0_std)) => {
                Some(F0Stats {
                    f0_mean,
                    f0_median,
                    f0_min,
                    f0_max,
                    f0_range,
                    f0_std,
                })
            }
            _ => None,
        };
        Self {
            f0,
            pitch_band: r.pitch_band,
            rms_mean: r.rms_mean,
            spectral_centroid_mean: r.spectral_centroid_mean,
            voiced_frames: r.voiced_frames,
            total_frames: r.total_frames,
            analysis_error: r.analysis_error,
        }
    }
}

/// Aggregate the per-frame values of one recording.
pub fn aggregate(frames: &[FrameAnalysis]) -> SessionMetrics {
    let voiced: Vec<f32> = frames
        .iter()
        .filter_map(|f| f.pitch.hz())
        .filter(|hz| hz.is_finite())
        .collect();

    let f0 = F0Stats::from_samples(&voiced);
    let analysis_error = if frames.is_empty() {
        Some(AnalysisError::EmptyAudio)
    } else if f0.is_none() {
        Some(AnalysisError::InsufficientVoicedData)
    } else {
        None
    };

    let rms_mean = mean(frames.iter().map(|f| f.rms));
    let spectral_centroid_mean = mean(
        frames
            .iter()
            .filter_map(|f| f.spectral_centroid)
            .filter(|c| c.is_finite()),
    );

    SessionMetrics {
        pitch_band: f0.and_then(|stats| classify(stats.f0_mean)),
        f0,
        rms_mean,
        spectral_centroid_mean,
        voiced_frames: voiced.len(),
        total_frames: frames.len(),
        analysis_error,
    }
}

fn mean(values: impl Iterator<Item = f32>) -> Option<f32> {
    let (sum, count) = values.fold((0.0f64, 0usize), |(sum, count), v| (sum + v as f64, count + 1));
    if count == 0 {
        None
    } else {
        Some((sum / count as f64) as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::estimator::PitchEstimate;
    use pretty_assertions::assert_eq;

    fn frame(pitch: PitchEstimate, rms: f32, centroid: Option<f32>) -> FrameAnalysis {
        FrameAnalysis {
            pitch,
            rms,
            spectral_centroid: centroid,
        }
    }

    fn voiced(values: &[f32]) -> Vec<FrameAnalysis> {
        values
            .iter()
            .map(|&hz| frame(PitchEstimate::Voiced(hz), 0.1, Some(1000.0)))
            .collect()
    }

    #[test]
    fn four_voiced_frames() {
        let metrics = aggregate(&voiced(&[150.0, 160.0, 170.0, 180.0]));
        let f0 = metrics.f0.unwrap();
        assert!((f0.f0_mean - 165.0).abs() < 1e-4);
        assert!((f0.f0_median - 165.0).abs() < 1e-4);
        assert!((f0.f0_range - 30.0).abs() < 1e-4);
        assert!((f0.f0_std - 11.180_34).abs() < 1e-3);
        assert_eq!(f0.f0_min, 150.0);
        assert_eq!(f0.f0_max, 180.0);
        assert_eq!(metrics.pitch_band, Some(PitchBand::Neutral));
        assert_eq!(metrics.analysis_error, None);
    }

    #[test]
    fn odd_count_median_is_middle_value() {
        let stats = F0Stats::from_samples(&[300.0, 100.0, 200.0]).unwrap();
        assert_eq!(stats.f0_median, 200.0);
    }

    #[test]
    fn all_unvoiced_sets_error_and_no_f0() {
        let frames = vec![
            frame(PitchEstimate::Silent, 0.0, None),
            frame(PitchEstimate::LowConfidence, 0.02, Some(900.0)),
        ];
        let metrics = aggregate(&frames);
        assert_eq!(metrics.analysis_error, Some(AnalysisError::InsufficientVoicedData));
        assert_eq!(metrics.f0, None);
        assert_eq!(metrics.pitch_band, None);
        assert_eq!(metrics.voiced_frames, 0);
        assert_eq!(metrics.total_frames, 2);

        let json = serde_json::to_value(&metrics).unwrap();
        for key in ["f0_mean", "f0_median", "f0_min", "f0_max", "f0_range", "f0_std", "pitch_band"] {
            assert_eq!(json.get(key), Some(&serde_json::Value::Null), "{key}");
        }
        assert_eq!(json["analysis_error"], "insufficient_voiced_data");

        let parsed: SessionMetrics = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, metrics);
    }

    #[test]
    fn empty_sequence_is_empty_audio() {
        let metrics = aggregate(&[]);
        assert_eq!(metrics.analysis_error, Some(AnalysisError::EmptyAudio));
        assert_eq!(metrics.rms_mean, None);
        assert_eq!(metrics.spectral_centroid_mean, None);
    }

    #[test]
    fn rms_counts_every_frame() {
        let frames = vec![
            frame(PitchEstimate::Voiced(200.0), 0.4, None),
            frame(PitchEstimate::Silent, 0.0, None),
        ];
        let metrics = aggregate(&frames);
        assert!((metrics.rms_mean.unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn centroid_skips_zero_spectrum_frames() {
        let frames = vec![
            frame(PitchEstimate::Voiced(200.0), 0.1, Some(1200.0)),
            frame(PitchEstimate::Silent, 0.0, None),
            frame(PitchEstimate::Voiced(210.0), 0.1, Some(1800.0)),
        ];
        let metrics = aggregate(&frames);
        assert_eq!(metrics.spectral_centroid_mean, Some(1500.0));
    }

    #[test]
    fn band_follows_mean() {
        let metrics = aggregate(&voiced(&[100.0, 120.0]));
        assert_eq!(metrics.pitch_band, Some(PitchBand::Lower));
        let metrics = aggregate(&voiced(&[280.0, 360.0]));
        assert_eq!(metrics.pitch_band, Some(PitchBand::High));
    }

    #[test]
    fn serialized_fields_are_flat() {
        let metrics = aggregate(&voiced(&[200.0]));
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["f0_mean"], 200.0);
        assert_eq!(json["f0_std"], 0.0);
        assert_eq!(json["pitch_band"], "feminine");
        assert!(json["analysis_error"].is_null());
    }
}
