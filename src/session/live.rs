use anyhow::{Context, Result};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::metrics::{aggregate, SessionMetrics};
use crate::audio::features::{FrameAnalysis, FramePair};
use crate::audio::source::FrameSource;
use crate::pitch::band::{classify, PitchBand};
use crate::pitch::estimator::{EstimatorConfig, F0Estimator, PitchEstimate};
use crate::pitch::smoother::{PitchSmoother, DEFAULT_ALPHA};
use crate::render::spectrogram::{draw_spectrogram, Spectrogram};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LiveSettings {
    pub estimator: EstimatorConfig,
    pub smoothing_alpha: f32,
    /// Spectrogram surface size; `None` runs without a render target
    pub spectrogram: Option<(usize, usize)>,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            estimator: EstimatorConfig::default(),
            smoothing_alpha: DEFAULT_ALPHA,
            spectrogram: Some((360, 120)),
        }
    }
}

/// What the display shows after one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LiveReading {
    pub estimate: PitchEstimate,
    pub smoothed_hz: Option<f32>,
    pub band: Option<PitchBand>,
}

impl LiveReading {
    pub fn guidance(&self) -> Option<&'static str> {
        self.band.map(PitchBand::guidance)
    }
}

/// Immutable mono audio handed to storage/transcription after a session.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedAudio {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl RecordedAudio {
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

    pub fn duration(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// 16-bit PCM WAV encoding of the take.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, wav_spec(self.sample_rate))
                .context("Failed to start WAV encoding")?;
            for &sample in self.samples.iter() {
                writer.write_sample(to_i16(sample))?;
            }
            writer.finalize().context("Failed to finalize WAV data")?;
        }
        Ok(cursor.into_inner())
    }

    pub fn write_wav(&self, path: &Path) -> Result<()> {
        let mut writer = hound::WavWriter::create(path, wav_spec(self.sample_rate))
            .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;
        for &sample in self.samples.iter() {
            writer.write_sample(to_i16(sample))?;
        }
        writer.finalize().context("Failed to finalize WAV file")?;
        log::info!("Saved recording to {} ({:.1}s)", path.display(), self.duration());
        Ok(())
    }
}

fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Result of stopping a session.
#[derive(Clone, Debug)]
pub struct RecordingOutcome {
    pub metrics: SessionMetrics,
    pub audio: RecordedAudio,
}

/// State of one live feedback session.
///
/// Owns the only cross-frame state of the live loop: the smoother's previous
/// value and the spectrogram surface. Starting a session always begins from
/// scratch, and `stop` consumes the session so aggregation happens once.
pub struct LiveSession {
    estimator: F0Estimator,
    smoother: PitchSmoother,
    spectrogram: Option<Spectrogram>,
    frames: Vec<FrameAnalysis>,
    tape: Vec<f32>,
    sample_rate: u32,
}

impl LiveSession {
    pub fn start(settings: &LiveSettings, sample_rate: u32) -> Self {
        log::debug!("Starting live session at {}Hz", sample_rate);
        Self {
            estimator: F0Estimator::new(settings.estimator),
            smoother: PitchSmoother::new(settings.smoothing_alpha),
            spectrogram: settings
                .spectrogram
                .map(|(width, height)| Spectrogram::new(width, height)),
            frames: Vec::new(),
            tape: Vec::new(),
            sample_rate,
        }
    }

    /// One estimator → smoother → classifier pass plus one spectrogram column.
    pub fn process(&mut self, pair: &FramePair) -> LiveReading {
        let estimate = self.estimator.estimate(&pair.audio);
        let smoothed_hz = self.smoother.update(estimate);
        let band = smoothed_hz.and_then(classify);

        draw_spectrogram(self.spectrogram.as_mut(), &pair.spectrum);

        self.frames.push(FrameAnalysis {
            pitch: estimate,
            rms: pair.audio.rms(),
            spectral_centroid: pair.spectral_centroid,
        });
        self.tape.extend_from_slice(pair.fresh());

        LiveReading {
            estimate,
            smoothed_hz,
            band,
        }
    }

    pub fn spectrogram(&self) -> Option<&Spectrogram> {
        self.spectrogram.as_ref()
    }

    pub fn frames_processed(&self) -> usize {
        self.frames.len()
    }

    pub fn stop(self) -> RecordingOutcome {
        let metrics = aggregate(&self.frames);
        log::info!(
            "Session stopped: {} frames, {} voiced, {:.1}s of audio",
            metrics.total_frames,
            metrics.voiced_frames,
            self.tape.len() as f32 / self.sample_rate.max(1) as f32
        );
        RecordingOutcome {
            metrics,
            audio: RecordedAudio::new(self.tape, self.sample_rate),
        }
    }
}

/// Fixed-period scheduler for the live loop. Late ticks are not made up.
pub struct Ticker {
    period: Duration,
    next: Instant,
}

impl Ticker {
    pub fn new(fps: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
        Self {
            period,
            next: Instant::now() + period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn wait(&mut self) {
        let now = Instant::now();
        if self.next > now {
            std::thread::sleep(self.next - now);
            self.next += self.period;
        } else {
            self.next = now + self.period;
        }
    }
}

/// Drive `session` from `source` until the source runs dry.
///
/// `on_tick` receives each reading with the current spectrogram surface. With a
/// `ticker` the loop is paced; a pass that takes longer than one period is logged.
pub fn run_live<S, F>(
    source: &mut S,
    mut session: LiveSession,
    mut ticker: Option<Ticker>,
    mut on_tick: F,
) -> Result<RecordingOutcome>
where
    S: FrameSource + ?Sized,
    F: FnMut(&LiveReading, Option<&Spectrogram>) -> Result<()>,
{
    log::debug!(
        "Live loop: {}Hz source, {} spectrum bins",
        source.sample_rate(),
        source.bin_count()
    );
    let budget = ticker.as_ref().map(Ticker::period);
    while let Some(pair) = source.next_frame()? {
        let started = Instant::now();
        let reading = session.process(&pair);
        let elapsed = started.elapsed();
        if let Some(budget) = budget {
            if elapsed > budget {
                log::warn!(
                    "Frame {} took {:.2}ms (budget {:.2}ms)",
                    session.frames_processed(),
                    elapsed.as_secs_f64() * 1000.0,
                    budget.as_secs_f64() * 1000.0
                );
            }
        }

        log::debug!(
            "frame {}: raw={:?} smoothed={:?} band={:?}",
            session.frames_processed(),
            reading.estimate,
            reading.smoothed_hz,
            reading.band
        );
        on_tick(&reading, session.spectrogram())?;

        if let Some(ticker) = ticker.as_mut() {
            ticker.wait();
        }
    }
    Ok(session.stop())
}
