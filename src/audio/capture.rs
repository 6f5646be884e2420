use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::features::{AudioFrame, FramePair};
use super::handoff::{downmix, sample_channel, SampleSink, SampleStream};
use super::source::{FrameLayout, FrameSource};
use super::spectrum::{SpectrumAnalyzer, SpectrumSettings};

/// Seconds of audio the ring buffer can hold before the callback starts dropping.
const RING_SECONDS: u32 = 2;

/// Frames from the default input device until `duration` has elapsed.
pub struct CaptureSource {
    stream: Option<cpal::Stream>,
    samples: SampleStream,
    spectrum: SpectrumAnalyzer,
    sample_rate: u32,
    deadline: Instant,
    failed: Arc<AtomicBool>,
}

impl CaptureSource {
    pub fn open_default(frame_size: usize, fps: u32, settings: SpectrumSettings, duration: Duration) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("No input device available"))?;
        let supported = device
            .default_input_config()
            .context("Failed to query default input config")?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let layout = FrameLayout::for_rate(frame_size, sample_rate, fps);
        let (sink, samples) = sample_channel(
            (sample_rate * RING_SECONDS) as usize,
            layout.frame_size,
            layout.hop,
            sample_rate,
        );

        log::info!(
            "Capturing from {} ({}Hz, {} ch, {:?}), hop {} samples",
            device.name().unwrap_or_else(|_| "unknown device".into()),
            sample_rate,
            channels,
            supported.sample_format(),
            layout.hop
        );

        let failed = Arc::new(AtomicBool::new(false));
        let config: cpal::StreamConfig = supported.config();
        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, channels, sink, Arc::clone(&failed))?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, channels, sink, Arc::clone(&failed))?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, channels, sink, Arc::clone(&failed))?,
            other => anyhow::bail!("Unsupported input sample format: {:?}", other),
        };
        stream.play().context("Failed to start input stream")?;

        Ok(Self {
            stream: Some(stream),
            samples,
            spectrum: SpectrumAnalyzer::new(layout.frame_size, sample_rate, settings),
            sample_rate,
            deadline: Instant::now() + duration,
            failed,
        })
    }

    pub fn overruns(&self) -> usize {
        self.samples.overruns()
    }

    fn pair(&mut self, next: Option<(AudioFrame, usize)>) -> Option<FramePair> {
        let (audio, fresh_samples) = next?;
        let (spectrum, spectral_centroid) = self.spectrum.process(audio.samples());
        Some(FramePair {
            audio,
            spectrum,
            spectral_centroid,
            fresh_samples,
        })
    }
}

impl FrameSource for CaptureSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn bin_count(&self) -> usize {
        self.spectrum.bin_count()
    }

    fn next_frame(&mut self) -> Result<Option<FramePair>> {
        loop {
            if self.failed.load(Ordering::Relaxed) {
                anyhow::bail!("Input stream failed");
            }
            if self.stream.is_some() && Instant::now() >= self.deadline {
                // Dropping the stream stops the callback and abandons the producer.
                self.stream = None;
                log::info!("Capture finished ({} samples dropped)", self.overruns());
            }

            if self.stream.is_none() {
                let next = self.samples.drain_remainder();
                return Ok(self.pair(next));
            }
            let next = self.samples.try_next();
            if next.is_some() {
                return Ok(self.pair(next));
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    mut sink: SampleSink,
    failed: Arc<AtomicBool>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let err_fn = move |err: cpal::StreamError| {
        log::error!("Input stream error: {}", err);
        failed.store(true, Ordering::Relaxed);
    };
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            sink.push_iter(downmix(data, channels, |&s| <f32 as cpal::Sample>::from_sample(s)));
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}
