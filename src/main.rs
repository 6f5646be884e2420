mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

use cli::{Cli, Command, CommonArgs};
use voxpitch::audio::decode::{decode_audio, AudioData};
use voxpitch::audio::source::{FrameLayout, FrameSource, RecordingSource};
use voxpitch::config::{find_config, load_config, Config};
use voxpitch::encode::ffmpeg::{FfmpegEncoder, VideoSettings};
use voxpitch::pitch::PitchBand;
use voxpitch::render::text::{readout_text, TextOverlay};
use voxpitch::session::live::{run_live, LiveReading, LiveSession, RecordedAudio, Ticker};
use voxpitch::session::metrics::SessionMetrics;
use voxpitch::upload::UploadClient;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let mut config = match find_config(cli.config.as_deref()) {
        Some(path) => {
            let cfg = load_config(&path)?;
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => Config::default(),
    };

    match cli.command {
        Command::Analyze { input, common } => {
            merge_common(&mut config, &common)?;
            let audio = decode_input(&input)?;

            log::info!("Analyzing audio...");
            let metrics = voxpitch::audio::analysis::analyze(&audio, &config.analysis_settings());
            emit_metrics(&metrics, common.out.as_deref())?;

            let recording = RecordedAudio::new(audio.samples, audio.sample_rate);
            maybe_upload(&config, &recording, &metrics)?;
        }
        Command::Replay {
            input,
            realtime,
            video,
            font,
            common,
        } => {
            merge_common(&mut config, &common)?;
            let audio = decode_input(&input)?;
            let layout = FrameLayout::for_rate(config.analysis.frame_size, audio.sample_rate, config.live.fps);
            let mut source = RecordingSource::new(audio, layout, config.spectrum_settings());
            let total_frames = source.frame_count();
            log::info!(
                "Replaying {} frames at {}fps (hop {} samples)",
                total_frames,
                config.live.fps,
                layout.hop
            );

            let live_settings = config.live_settings();
            let mut encoder = match video {
                Some(ref path) => {
                    let (width, height) = live_settings
                        .spectrogram
                        .context("Video output needs a non-empty [spectrogram] size")?;
                    let settings = VideoSettings {
                        width: width as u32,
                        height: height as u32,
                        fps: config.live.fps,
                        codec: config.output.codec.clone(),
                        pix_fmt: config.output.pix_fmt.clone(),
                        crf: config.output.crf,
                        scale: config.output.scale,
                    };
                    log::info!("Starting FFmpeg encoder...");
                    Some(FfmpegEncoder::new(path, Some(input.as_path()), &settings)?)
                }
                None => None,
            };
            let overlay = match (encoder.is_some(), font.as_deref()) {
                (true, Some(path)) => Some(TextOverlay::from_file(path, 14.0)?),
                (true, None) => {
                    log::info!("No --font given; video will have no pitch readout");
                    None
                }
                _ => None,
            };

            let pb = if realtime {
                None
            } else {
                Some(progress_bar(total_frames as u64)?)
            };
            let ticker = realtime.then(|| Ticker::new(config.live.fps));
            let session = LiveSession::start(&live_settings, source.sample_rate());

            let mut last_band = None;
            let outcome = run_live(&mut source, session, ticker, |reading, surface| {
                report_band_change(reading, &mut last_band);
                if let (Some(encoder), Some(surface)) = (encoder.as_mut(), surface) {
                    let mut pixels = surface.as_bytes().to_vec();
                    if let Some(ref overlay) = overlay {
                        let text = readout_text(reading);
                        overlay.composite(
                            &mut pixels,
                            surface.width() as u32,
                            surface.height() as u32,
                            &text,
                            4,
                            2,
                            [255, 255, 255, 230],
                        );
                    }
                    encoder.write_frame(&pixels)?;
                }
                if let Some(ref pb) = pb {
                    pb.inc(1);
                }
                Ok(())
            })?;

            if let Some(pb) = pb {
                pb.finish_with_message("done");
            }
            if let Some(encoder) = encoder {
                log::info!("Finalizing video...");
                encoder.finish()?;
            }

            emit_metrics(&outcome.metrics, common.out.as_deref())?;
            maybe_upload(&config, &outcome.audio, &outcome.metrics)?;
        }
        Command::Live { seconds, save, common } => {
            merge_common(&mut config, &common)?;
            run_capture(&config, seconds, save.as_deref(), &common)?;
        }
    }

    Ok(())
}

#[cfg(feature = "capture")]
fn run_capture(config: &Config, seconds: f32, save: Option<&Path>, common: &CommonArgs) -> Result<()> {
    use voxpitch::audio::capture::CaptureSource;

    if !(seconds.is_finite() && seconds > 0.0) {
        anyhow::bail!("--seconds must be positive, got {}", seconds);
    }
    let mut source = CaptureSource::open_default(
        config.analysis.frame_size,
        config.live.fps,
        config.spectrum_settings(),
        std::time::Duration::from_secs_f32(seconds),
    )?;
    let session = LiveSession::start(&config.live_settings(), source.sample_rate());

    log::info!("Recording for {:.1}s. Speak in a relaxed, comfortable voice.", seconds);
    let mut last_band = None;
    let outcome = run_live(&mut source, session, None, |reading, _| {
        report_band_change(reading, &mut last_band);
        Ok(())
    })?;

    if let Some(path) = save {
        outcome.audio.write_wav(path)?;
    }
    emit_metrics(&outcome.metrics, common.out.as_deref())?;
    maybe_upload(config, &outcome.audio, &outcome.metrics)
}

#[cfg(not(feature = "capture"))]
fn run_capture(_config: &Config, _seconds: f32, _save: Option<&Path>, _common: &CommonArgs) -> Result<()> {
    anyhow::bail!(
        "Live capture requires the 'capture' feature. \
         Rebuild with: cargo build --features capture"
    )
}

/// CLI values apply only when they differ from their defaults.
fn merge_common(config: &mut Config, common: &CommonArgs) -> Result<()> {
    if common.frame_size != 2048 {
        config.analysis.frame_size = common.frame_size;
    }
    if common.fps != 60 {
        config.live.fps = common.fps;
    }
    if common.upload.is_some() {
        config.upload.url = common.upload.clone();
    }
    if common.user_id.is_some() {
        config.upload.user_id = common.user_id.clone();
    }
    if common.module_id.is_some() {
        config.upload.module_id = common.module_id.clone();
    }
    config.validate()?;
    Ok(())
}

fn decode_input(input: &Path) -> Result<AudioData> {
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    log::info!("Input: {}", input.display());
    log::info!("Decoding audio...");
    let audio = decode_audio(input)?;
    log::info!(
        "Decoded {:.1}s at {}Hz",
        audio.duration(),
        audio.sample_rate
    );
    Ok(audio)
}

fn progress_bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")?
            .progress_chars("=>-"),
    );
    Ok(pb)
}

fn report_band_change(reading: &LiveReading, last_band: &mut Option<PitchBand>) {
    if reading.band != *last_band {
        if let (Some(band), Some(hz)) = (reading.band, reading.smoothed_hz) {
            log::info!("{:.1} Hz: {}", hz, band.guidance());
        }
        *last_band = reading.band;
    }
}

fn emit_metrics(metrics: &SessionMetrics, out: Option<&Path>) -> Result<()> {
    if let Some(err) = metrics.analysis_error {
        log::warn!("{}", err);
    }
    let json = serde_json::to_string_pretty(metrics).context("Failed to serialize metrics")?;
    match out {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
            log::info!("Metrics written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn maybe_upload(config: &Config, audio: &RecordedAudio, metrics: &SessionMetrics) -> Result<()> {
    let Some(ref url) = config.upload.url else {
        return Ok(());
    };
    let user_id = config
        .upload
        .user_id
        .clone()
        .context("Uploading needs --user-id or upload.user_id in the config")?;
    let client = UploadClient::new(url.clone(), user_id, config.upload.module_id.clone())?;
    let receipt = client.submit(audio, metrics)?;
    if let Some(text) = receipt.transcription.filter(|t| !t.is_empty()) {
        log::info!("Transcription: {}", text);
    }
    Ok(())
}
