use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStderr, Command, Stdio};
use std::thread::JoinHandle;

/// Lines of ffmpeg's stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 40;

#[derive(Clone, Debug)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    pub pix_fmt: String,
    pub crf: u32,
    /// Integer nearest-neighbour upscale applied by ffmpeg (1 = native size)
    pub scale: u32,
}

/// Pipes raw RGBA frames into an ffmpeg child process.
///
/// ffmpeg's stderr is drained on a background thread so a chatty encoder
/// can never fill the pipe and stall the frame writes.
pub struct FfmpegEncoder {
    child: Child,
    stderr_reader: Option<JoinHandle<String>>,
    frame_bytes: usize,
}

impl FfmpegEncoder {
    pub fn new(output_path: &Path, input_audio: Option<&Path>, settings: &VideoSettings) -> Result<Self> {
        let mut command = Command::new("ffmpeg");
        command.args(build_args(output_path, input_audio, settings)?);
        let encoder = Self::spawn(command, settings)
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}",
            settings.width,
            settings.height,
            settings.fps,
            settings.codec
        );
        Ok(encoder)
    }

    fn spawn(mut command: Command, settings: &VideoSettings) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = child.stderr.take().context("FFmpeg stderr not available")?;
        let stderr_reader = std::thread::Builder::new()
            .name("ffmpeg-stderr".into())
            .spawn(move || drain_stderr(stderr))
            .context("Failed to start ffmpeg stderr reader")?;

        Ok(Self {
            child,
            stderr_reader: Some(stderr_reader),
            frame_bytes: (settings.width * settings.height * 4) as usize,
        })
    }

    pub fn write_frame(&mut self, rgba_pixels: &[u8]) -> Result<()> {
        if rgba_pixels.len() != self.frame_bytes {
            anyhow::bail!(
                "Frame has {} bytes, encoder expects {}",
                rgba_pixels.len(),
                self.frame_bytes
            );
        }
        let stdin = self.child.stdin.as_mut().context("FFmpeg stdin not available")?;
        stdin.write_all(rgba_pixels).context("Failed to write frame to ffmpeg")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        // Close stdin to signal EOF
        drop(self.child.stdin.take());

        let status = self.child.wait().context("Failed to wait for ffmpeg")?;
        let stderr = self
            .stderr_reader
            .take()
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();

        if !status.success() {
            anyhow::bail!("FFmpeg exited with error:\n{}", stderr);
        }

        log::info!("FFmpeg encoding complete");
        Ok(())
    }
}

/// Read stderr to EOF, keeping only the last few lines.
fn drain_stderr(stderr: ChildStderr) -> String {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    for line in BufReader::new(stderr).split(b'\n') {
        let Ok(line) = line else { break };
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(String::from_utf8_lossy(&line).into_owned());
    }
    Vec::from(tail).join("\n")
}

fn path_arg(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_string)
        .with_context(|| format!("Path is not valid UTF-8: {}", path.display()))
}

fn build_args(output_path: &Path, input_audio: Option<&Path>, settings: &VideoSettings) -> Result<Vec<String>> {
    let mut args = vec![
        "-y".to_string(),
        "-f".into(), "rawvideo".into(),
        "-pixel_format".into(), "rgba".into(),
        "-video_size".into(), format!("{}x{}", settings.width, settings.height),
        "-framerate".into(), settings.fps.to_string(),
        "-i".into(), "pipe:0".into(),
    ];

    if let Some(audio) = input_audio {
        args.extend(["-i".to_string(), path_arg(audio)?]);
    }

    if settings.scale > 1 {
        args.extend([
            "-vf".to_string(),
            format!("scale=iw*{0}:ih*{0}:flags=neighbor", settings.scale),
        ]);
    }

    args.extend([
        "-c:v".to_string(), settings.codec.clone(),
        "-pix_fmt".into(), settings.pix_fmt.clone(),
        "-crf".into(), settings.crf.to_string(),
        "-preset".into(), "medium".into(),
    ]);

    if input_audio.is_some() {
        args.extend([
            "-c:a".to_string(), "aac".into(),
            "-b:a".into(), "192k".into(),
            "-shortest".into(),
        ]);
    }

    args.push(path_arg(output_path)?);
    Ok(args)
}
