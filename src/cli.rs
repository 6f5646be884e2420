use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "voxpitch", about = "Voice pitch and timbre analysis with live feedback")]
pub struct Cli {
    /// Config file (defaults to ./voxpitch.toml or the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze a finished recording and print session metrics as JSON
    Analyze {
        /// Input audio file (WAV, MP3, FLAC, OGG)
        input: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Replay a recording through the live feedback loop
    Replay {
        /// Input audio file (WAV, MP3, FLAC, OGG)
        input: PathBuf,

        /// Pace playback at the display rate instead of running flat out
        #[arg(long)]
        realtime: bool,

        /// Render the scrolling spectrogram to this video file
        #[arg(long)]
        video: Option<PathBuf>,

        /// TTF/OTF font for the pitch readout in the video
        #[arg(long)]
        font: Option<PathBuf>,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Capture from the default input device (requires the `capture` feature)
    Live {
        /// Recording length in seconds
        #[arg(long, default_value_t = 10.0)]
        seconds: f32,

        /// Save the take as a 16-bit WAV file
        #[arg(long)]
        save: Option<PathBuf>,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Write metrics JSON here instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Samples per analysis frame
    #[arg(long, default_value_t = 2048)]
    pub frame_size: usize,

    /// Display/analysis frames per second
    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// Post the recording and metrics to this endpoint
    #[arg(long)]
    pub upload: Option<String>,

    /// User id sent with an upload
    #[arg(long)]
    pub user_id: Option<String>,

    /// Module id sent with an upload
    #[arg(long)]
    pub module_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_analyze() {
        let cli = Cli::parse_from(["voxpitch", "analyze", "take.wav", "--out", "m.json"]);
        match cli.command {
            Command::Analyze { input, common } => {
                assert_eq!(input, PathBuf::from("take.wav"));
                assert_eq!(common.out, Some(PathBuf::from("m.json")));
                assert_eq!(common.frame_size, 2048);
                assert_eq!(common.fps, 60);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn parses_replay_with_global_config() {
        let cli = Cli::parse_from([
            "voxpitch", "replay", "take.wav", "--realtime", "--video", "out.mp4", "--config", "c.toml",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
        match cli.command {
            Command::Replay { realtime, video, font, .. } => {
                assert!(realtime);
                assert_eq!(video, Some(PathBuf::from("out.mp4")));
                assert!(font.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn live_defaults_to_ten_seconds() {
        let cli = Cli::parse_from(["voxpitch", "live"]);
        match cli.command {
            Command::Live { seconds, save, .. } => {
                assert_eq!(seconds, 10.0);
                assert!(save.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
