pub mod spectrogram;
pub mod text;
