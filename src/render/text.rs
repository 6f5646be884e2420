use anyhow::{anyhow, Context, Result};
use fontdue::{Font, FontSettings};
use std::path::Path;

use crate::session::live::LiveReading;

/// Rasterizes short status lines onto an RGBA frame.
pub struct TextOverlay {
    font: Font,
    font_size: f32,
}

impl TextOverlay {
    pub fn from_bytes(bytes: &[u8], font_size: f32) -> Result<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|e| anyhow!("Failed to parse font: {}", e))?;
        Ok(Self { font, font_size })
    }

    pub fn from_file(path: &Path, font_size: f32) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read font file: {}", path.display()))?;
        Self::from_bytes(&bytes, font_size)
    }

    /// Composite text onto an RGBA pixel buffer at the given position.
    /// Glyph pixels outside the buffer are clipped.
    pub fn composite(
        &self,
        pixels: &mut [u8],
        width: u32,
        height: u32,
        text: &str,
        x: u32,
        y: u32,
        color: [u8; 4],
    ) {
        let mut cursor_x = x as i32;
        for ch in text.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, self.font_size);
            let glyph_y = y as i32 + self.font_size as i32 - metrics.height as i32 - metrics.ymin;

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let alpha = bitmap[gy * metrics.width + gx];
                    if alpha == 0 {
                        continue;
                    }

                    let px = cursor_x + gx as i32;
                    let py = glyph_y + gy as i32;
                    if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                        continue;
                    }

                    let idx = ((py as u32 * width + px as u32) * 4) as usize;
                    if idx + 3 >= pixels.len() {
                        continue;
                    }

                    let a = alpha as f32 / 255.0 * (color[3] as f32 / 255.0);
                    let inv_a = 1.0 - a;
                    pixels[idx] = (color[0] as f32 * a + pixels[idx] as f32 * inv_a) as u8;
                    pixels[idx + 1] = (color[1] as f32 * a + pixels[idx + 1] as f32 * inv_a) as u8;
                    pixels[idx + 2] = (color[2] as f32 * a + pixels[idx + 2] as f32 * inv_a) as u8;
                    pixels[idx + 3] = 255;
                }
            }

            cursor_x += metrics.advance_width as i32;
        }
    }
}

/// The readout shown next to the spectrogram, e.g. `172.4 Hz  neutral`.
pub fn readout_text(reading: &LiveReading) -> String {
    match (reading.smoothed_hz, reading.band) {
        (Some(hz), Some(band)) => format!("{:.1} Hz  {}", hz, band),
        (Some(hz), None) => format!("{:.1} Hz", hz),
        _ => "\u{2014} Hz".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::band::PitchBand;
    use crate::pitch::estimator::PitchEstimate;

    #[test]
    fn readout_formats_pitch_and_band() {
        let reading = LiveReading {
            estimate: PitchEstimate::Voiced(172.44),
            smoothed_hz: Some(172.44),
            band: Some(PitchBand::Neutral),
        };
        assert_eq!(readout_text(&reading), "172.4 Hz  neutral");
    }

    #[test]
    fn readout_without_pitch_is_a_dash() {
        let reading = LiveReading {
            estimate: PitchEstimate::Silent,
            smoothed_hz: None,
            band: None,
        };
        assert_eq!(readout_text(&reading), "\u{2014} Hz");
    }

    #[test]
    fn garbage_font_is_rejected() {
        assert!(TextOverlay::from_bytes(b"not a font", 16.0).is_err());
    }
}
