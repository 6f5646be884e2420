use bytemuck::{Pod, Zeroable};

use crate::audio::features::SpectrumFrame;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::opaque(0, 0, 0);

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

/// Color for a magnitude byte. Silence maps to (30, 30, 60).
pub fn intensity_color(value: u8) -> Rgba {
    let intensity = value as f32 / 255.0;
    Rgba::opaque(
        (30.0 + 180.0 * intensity).floor() as u8,
        (30.0 + 80.0 * intensity).floor() as u8,
        (60.0 + 140.0 * intensity).floor() as u8,
    )
}

/// Scrolling time-frequency image, one column per frame, newest on the right.
/// Row-major; row 0 is the top, so low frequencies sit at the bottom.
#[derive(Clone, Debug)]
pub struct Spectrogram {
    width: usize,
    height: usize,
    pixels: Vec<Rgba>,
}

impl Spectrogram {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![Rgba::BLACK; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[y * self.width + x])
    }

    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    /// Raw RGBA bytes, ready for an encoder or an image writer.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// Scroll left by one column and draw `spectrum` into the new right edge.
    /// A zero-sized surface is left alone.
    pub fn push_column(&mut self, spectrum: &SpectrumFrame) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let bins = spectrum.bins();
        let last = self.width - 1;
        for y in 0..self.height {
            let freq_index = (y as f32 / self.height as f32 * bins.len() as f32).floor() as usize;
            let value = bins.get(freq_index).copied().unwrap_or(0);
            let row_start = (self.height - 1 - y) * self.width;
            let row = &mut self.pixels[row_start..row_start + self.width];
            row.copy_within(1.., 0);
            row[last] = intensity_color(value);
        }
    }
}

/// Draw into `target` if there is one; without a surface this does nothing.
pub fn draw_spectrogram(target: Option<&mut Spectrogram>, spectrum: &SpectrumFrame) {
    if let Some(surface) = target {
        surface.push_column(spectrum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_mapping_endpoints() {
        assert_eq!(intensity_color(0), Rgba::opaque(30, 30, 60));
        assert_eq!(intensity_color(255), Rgba::opaque(210, 110, 200));
        // 128/255 = 0.50196 -> 30 + 90.35, 30 + 40.16, 60 + 70.27
        assert_eq!(intensity_color(128), Rgba::opaque(120, 70, 130));
    }

    #[test]
    fn zero_stream_converges_to_darkest_color() {
        let mut spectrogram = Spectrogram::new(16, 8);
        let zeros = SpectrumFrame::silent(1024);
        for _ in 0..16 {
            spectrogram.push_column(&zeros);
        }
        assert!(spectrogram
            .pixels()
            .iter()
            .all(|&p| p == Rgba::opaque(30, 30, 60)));

        let before = spectrogram.pixels().to_vec();
        spectrogram.push_column(&zeros);
        assert_eq!(spectrogram.pixels(), before.as_slice());
    }

    #[test]
    fn newest_column_is_on_the_right() {
        let mut spectrogram = Spectrogram::new(4, 2);
        spectrogram.push_column(&SpectrumFrame::new(vec![255u8, 255]));
        assert_eq!(spectrogram.pixel(3, 0), Some(intensity_color(255)));
        assert_eq!(spectrogram.pixel(2, 0), Some(Rgba::BLACK));

        spectrogram.push_column(&SpectrumFrame::silent(2));
        assert_eq!(spectrogram.pixel(2, 0), Some(intensity_color(255)));
        assert_eq!(spectrogram.pixel(3, 0), Some(intensity_color(0)));
    }

    #[test]
    fn low_bins_are_drawn_at_the_bottom() {
        let mut spectrogram = Spectrogram::new(1, 4);
        // four bins, one per row; bin 0 loud
        spectrogram.push_column(&SpectrumFrame::new(vec![255u8, 0, 0, 0]));
        assert_eq!(spectrogram.pixel(0, 3), Some(intensity_color(255)));
        assert_eq!(spectrogram.pixel(0, 0), Some(intensity_color(0)));
    }

    #[test]
    fn missing_target_is_a_no_op() {
        draw_spectrogram(None, &SpectrumFrame::silent(8));
        let mut empty = Spectrogram::new(0, 0);
        draw_spectrogram(Some(&mut empty), &SpectrumFrame::silent(8));
        assert!(empty.as_bytes().is_empty());
    }

    #[test]
    fn empty_spectrum_reads_as_silence() {
        let mut spectrogram = Spectrogram::new(2, 2);
        spectrogram.push_column(&SpectrumFrame::new(Vec::<u8>::new()));
        assert_eq!(spectrogram.pixel(1, 1), Some(intensity_color(0)));
    }

    #[test]
    fn bytes_are_rgba() {
        let spectrogram = Spectrogram::new(3, 2);
        assert_eq!(spectrogram.as_bytes().len(), 3 * 2 * 4);
        assert_eq!(&spectrogram.as_bytes()[..4], &[0, 0, 0, 255]);
    }
}
