use serde::{Deserialize, Serialize};
use std::fmt;

/// Feedback bucket over F0. Thresholds and guidance text are shown to users
/// verbatim and must stay stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PitchBand {
    /// Below 155 Hz
    Lower,
    /// 155 Hz to 185 Hz inclusive
    Neutral,
    /// Above 185 Hz up to 300 Hz inclusive
    Feminine,
    /// Above 300 Hz
    High,
}

pub const NEUTRAL_MIN_HZ: f32 = 155.0;
pub const NEUTRAL_MAX_HZ: f32 = 185.0;
pub const FEMININE_MAX_HZ: f32 = 300.0;

impl PitchBand {
    pub fn label(self) -> &'static str {
        match self {
            PitchBand::Lower => "lower",
            PitchBand::Neutral => "neutral",
            PitchBand::Feminine => "feminine",
            PitchBand::High => "high",
        }
    }

    pub fn guidance(self) -> &'static str {
        match self {
            PitchBand::Lower => {
                "Tip: try a gentle upward glide and keep airflow relaxed to raise pitch."
            }
            PitchBand::Neutral => {
                "Tip: nice neutral range\u{2014}add light resonance and melodic intonation."
            }
            PitchBand::Feminine => {
                "Tip: in a feminine band\u{2014}maintain relaxed jaw and forward resonance."
            }
            PitchBand::High => {
                "Tip: high pitch detected\u{2014}ease back to a comfortable, sustainable range."
            }
        }
    }
}

impl fmt::Display for PitchBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Map a pitch to its band. `None` for NaN or infinite input.
pub fn classify(hz: f32) -> Option<PitchBand> {
    if !hz.is_finite() {
        return None;
    }
    let band = if hz < NEUTRAL_MIN_HZ {
        PitchBand::Lower
    } else if hz <= NEUTRAL_MAX_HZ {
        PitchBand::Neutral
    } else if hz <= FEMININE_MAX_HZ {
        PitchBand::Feminine
    } else {
        PitchBand::High
    };
    Some(band)
}
