use super::estimator::PitchEstimate;

pub const DEFAULT_ALPHA: f32 = 0.2;

/// One-pole exponential smoother for the live pitch readout.
#[derive(Clone, Debug)]
pub struct PitchSmoother {
    alpha: f32,
    value: Option<f32>,
}

impl PitchSmoother {
    pub fn new(alpha: f32) -> Self {
        Self { alpha, value: None }
    }

    /// Fold a new estimate into the smoothed value. Unvoiced estimates leave the
    /// value untouched so the display holds the last reading.
    pub fn update(&mut self, estimate: PitchEstimate) -> Option<f32> {
        if let Some(current) = estimate.hz() {
            self.value = Some(smooth(self.value, current, self.alpha));
        }
        self.value
    }

    pub fn value(&self) -> Option<f32> {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}

impl Default for PitchSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

pub fn smooth(previous: Option<f32>, current: f32, alpha: f32) -> f32 {
    match previous {
        Some(prev) => prev + alpha * (current - prev),
        None => current,
    }
}
