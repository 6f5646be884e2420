pub mod band;
pub mod estimator;
pub mod smoother;

pub use band::{classify, PitchBand};
pub use estimator::{EstimatorConfig, F0Estimator, PitchEstimate};
pub use smoother::PitchSmoother;
