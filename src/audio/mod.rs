pub mod analysis;
#[cfg(feature = "capture")]
pub mod capture;
pub mod decode;
pub mod features;
pub mod handoff;
pub mod source;
pub mod spectrum;
