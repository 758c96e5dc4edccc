//! Built-in stage implementations registered by the default loader.

pub mod branch;
pub mod fft;
pub mod magnitude;
pub mod merge;
pub mod passthrough;

pub use branch::RoundRobinBranch;
pub use fft::ImageFftGadget;
pub use magnitude::MagnitudeGadget;
pub use merge::UnorderedMerge;
pub use passthrough::PassThroughGadget;
