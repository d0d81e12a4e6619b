//! # Time units

/// Hertz
pub type Hertz = fugit::HertzU32;
pub type Hz = Hertz;
