//! Cross-section libraries produced by the solver and the codecs that read and write them.

pub mod codec;
pub mod model;
